//! Shared store on Redis via a `deadpool-redis` pool.
//!
//! Every key is written under a configurable prefix so several
//! applications can share one Redis database. The key registry for a tag
//! lives in a Redis set at `{prefix}__tags:{tag}`. The set expires no
//! earlier than the longest-lived key filed in it and never expires while
//! it holds a key written without expiry.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;
use tracing::{debug, info};

use super::CacheStore;
use crate::config::RedisSettings;
use crate::ttl::saturating_millis;
use crate::{HoardError, Result};

/// Keys fetched per `SCAN` round trip during prefix deletion.
const SCAN_BATCH: usize = 500;

/// Adds ARGV[1] to the set at KEYS[1]. ARGV[2] is the member's TTL in
/// milliseconds, or -1 for none. The set's expiry only ever grows.
const INDEX_ADD_SCRIPT: &str = r#"
local existed = redis.call('EXISTS', KEYS[1])
local remaining = redis.call('PTTL', KEYS[1])
redis.call('SADD', KEYS[1], ARGV[1])
local ttl = tonumber(ARGV[2])
if ttl < 0 then
    redis.call('PERSIST', KEYS[1])
elseif existed == 0 or (remaining >= 0 and remaining < ttl) then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return 1
"#;

/// Redis-backed store.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    prefix: String,
    prefix_sweep: bool,
}

impl RedisStore {
    /// Wrap an existing pool.
    pub fn new(pool: Pool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            prefix_sweep: false,
        }
    }

    /// Also `SCAN` the tag's key space on every tag purge. Off by default:
    /// the registry is authoritative and a sweep walks the whole keyspace.
    pub fn with_prefix_sweep(mut self, enabled: bool) -> Self {
        self.prefix_sweep = enabled;
        self
    }

    /// Build a pool from settings and verify that Redis answers.
    pub async fn connect(settings: &RedisSettings) -> Result<Self> {
        let pool = build_pool(settings)?;
        let store = Self::new(pool, settings.key_prefix.clone())
            .with_prefix_sweep(settings.sweep_on_purge);
        store.conn().await?;
        info!(
            url = %settings.url,
            prefix = %settings.key_prefix,
            pool_size = settings.pool_size,
            "connected to Redis"
        );
        Ok(store)
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| HoardError::Store(format!("Redis pool: {e}")))
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn index_key(&self, tag: &str) -> String {
        format!("{}__tags:{tag}", self.prefix)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(self.full_key(key)).await?)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;
        let key = self.full_key(key);
        match ttl {
            Some(ttl) => {
                conn.pset_ex::<_, _, ()>(&key, value, millis(ttl)).await?;
            }
            None => {
                conn.set::<_, _, ()>(&key, value).await?;
            }
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(self.full_key(key)).await?;
        Ok(removed > 0)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}*", escape_glob(&self.full_key(prefix)));
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let n: u64 = conn.del(keys).await?;
                removed += n;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix, removed, "redis prefix purge");
        Ok(removed)
    }

    async fn index_add(&self, tag: &str, key: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;
        let ttl_ms = ttl.map_or(-1, |t| i64::try_from(millis(t)).unwrap_or(i64::MAX));
        let script = redis::Script::new(INDEX_ADD_SCRIPT);
        let _: i64 = script
            .key(self.index_key(tag))
            .arg(key)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn index_drain(&self, tag: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let index = self.index_key(tag);
        let (members, _): (Vec<String>, u64) = redis::pipe()
            .atomic()
            .smembers(&index)
            .del(&index)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    fn prefix_sweep(&self) -> bool {
        self.prefix_sweep
    }
}

/// Pool sized and bounded by `settings`. Does not connect.
fn build_pool(settings: &RedisSettings) -> Result<Pool> {
    let timeout = Some(Duration::from_millis(settings.timeout_ms));
    let mut timeouts = Timeouts::default();
    timeouts.wait = timeout;
    timeouts.create = timeout;
    timeouts.recycle = timeout;

    let mut pool_config = PoolConfig::new(settings.pool_size);
    pool_config.timeouts = timeouts;

    let mut config = Config::from_url(&settings.url);
    config.pool = Some(pool_config);
    config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| HoardError::Configuration(format!("Failed to create Redis pool: {e}")))
}

/// Redis rejects a zero expiry; round sub-millisecond TTLs up.
fn millis(ttl: Duration) -> u64 {
    saturating_millis(ttl).max(1)
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_metacharacters_escaped() {
        assert_eq!(escape_glob("list:shops"), "list:shops");
        assert_eq!(
            escape_glob(r#"list:shops?{"a":[1]}"#),
            r#"list:shops\?{"a":\[1\]}"#
        );
    }

    #[tokio::test]
    async fn pool_honours_size_and_timeouts() {
        let settings = RedisSettings {
            pool_size: 3,
            timeout_ms: 50,
            ..RedisSettings::default()
        };
        let pool = build_pool(&settings).unwrap();
        assert_eq!(pool.status().max_size, 3);

        let timeouts = pool.timeouts();
        let expected = Some(Duration::from_millis(50));
        assert_eq!(timeouts.wait, expected);
        assert_eq!(timeouts.create, expected);
        assert_eq!(timeouts.recycle, expected);
    }

    #[test]
    fn sweep_is_opt_in() {
        let pool = build_pool(&RedisSettings::default()).unwrap();
        assert!(!RedisStore::new(pool.clone(), "t:").prefix_sweep());
        assert!(RedisStore::new(pool, "t:").with_prefix_sweep(true).prefix_sweep());
    }

    #[test]
    fn millis_never_zero() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2_000);
    }
}
