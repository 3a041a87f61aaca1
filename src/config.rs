//! Configuration loading.
//!
//! Settings are loaded from a TOML file with the following resolution order:
//! 1. Explicit path (e.g. `--config <path>`)
//! 2. `~/.hoard/config.toml` (user)
//! 3. `/etc/hoard/config.toml` (system)
//!
//! `HOARD_REDIS_URL`, when set, overrides the Redis URL from the file.
//!
//! ```toml
//! [store]
//! backend = "redis"
//! url = "redis://cache.internal:6379"
//! key_prefix = "admin:"
//!
//! [ttl]
//! short_secs = 120
//!
//! [read_through]
//! deadline_secs = 25
//!
//! [[invalidation]]
//! table = "shops"
//! keys = ["admin:dashboard_kpis"]
//! tags = ["list:shops"]
//! shapes = [{ namespace = "vendor", entity = "shops", sub = "profile" }]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{InvalidationRule, InvalidationRules, KeyShape, ReadThroughConfig};
use crate::key::split_tag;
use crate::store::memory::DEFAULT_MAX_ENTRIES;
use crate::{CacheKey, HoardError, Result, TtlPolicy};

/// Environment variable overriding `store.url`.
pub const REDIS_URL_ENV: &str = "HOARD_REDIS_URL";

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub ttl: TtlPolicy,
    #[serde(default)]
    pub read_through: ReadThroughSettings,
    #[serde(default)]
    pub invalidation: Vec<RuleSettings>,
}

/// Which store backs the cache.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase", deny_unknown_fields)]
pub enum StoreSettings {
    Memory {
        #[serde(default = "default_max_entries")]
        max_entries: u64,
    },
    Redis(RedisSettings),
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings::Memory {
            max_entries: default_max_entries(),
        }
    }
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisSettings {
    /// Connection URL (default: redis://127.0.0.1:6379).
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Prefix prepended to every key (default: "hoard:").
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Maximum pooled connections (default: 16).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Wait/create/recycle timeout in milliseconds (default: 500).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Also sweep a tag's key space with `SCAN` on every tag purge
    /// (default: false).
    #[serde(default)]
    pub sweep_on_purge: bool,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            pool_size: default_pool_size(),
            timeout_ms: default_timeout_ms(),
            sweep_on_purge: false,
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "hoard:".to_string()
}

fn default_pool_size() -> usize {
    16
}

fn default_timeout_ms() -> u64 {
    500
}

/// Read-through orchestrator settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadThroughSettings {
    /// Cold-path deadline in seconds (default: 25).
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Refresh cached values in the background on hit (default: true).
    #[serde(default = "default_revalidate")]
    pub revalidate: bool,
    /// Lifetime of the per-key refresh lease in seconds (default: 30).
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
}

impl Default for ReadThroughSettings {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            revalidate: default_revalidate(),
            lease_secs: default_lease_secs(),
        }
    }
}

fn default_deadline_secs() -> u64 {
    25
}

fn default_revalidate() -> bool {
    true
}

fn default_lease_secs() -> u64 {
    30
}

impl From<&ReadThroughSettings> for ReadThroughConfig {
    fn from(s: &ReadThroughSettings) -> Self {
        ReadThroughConfig::new()
            .deadline(Duration::from_secs(s.deadline_secs))
            .revalidate(s.revalidate)
            .lease_ttl(Duration::from_secs(s.lease_secs))
    }
}

/// One `[[invalidation]]` table entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSettings {
    pub table: String,
    /// Fully-qualified keys deleted on every write to the table.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Id-based key shapes, rebuilt per affected id.
    #[serde(default)]
    pub shapes: Vec<ShapeSettings>,
    /// `{namespace}:{entity}` tags purged through the key registry.
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeSettings {
    pub namespace: String,
    pub entity: String,
    #[serde(default)]
    pub sub: Option<String>,
}

impl Settings {
    /// Load settings from the standard locations, then apply env overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            HoardError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let mut settings = Self::from_toml(&content).map_err(|e| match e {
            HoardError::Configuration(msg) => {
                HoardError::Configuration(format!("{path:?}: {msg}"))
            }
            other => other,
        })?;
        settings.apply_env(std::env::var(REDIS_URL_ENV).ok());
        Ok(settings)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content).map_err(|e| {
            HoardError::Configuration(format!("Failed to parse config: {e}"))
        })?;
        settings.ttl.validate()?;
        Ok(settings)
    }

    /// Apply a Redis URL override. No-op for the memory backend.
    pub fn apply_env(&mut self, redis_url: Option<String>) {
        if let (StoreSettings::Redis(redis), Some(url)) = (&mut self.store, redis_url) {
            redis.url = url;
        }
    }

    /// Build the invalidation rule table. Malformed keys, shapes or tags
    /// are configuration errors.
    pub fn invalidation_rules(&self) -> Result<InvalidationRules> {
        let mut rules = InvalidationRules::new();
        for entry in &self.invalidation {
            let mut rule = InvalidationRule::new();
            for key in &entry.keys {
                rule = rule.key(CacheKey::from_raw(key.as_str())?);
            }
            for shape in &entry.shapes {
                let mut s = KeyShape::new(&shape.namespace, &shape.entity);
                if let Some(sub) = &shape.sub {
                    s = s.sub(sub);
                }
                s.validate()?;
                rule = rule.shape(s);
            }
            for tag in &entry.tags {
                split_tag(tag)?;
                rule = rule.tag(tag);
            }
            rules = rules.table(&entry.table, rule);
        }
        Ok(rules)
    }

    fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(HoardError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".hoard").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/hoard/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(HoardError::Configuration(
            "No config file found. Create ~/.hoard/config.toml or /etc/hoard/config.toml"
                .to_string(),
        ))
    }
}
