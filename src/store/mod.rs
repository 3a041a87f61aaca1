//! Cache store backends.
//!
//! [`CacheStore`] is the raw, fallible key-value interface. It deals in
//! bytes and plain string keys; typing, TTL classes and the fail-open
//! policy live one layer up in [`Cache`](crate::cache::Cache).
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryStore`]: in-process moka cache with per-entry expiry. Good
//!   for tests and single-instance deployments.
//! - `RedisStore` (feature `redis`): shared store behind a
//!   `deadpool-redis` pool, for multi-instance deployments.
//!
//! Besides plain key/value operations, every backend maintains a key
//! registry: a set of issued keys per tag (`{namespace}:{entity}`). Table
//! level invalidation drains that set instead of guessing which parameter
//! combinations were ever cached.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Raw key-value store with expiry and a per-tag key registry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for logs (e.g. "memory", "redis").
    fn name(&self) -> &str;

    /// Fetch a value. Expired entries are absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value, replacing any previous one. `None` means no expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Store a value only if the key is absent. Returns whether it was stored.
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every key starting with `prefix`. Returns the number removed.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;

    /// Record `key` in the registry for `tag`.
    ///
    /// `ttl` is the expiry the key is about to be written with. Backends use
    /// it to let registry entries lapse once the key itself can no longer
    /// exist; `None` keeps them until drained.
    async fn index_add(&self, tag: &str, key: &str, ttl: Option<Duration>) -> Result<()>;

    /// Take and clear every key registered for `tag`.
    async fn index_drain(&self, tag: &str) -> Result<Vec<String>>;

    /// Whether tag purges should also sweep the tag's key space by prefix,
    /// for keys the registry may have missed.
    fn prefix_sweep(&self) -> bool {
        true
    }
}
