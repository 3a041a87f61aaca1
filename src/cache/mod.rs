//! Caching subsystem.
//!
//! Three layers over a [`CacheStore`]:
//!
//! - [`Cache`]: the fail-open adapter. Typed get/set with TTL classes;
//!   every store or (de)serialization failure is logged, counted and
//!   turned into "absent" or "not written". Nothing in here returns an
//!   error.
//!
//! - [`read_through::ReadThrough`]: read-through with
//!   stale-while-revalidate and a deadline race on misses.
//!
//! - [`invalidation::Invalidator`]: fan-out invalidation after writes,
//!   driven by per-table [`InvalidationRules`] and the key registry.

pub mod invalidation;
pub mod read_through;

pub use invalidation::{
    InvalidationReport, InvalidationRule, InvalidationRules, Invalidator, KeyShape,
};
pub use read_through::{FetchOptions, Origin, ReadThrough, ReadThroughConfig, Served};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::store::CacheStore;
use crate::telemetry;
use crate::{CacheKey, TtlClass, TtlPolicy};

/// Fail-open, typed view of a [`CacheStore`].
///
/// Values are stored as JSON. The caller owns the schema: whatever type was
/// written must deserialize from what it reads back; a mismatch counts as a
/// miss. Cloning is cheap and shares the store.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    policy: Arc<TtlPolicy>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>, policy: TtlPolicy) -> Self {
        Self {
            store,
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Read and decode a value. Errors are reported as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let found = match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "cached value failed to decode; treating as miss");
                    store_error("decode");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, store = self.store.name(), error = %e, "cache get failed; treating as miss");
                store_error("get");
                None
            }
        };

        if found.is_some() {
            debug!(key = %key, "cache hit");
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tag" => key.tag().to_owned())
                .increment(1);
        } else {
            debug!(key = %key, "cache miss");
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "tag" => key.tag().to_owned())
                .increment(1);
        }
        found
    }

    /// Encode and store a value, replacing any previous one.
    ///
    /// The key is filed in the registry for its tag before the write, so
    /// the registry never misses a key that reached the store. Returns
    /// whether the write is believed to have succeeded.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: TtlClass) -> bool {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "value failed to encode; not cached");
                store_error("encode");
                return false;
            }
        };

        let expiry = self.policy.resolve(ttl);
        if let Err(e) = self.store.index_add(key.tag(), key.as_str(), expiry).await {
            warn!(key = %key, tag = key.tag(), error = %e, "key registry update failed");
            store_error("index");
        }

        match self.store.set(key.as_str(), bytes, expiry).await {
            Ok(()) => {
                debug!(key = %key, ttl = %ttl, "cache set");
                true
            }
            Err(e) => {
                warn!(key = %key, store = self.store.name(), error = %e, "cache set failed");
                store_error("set");
                false
            }
        }
    }

    /// Remove a key. Absence is not an error.
    pub async fn delete(&self, key: &CacheKey) -> bool {
        self.delete_raw(key.as_str()).await
    }

    /// Remove a fully-qualified key string.
    pub async fn delete_raw(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!(key, store = self.store.name(), error = %e, "cache delete failed");
                store_error("delete");
                false
            }
        }
    }

    /// Best-effort bulk delete of every key starting with `prefix`.
    pub async fn delete_by_prefix(&self, prefix: &str) -> u64 {
        match self.store.delete_by_prefix(prefix).await {
            Ok(n) => n,
            Err(e) => {
                warn!(prefix, store = self.store.name(), error = %e, "cache prefix purge failed");
                store_error("purge");
                0
            }
        }
    }

    /// Delete every key filed under `tag` (`{namespace}:{entity}`).
    ///
    /// Drains the key registry first. Backends that ask for it
    /// ([`CacheStore::prefix_sweep`]) then get the tag's key space swept
    /// by prefix, catching keys whose registration was lost.
    pub async fn purge_tag(&self, tag: &str) -> u64 {
        let registered = match self.store.index_drain(tag).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(tag, error = %e, "key registry drain failed; falling back to prefix purge");
                store_error("index");
                Vec::new()
            }
        };

        let mut removed = 0;
        for key in &registered {
            if self.delete_raw(key).await {
                removed += 1;
            }
        }

        if self.delete_raw(tag).await {
            removed += 1;
        }
        if self.store.prefix_sweep() {
            removed += self.delete_by_prefix(&format!("{tag}:")).await;
            removed += self.delete_by_prefix(&format!("{tag}?")).await;
        }

        debug!(tag, registered = registered.len(), removed, "tag purged");
        removed
    }

    /// Try to take the advisory refresh lease for `key`.
    ///
    /// Returns `false` when another holder has it or the store failed.
    pub async fn try_acquire_lease(&self, key: &CacheKey, ttl: Duration) -> bool {
        match self
            .store
            .set_if_absent(&key.lease_key(), Vec::new(), ttl)
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(key = %key, error = %e, "refresh lease failed; skipping refresh");
                store_error("lease");
                false
            }
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("store", &self.store.name())
            .field("policy", &self.policy)
            .finish()
    }
}

fn store_error(op: &'static str) {
    metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "op" => op).increment(1);
}
