//! In-process store on moka with per-entry expiry.
//!
//! The key registry lives beside the cache. Entries leave it when moka
//! evicts, expires or removes their key, so it stays as bounded as the
//! cache itself. A removal notice can race a rewrite of the same key, so
//! tag purges on this backend keep the prefix sweep.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::Expiry;
use moka::future::Cache;
use moka::notification::RemovalCause;

use super::CacheStore;
use crate::Result;
use crate::key::tag_of;

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
struct StoredValue {
    data: Arc<Vec<u8>>,
    ttl: Option<Duration>,
}

/// Expiry driven by the TTL each entry was written with.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Bounded in-memory store.
///
/// Cloning is cheap and shares the underlying cache.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, StoredValue>,
    tags: Arc<DashMap<String, HashSet<String>>>,
    max_entries: u64,
}

type Registry = DashMap<String, HashSet<String>>;

/// Drop a key that left the cache from its tag's registry.
fn unregister(registry: &Registry, key: &str) {
    let Some(tag) = tag_of(key) else {
        return;
    };
    if let Some(mut keys) = registry.get_mut(tag) {
        keys.remove(key);
    }
    registry.remove_if(tag, |_, keys| keys.is_empty());
}

impl MemoryStore {
    /// Create a store with the default capacity (10,000 entries).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max: u64) -> Self {
        let tags: Arc<Registry> = Arc::new(DashMap::new());
        let registry = Arc::clone(&tags);
        let entries = Cache::builder()
            .max_capacity(max)
            .expire_after(PerEntryTtl)
            .eviction_listener(move |key: Arc<String>, _value, cause| {
                // A replaced key is still live.
                if cause != RemovalCause::Replaced {
                    unregister(&registry, &key);
                }
            })
            .build();
        Self {
            entries,
            tags,
            max_entries: max,
        }
    }

    /// Number of live entries, after flushing moka's pending maintenance.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Keys currently registered for `tag`.
    pub fn registered(&self, tag: &str) -> usize {
        self.tags.get(tag).map_or(0, |set| set.len())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(key)
            .await
            .map(|v| v.data.as_ref().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let value = StoredValue {
            data: Arc::new(value),
            ttl,
        };
        self.entries.insert(key.to_owned(), value).await;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let value = StoredValue {
            data: Arc::new(value),
            ttl: Some(ttl),
        };
        let entry = self.entries.entry(key.to_owned()).or_insert(value).await;
        Ok(entry.is_fresh())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).await.is_some())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let matching: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k)
            .collect();

        let mut removed = 0;
        for key in matching {
            if self.entries.remove(key.as_str()).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn index_add(&self, tag: &str, key: &str, _ttl: Option<Duration>) -> Result<()> {
        let mut keys = self.tags.entry(tag.to_owned()).or_default();
        // Removal notices can lag behind inserts; never hold more than the
        // cache could.
        if keys.len() as u64 >= self.max_entries {
            keys.retain(|k| self.entries.contains_key(k.as_str()));
        }
        keys.insert(key.to_owned());
        Ok(())
    }

    async fn index_drain(&self, tag: &str) -> Result<Vec<String>> {
        Ok(self
            .tags
            .remove(tag)
            .map(|(_, keys)| keys.into_iter().collect())
            .unwrap_or_default())
    }
}
