//! Builder for configuring a caching layer

use std::sync::Arc;
use std::time::Duration;

use super::Hoard;
use crate::cache::{Cache, InvalidationRule, InvalidationRules, Invalidator, ReadThrough, ReadThroughConfig};
use crate::config::{Settings, StoreSettings};
use crate::store::{CacheStore, MemoryStore};
use crate::{HoardError, Result, TtlClass, TtlPolicy};

/// Builder for [`Hoard`].
pub struct HoardBuilder {
    store: Option<Arc<dyn CacheStore>>,
    policy: TtlPolicy,
    read_through: ReadThroughConfig,
    rules: InvalidationRules,
}

impl Default for HoardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HoardBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            policy: TtlPolicy::default(),
            read_through: ReadThroughConfig::default(),
            rules: InvalidationRules::new(),
        }
    }

    /// Builder pre-filled from loaded settings, connecting to Redis if the
    /// settings select it.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let store: Arc<dyn CacheStore> = match &settings.store {
            StoreSettings::Memory { max_entries } => {
                Arc::new(MemoryStore::with_max_entries(*max_entries))
            }
            #[cfg(feature = "redis")]
            StoreSettings::Redis(redis) => {
                Arc::new(crate::store::RedisStore::connect(redis).await?)
            }
            #[cfg(not(feature = "redis"))]
            StoreSettings::Redis(_) => {
                return Err(HoardError::Configuration(
                    "redis backend requires the `redis` feature".to_string(),
                ));
            }
        };

        Ok(Self::new()
            .store(store)
            .ttl_policy(settings.ttl.clone())
            .read_through((&settings.read_through).into())
            .rules(settings.invalidation_rules()?))
    }

    /// Use a custom store.
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an in-process store holding at most `max_entries` values.
    pub fn memory(mut self, max_entries: u64) -> Self {
        self.store = Some(Arc::new(MemoryStore::with_max_entries(max_entries)));
        self
    }

    pub fn ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override one TTL class.
    pub fn ttl(mut self, class: TtlClass, ttl: Duration) -> Self {
        self.policy = self.policy.with(class, ttl);
        self
    }

    pub fn read_through(mut self, config: ReadThroughConfig) -> Self {
        self.read_through = config;
        self
    }

    /// Cold-path deadline (default: 25 s).
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.read_through.deadline = deadline;
        self
    }

    /// Background refresh on hit (default: on).
    pub fn revalidate(mut self, enabled: bool) -> Self {
        self.read_through.revalidate = enabled;
        self
    }

    /// Refresh lease lifetime (default: 30 s).
    pub fn lease_ttl(mut self, ttl: Duration) -> Self {
        self.read_through.lease_ttl = ttl;
        self
    }

    pub fn rules(mut self, rules: InvalidationRules) -> Self {
        self.rules = rules;
        self
    }

    /// Add or replace the rule for one table.
    pub fn rule(mut self, table: impl Into<String>, rule: InvalidationRule) -> Self {
        self.rules = self.rules.table(table, rule);
        self
    }

    /// Build the layer. Defaults to an in-process store.
    pub fn build(self) -> Result<Hoard> {
        self.policy.validate()?;
        if self.read_through.deadline.is_zero() {
            return Err(HoardError::Configuration(
                "read-through deadline must be greater than zero".to_string(),
            ));
        }
        if self.read_through.lease_ttl.is_zero() {
            return Err(HoardError::Configuration(
                "refresh lease TTL must be greater than zero".to_string(),
            ));
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn CacheStore>);
        let cache = Cache::new(store, self.policy);
        let reader = ReadThrough::new(cache.clone(), self.read_through);
        let invalidator = Invalidator::new(cache.clone(), self.rules);

        Ok(Hoard {
            cache,
            reader,
            invalidator,
        })
    }
}
