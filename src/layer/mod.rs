//! The assembled caching layer.
//!
//! [`Hoard`] bundles one [`Cache`], the [`ReadThrough`] orchestrator and
//! the [`Invalidator`] over it, so request handlers and write paths share a
//! single store and TTL policy.

mod builder;

pub use builder::HoardBuilder;

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::{
    Cache, FetchOptions, InvalidationReport, Invalidator, ReadThrough, Served,
};
use crate::config::Settings;
use crate::error::BoxError;
use crate::{CacheKey, QueryParams, Result, TtlClass};

/// Read-through cache with invalidation. Cheap to clone.
///
/// ```rust
/// # use hoard::{Hoard, CacheKey, TtlClass};
/// # async fn example() -> hoard::Result<()> {
/// let hoard = Hoard::builder().memory(1_000).build()?;
/// let key = CacheKey::builder("admin", "dashboard_kpis").build()?;
/// let served = hoard
///     .fetch(&key, TtlClass::Dashboard, || async {
///         Ok::<_, std::io::Error>(42u64)
///     })
///     .await?;
/// assert_eq!(served.value, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Hoard {
    pub(crate) cache: Cache,
    pub(crate) reader: ReadThrough,
    pub(crate) invalidator: Invalidator,
}

impl Hoard {
    pub fn builder() -> HoardBuilder {
        HoardBuilder::new()
    }

    /// Build from loaded settings.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        HoardBuilder::from_settings(settings).await?.build()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn reader(&self) -> &ReadThrough {
        &self.reader
    }

    pub fn invalidator(&self) -> &Invalidator {
        &self.invalidator
    }

    /// See [`ReadThrough::fetch`].
    pub async fn fetch<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: TtlClass,
        compute: F,
    ) -> Result<Served<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.reader.fetch(key, ttl, compute).await
    }

    /// See [`ReadThrough::fetch_with`].
    pub async fn fetch_with<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: TtlClass,
        options: FetchOptions<T>,
        compute: F,
    ) -> Result<Served<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.reader.fetch_with(key, ttl, options, compute).await
    }

    /// See [`Invalidator::invalidate`].
    pub async fn invalidate(
        &self,
        table: &str,
        ids: &[String],
        query_shapes: &[QueryParams],
    ) -> InvalidationReport {
        self.invalidator.invalidate(table, ids, query_shapes).await
    }

    pub async fn invalidate_table(&self, table: &str) -> InvalidationReport {
        self.invalidator.invalidate_table(table).await
    }

    pub async fn invalidate_key(&self, key: &CacheKey) -> bool {
        self.invalidator.invalidate_key(key).await
    }
}
