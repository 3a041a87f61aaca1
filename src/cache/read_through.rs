//! Read-through orchestration with stale-while-revalidate.
//!
//! [`ReadThrough::fetch`] runs the per-key protocol:
//!
//! 1. Read the key through the fail-open [`Cache`].
//! 2. **Hit**: return the cached value at once. If revalidation is on,
//!    spawn a detached task that takes the key's refresh lease and, if it
//!    gets it, recomputes and overwrites the entry. The caller never waits
//!    on that task, and its failures are only logged.
//! 3. **Miss**: run the compute function on its own task and race it
//!    against the deadline. The winner decides the response; a compute
//!    that loses the race keeps running and still fills the cache when it
//!    finishes.
//! 4. **Upstream failure on a miss**: serve the caller-supplied
//!    last-known-good value, flagged [`Origin::Stale`], or return the error.
//!
//! Per key, a value moves through `MISS → COMPUTING → FRESH → STALE`, then
//! back to `FRESH` on refresh or to `MISS` on invalidation. The cache keeps
//! no timestamps, so a hit may be fresh or stale; both are served.
//!
//! # Refresh lease
//!
//! The lease is a `set_if_absent` marker at [`CacheKey::lease_key`] with a
//! short TTL. It is not released when the refresh finishes, so a key is
//! refreshed at most once per lease window no matter how many hits it
//! gets. Concurrent misses are not coalesced: each runs its own compute.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::Cache;
use crate::error::BoxError;
use crate::telemetry;
use crate::ttl::saturating_millis;
use crate::{CacheKey, HoardError, Result, TtlClass};

/// Orchestrator settings.
///
/// ```rust
/// # use hoard::cache::ReadThroughConfig;
/// # use std::time::Duration;
/// let config = ReadThroughConfig::new()
///     .deadline(Duration::from_secs(10))
///     .lease_ttl(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadThroughConfig {
    /// Cold-path deadline. Default: 25 s.
    pub deadline: Duration,
    /// Refresh in the background on every hit. Default: true.
    pub revalidate: bool,
    /// Refresh lease lifetime. Default: 30 s.
    pub lease_ttl: Duration,
}

impl Default for ReadThroughConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(25),
            revalidate: true,
            lease_ttl: Duration::from_secs(30),
        }
    }
}

impl ReadThroughConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn revalidate(mut self, enabled: bool) -> Self {
        self.revalidate = enabled;
        self
    }

    pub fn lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }
}

/// Where a served value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Cache hit (fresh or stale; indistinguishable).
    Cache,
    /// Computed from the system of record on this call.
    Upstream,
    /// Last-known-good value served because the upstream failed.
    Stale,
}

/// A value plus its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Served<T> {
    pub value: T,
    pub origin: Origin,
}

impl<T> Served<T> {
    /// True only for last-known-good fallbacks.
    pub fn is_stale(&self) -> bool {
        self.origin == Origin::Stale
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Served<U> {
        Served {
            value: f(self.value),
            origin: self.origin,
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone)]
pub struct FetchOptions<T> {
    deadline: Option<Duration>,
    fallback: Option<T>,
    revalidate: Option<bool>,
}

impl<T> Default for FetchOptions<T> {
    fn default() -> Self {
        Self {
            deadline: None,
            fallback: None,
            revalidate: None,
        }
    }
}

impl<T> FetchOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the cold-path deadline for this call.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Value read earlier in the same request, served if the upstream fails.
    pub fn fallback(mut self, value: T) -> Self {
        self.fallback = Some(value);
        self
    }

    /// Override background revalidation for this call.
    pub fn revalidate(mut self, enabled: bool) -> Self {
        self.revalidate = Some(enabled);
        self
    }
}

/// Read-through orchestrator. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReadThrough {
    cache: Cache,
    config: ReadThroughConfig,
}

impl ReadThrough {
    pub fn new(cache: Cache, config: ReadThroughConfig) -> Self {
        Self { cache, config }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn config(&self) -> &ReadThroughConfig {
        &self.config
    }

    /// Read `key`, computing and storing it on a miss.
    ///
    /// `compute` may run on a detached task (background refresh, or a miss
    /// that outlives its deadline), so it must only read from the system of
    /// record.
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
        self.fetch_with(key, ttl, FetchOptions::default(), compute)
            .await
    }

    /// [`fetch`](Self::fetch) with per-call options.
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
        if let Some(value) = self.cache.get::<T>(key).await {
            if options.revalidate.unwrap_or(self.config.revalidate) {
                self.spawn_refresh(key, ttl, compute);
            }
            return Ok(Served {
                value,
                origin: Origin::Cache,
            });
        }

        let deadline = options.deadline.unwrap_or(self.config.deadline);
        match self.compute_with_deadline(key, ttl, deadline, compute).await {
            Ok(value) => Ok(Served {
                value,
                origin: Origin::Upstream,
            }),
            Err(err) if err.is_upstream() => match options.fallback {
                Some(value) => {
                    warn!(key = %key, error = %err, "upstream failed; serving last known value");
                    metrics::counter!(telemetry::STALE_SERVED_TOTAL, "tag" => key.tag().to_owned())
                        .increment(1);
                    Ok(Served {
                        value,
                        origin: Origin::Stale,
                    })
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Cold path: compute on a task, store on success, race the deadline.
    async fn compute_with_deadline<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: TtlClass,
        deadline: Duration,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let cache = self.cache.clone();
        let task_key = key.clone();
        let started = Instant::now();

        // Dropping the handle on timeout detaches the task; it is not aborted.
        let task = tokio::spawn(async move {
            let value = compute().await.map_err(HoardError::upstream)?;
            metrics::histogram!(telemetry::COMPUTE_DURATION_SECONDS, "tag" => task_key.tag().to_owned())
                .record(started.elapsed().as_secs_f64());
            cache.set(&task_key, &value, ttl).await;
            Ok::<_, HoardError>(value)
        });

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => {
                if let Err(ref e) = result {
                    warn!(key = %key, error = %e, "upstream compute failed");
                }
                result
            }
            Ok(Err(join_err)) => {
                warn!(key = %key, error = %join_err, "upstream compute task panicked");
                Err(HoardError::upstream(join_err))
            }
            Err(_) => {
                warn!(key = %key, deadline_ms = saturating_millis(deadline), "upstream compute timed out");
                metrics::counter!(telemetry::TIMEOUTS_TOTAL, "tag" => key.tag().to_owned())
                    .increment(1);
                Err(HoardError::Timeout { deadline })
            }
        }
    }

    /// Hot path: detached, lease-guarded refresh. Never awaited.
    fn spawn_refresh<T, F, Fut, E>(&self, key: &CacheKey, ttl: TtlClass, compute: F)
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let cache = self.cache.clone();
        let key = key.clone();
        let lease_ttl = self.config.lease_ttl;

        tokio::spawn(async move {
            let tag = key.tag().to_owned();
            if !cache.try_acquire_lease(&key, lease_ttl).await {
                debug!(key = %key, "refresh already leased; skipping");
                metrics::counter!(telemetry::REFRESH_SKIPPED_TOTAL, "tag" => tag).increment(1);
                return;
            }

            match compute().await {
                Ok(value) => {
                    let stored = cache.set(&key, &value, ttl).await;
                    debug!(key = %key, stored, "background refresh complete");
                    metrics::counter!(telemetry::REFRESH_TOTAL, "tag" => tag, "outcome" => "ok")
                        .increment(1);
                }
                Err(e) => {
                    let e: BoxError = e.into();
                    warn!(key = %key, error = %e, "background refresh failed");
                    metrics::counter!(telemetry::REFRESH_TOTAL, "tag" => tag, "outcome" => "error")
                        .increment(1);
                }
            }
        });
    }
}
