//! Invalidation fan-out.
//!
//! Every write path calls [`Invalidator::invalidate`] with the table it
//! touched. The table's [`InvalidationRule`] says what to drop:
//!
//! - exact keys, deleted as-is;
//! - id-based [`KeyShape`]s, rebuilt for each affected id;
//! - tags (`{namespace}:{entity}`) whose keys are unenumerable, purged
//!   through the key registry plus a prefix sweep.
//!
//! Invalidation is best-effort and idempotent. It never returns an error;
//! store failures are logged by the [`Cache`] adapter and counted.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Cache;
use crate::key::split_tag;
use crate::telemetry;
use crate::{CacheKey, QueryParams, Result};

/// An id-based key pattern: `{namespace}:{entity}:{id}[:{sub}]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShape {
    namespace: String,
    entity: String,
    sub: Option<String>,
}

impl KeyShape {
    pub fn new(namespace: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entity: entity.into(),
            sub: None,
        }
    }

    pub fn sub(mut self, sub: impl Into<String>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Check the shape builds a valid key, using a placeholder id.
    pub fn validate(&self) -> Result<()> {
        self.key_for("0").map(|_| ())
    }

    /// The concrete key for one entity id.
    pub fn key_for(&self, id: &str) -> Result<CacheKey> {
        let mut builder = CacheKey::builder(&self.namespace, &self.entity).id(id);
        if let Some(sub) = &self.sub {
            builder = builder.sub(sub);
        }
        builder.build()
    }
}

/// What to drop when one table changes.
#[derive(Debug, Clone, Default)]
pub struct InvalidationRule {
    keys: Vec<CacheKey>,
    shapes: Vec<KeyShape>,
    tags: Vec<String>,
}

impl InvalidationRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// A key dropped on every write to the table.
    pub fn key(mut self, key: CacheKey) -> Self {
        self.keys.push(key);
        self
    }

    /// A key pattern rebuilt for every affected id.
    pub fn shape(mut self, shape: KeyShape) -> Self {
        self.shapes.push(shape);
        self
    }

    /// A `{namespace}:{entity}` tag purged on every write to the table.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn keys(&self) -> &[CacheKey] {
        &self.keys
    }

    pub fn shapes(&self) -> &[KeyShape] {
        &self.shapes
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

/// Table name to rule.
///
/// ```rust
/// # use hoard::cache::{InvalidationRule, InvalidationRules, KeyShape};
/// # use hoard::CacheKey;
/// let rules = InvalidationRules::new().table(
///     "shops",
///     InvalidationRule::new()
///         .key(CacheKey::builder("admin", "dashboard_kpis").build().unwrap())
///         .shape(KeyShape::new("vendor", "shops").sub("profile"))
///         .tag("list:shops"),
/// );
/// assert!(rules.get("shops").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InvalidationRules {
    tables: HashMap<String, InvalidationRule>,
}

impl InvalidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rule for `table`, replacing any previous one.
    pub fn table(mut self, table: impl Into<String>, rule: InvalidationRule) -> Self {
        self.tables.insert(table.into(), rule);
        self
    }

    pub fn get(&self, table: &str) -> Option<&InvalidationRule> {
        self.tables.get(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Exact, shaped and query-shaped keys that existed and were deleted.
    pub keys_deleted: u64,
    /// Keys removed by tag purges.
    pub tagged_purged: u64,
}

impl InvalidationReport {
    pub fn total(&self) -> u64 {
        self.keys_deleted + self.tagged_purged
    }
}

impl fmt::Display for InvalidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} keys deleted, {} purged by tag",
            self.keys_deleted, self.tagged_purged
        )
    }
}

/// Runs invalidation rules against a [`Cache`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Invalidator {
    cache: Cache,
    rules: Arc<InvalidationRules>,
}

impl Invalidator {
    pub fn new(cache: Cache, rules: InvalidationRules) -> Self {
        Self {
            cache,
            rules: Arc::new(rules),
        }
    }

    pub fn rules(&self) -> &InvalidationRules {
        &self.rules
    }

    /// Drop everything `table`'s rule covers.
    ///
    /// `ids` are the affected entity ids; `query_shapes` are parameter maps
    /// the caller knows were cached for the rule's tags. Both may be empty.
    /// An unknown table purges the `list:{table}` tag.
    pub async fn invalidate(
        &self,
        table: &str,
        ids: &[String],
        query_shapes: &[QueryParams],
    ) -> InvalidationReport {
        let fallback;
        let rule = match self.rules.get(table) {
            Some(rule) => rule,
            None => {
                warn!(table, "no invalidation rule for table; purging list tag");
                fallback = InvalidationRule::new().tag(format!("list:{table}"));
                &fallback
            }
        };

        let mut doomed: Vec<CacheKey> = rule.keys().to_vec();

        for shape in rule.shapes() {
            for id in ids {
                match shape.key_for(id) {
                    Ok(key) => doomed.push(key),
                    Err(e) => warn!(table, id = %id, error = %e, "cannot build shaped key"),
                }
            }
        }

        if !query_shapes.is_empty() {
            for tag in rule.tags() {
                let (namespace, entity) = match split_tag(tag) {
                    Ok(parts) => parts,
                    Err(e) => {
                        warn!(table, tag = %tag, error = %e, "malformed invalidation tag");
                        continue;
                    }
                };
                for params in query_shapes {
                    match CacheKey::builder(namespace, entity)
                        .params(params.clone())
                        .build()
                    {
                        Ok(key) => doomed.push(key),
                        Err(e) => warn!(table, tag = %tag, error = %e, "cannot build query key"),
                    }
                }
            }
        }

        let deleted = join_all(doomed.iter().map(|key| self.cache.delete(key))).await;
        let mut report = InvalidationReport {
            keys_deleted: deleted.into_iter().filter(|existed| *existed).count() as u64,
            tagged_purged: 0,
        };

        for tag in rule.tags() {
            report.tagged_purged += self.cache.purge_tag(tag).await;
        }

        metrics::counter!(telemetry::INVALIDATED_KEYS_TOTAL, "table" => table.to_owned())
            .increment(report.total());
        info!(
            table,
            ids = ids.len(),
            keys_deleted = report.keys_deleted,
            tagged_purged = report.tagged_purged,
            "cache invalidated"
        );
        report
    }

    /// Table-level invalidation with no specific ids.
    pub async fn invalidate_table(&self, table: &str) -> InvalidationReport {
        self.invalidate(table, &[], &[]).await
    }

    /// Invalidation after a single-entity update.
    pub async fn invalidate_entity(&self, table: &str, id: impl fmt::Display) -> InvalidationReport {
        self.invalidate(table, &[id.to_string()], &[]).await
    }

    /// Drop one fully-qualified key.
    pub async fn invalidate_key(&self, key: &CacheKey) -> bool {
        let existed = self.cache.delete(key).await;
        debug!(key = %key, existed, "key invalidated");
        if existed {
            metrics::counter!(telemetry::INVALIDATED_KEYS_TOTAL, "table" => key.tag().to_owned())
                .increment(1);
        }
        existed
    }

    /// Fire-and-forget [`invalidate`](Self::invalidate) on a spawned task.
    ///
    /// The handle may be dropped; the outcome is logged either way.
    pub fn invalidate_detached(&self, table: String, ids: Vec<String>) -> JoinHandle<InvalidationReport> {
        let this = self.clone();
        tokio::spawn(async move { this.invalidate(&table, &ids, &[]).await })
    }
}
