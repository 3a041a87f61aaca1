//! Telemetry metric name constants.
//!
//! Centralised metric names for hoard operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `hoard_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `tag`: key tag, `{namespace}:{entity}` (e.g. "list:b2b_users")
//! - `op`: store operation: "get", "set", "delete", "purge", "lease"
//! - `outcome`: background refresh outcome: "ok" or "error"

/// Reads served from the cache.
///
/// Labels: `tag`.
pub const CACHE_HITS_TOTAL: &str = "hoard_cache_hits_total";

/// Reads that found nothing in the cache (including fail-open reads).
///
/// Labels: `tag`.
pub const CACHE_MISSES_TOTAL: &str = "hoard_cache_misses_total";

/// Store-level failures swallowed by the adapter.
///
/// Labels: `op`.
pub const STORE_ERRORS_TOTAL: &str = "hoard_store_errors_total";

/// Completed background refreshes.
///
/// Labels: `tag`, `outcome` ("ok" | "error").
pub const REFRESH_TOTAL: &str = "hoard_refresh_total";

/// Background refreshes skipped because another holder owns the lease.
///
/// Labels: `tag`.
pub const REFRESH_SKIPPED_TOTAL: &str = "hoard_refresh_skipped_total";

/// Duration of cold-path compute calls in seconds.
///
/// Labels: `tag`.
pub const COMPUTE_DURATION_SECONDS: &str = "hoard_compute_duration_seconds";

/// Cold-path computes that lost the deadline race.
///
/// Labels: `tag`.
pub const TIMEOUTS_TOTAL: &str = "hoard_timeouts_total";

/// Responses served from a last-known-good value after an upstream failure.
///
/// Labels: `tag`.
pub const STALE_SERVED_TOTAL: &str = "hoard_stale_served_total";

/// Keys removed by invalidation fan-out.
///
/// Labels: `table`.
pub const INVALIDATED_KEYS_TOTAL: &str = "hoard_invalidated_keys_total";
