//! Hoard - read-through caching layer for admin and marketplace backends
//!
//! Request handlers ask for data under a deterministic [`CacheKey`]; hoard
//! serves it from the cache when present (refreshing it in the background),
//! computes it from the system of record on a miss under a deadline, and
//! falls back to a last-known-good value when the upstream fails. Write
//! paths call the invalidator with the table they touched.
//!
//! The cache is an optimisation, never a dependency: every store failure
//! degrades to a miss.
//!
//! # Example
//!
//! ```rust,no_run
//! use hoard::{CacheKey, Envelope, Hoard, InvalidationRule, KeyShape, TtlClass};
//!
//! #[tokio::main]
//! async fn main() -> hoard::Result<()> {
//!     let hoard = Hoard::builder()
//!         .rule(
//!             "shops",
//!             InvalidationRule::new()
//!                 .key(CacheKey::builder("admin", "dashboard_kpis").build()?)
//!                 .shape(KeyShape::new("vendor", "shops").sub("profile"))
//!                 .tag("list:shops"),
//!         )
//!         .build()?;
//!
//!     let key = CacheKey::builder("list", "shops").param("page", 1).build()?;
//!     let result = hoard
//!         .fetch(&key, TtlClass::Short, || async {
//!             Ok::<_, std::io::Error>(vec!["north".to_string(), "south".to_string()])
//!         })
//!         .await;
//!     let body = Envelope::from_served("shops fetched", result);
//!     println!("{}", serde_json::to_string(&body)?);
//!
//!     // After a write to `shops`:
//!     hoard.invalidate("shops", &["42".to_string()], &[]).await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod envelope;
pub mod error;
pub mod key;
pub mod layer;
pub mod store;
pub mod telemetry;
pub mod ttl;
pub mod version;

// Re-export main types at crate root
pub use cache::{
    Cache, FetchOptions, InvalidationReport, InvalidationRule, InvalidationRules, Invalidator,
    KeyShape, Origin, ReadThrough, ReadThroughConfig, Served,
};
pub use config::Settings;
pub use envelope::{Envelope, Status};
pub use error::{BoxError, HoardError, Result};
pub use key::{CacheKey, KeyBuilder, ParamValue, QueryParams, build_key};
pub use layer::{Hoard, HoardBuilder};
pub use store::{CacheStore, MemoryStore};
pub use ttl::{TtlClass, TtlPolicy};
pub use version::{BuildInfo, PKG_VERSION, version_string};
