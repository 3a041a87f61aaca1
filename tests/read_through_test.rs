//! Tests for the read-through orchestrator: hits, misses, stale-while-
//! revalidate, the refresh lease, deadlines and last-known-good fallback.

use std::convert::Infallible;
use std::future::{Ready, ready};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use hoard::{CacheKey, FetchOptions, Hoard, HoardError, InvalidationRule, Origin, TtlClass};

mod common;
use common::FailingStore;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Kpis {
    shops: u32,
}

/// Compute function that counts its invocations.
fn counted<T: Send + 'static>(
    calls: &Arc<AtomicUsize>,
    value: T,
) -> impl FnOnce() -> Ready<std::result::Result<T, Infallible>> + Send + 'static {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        ready(Ok(value))
    }
}

fn failing() -> Ready<std::result::Result<Vec<String>, std::io::Error>> {
    ready(Err(std::io::Error::other("connection reset by peer")))
}

/// Give detached refresh tasks time to finish.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

fn dashboard_key() -> CacheKey {
    CacheKey::builder("admin", "dashboard_kpis").build().unwrap()
}

// ============================================================================
// Miss and hit
// ============================================================================

#[tokio::test]
async fn miss_computes_and_stores() {
    let hoard = Hoard::builder().build().unwrap();
    let key = dashboard_key();
    let calls = Arc::new(AtomicUsize::new(0));

    let served = hoard
        .fetch(&key, TtlClass::Long, counted(&calls, Kpis { shops: 42 }))
        .await
        .unwrap();

    assert_eq!(served.origin, Origin::Upstream);
    assert_eq!(served.value, Kpis { shops: 42 });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        hoard.cache().get::<Kpis>(&key).await,
        Some(Kpis { shops: 42 })
    );
}

#[tokio::test]
async fn repeated_reads_compute_once() {
    let hoard = Hoard::builder().revalidate(false).build().unwrap();
    let key = dashboard_key();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let served = hoard
            .fetch(&key, TtlClass::Long, counted(&calls, 7u32))
            .await
            .unwrap();
        assert_eq!(served.value, 7);
    }
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hit_returns_cached_value_then_refreshes() {
    let hoard = Hoard::builder().build().unwrap();
    let key = dashboard_key();
    hoard.cache().set(&key, &1u32, TtlClass::Long).await;

    let served = hoard
        .fetch(&key, TtlClass::Long, || async { Ok::<_, Infallible>(2u32) })
        .await
        .unwrap();
    assert_eq!(served.origin, Origin::Cache);
    assert_eq!(served.value, 1, "hit serves the cached value, not the refresh");

    settle().await;
    assert_eq!(hoard.cache().get::<u32>(&key).await, Some(2));
}

#[tokio::test]
async fn hit_never_waits_for_refresh() {
    let hoard = Hoard::builder().build().unwrap();
    let key = dashboard_key();
    hoard.cache().set(&key, &1u32, TtlClass::Long).await;

    let started = std::time::Instant::now();
    let served = hoard
        .fetch(&key, TtlClass::Long, || async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, Infallible>(2u32)
        })
        .await
        .unwrap();

    assert_eq!(served.value, 1);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn refresh_failure_is_invisible() {
    let hoard = Hoard::builder().build().unwrap();
    let key = CacheKey::builder("list", "shops").build().unwrap();
    hoard
        .cache()
        .set(&key, &vec!["north".to_string()], TtlClass::Short)
        .await;

    let served = hoard.fetch(&key, TtlClass::Short, failing).await.unwrap();
    assert_eq!(served.value, vec!["north".to_string()]);

    settle().await;
    assert_eq!(
        hoard.cache().get::<Vec<String>>(&key).await,
        Some(vec!["north".to_string()])
    );
}

#[tokio::test]
async fn per_call_revalidate_override() {
    let hoard = Hoard::builder().build().unwrap();
    let key = dashboard_key();
    hoard.cache().set(&key, &1u32, TtlClass::Long).await;
    let calls = Arc::new(AtomicUsize::new(0));

    hoard
        .fetch_with(
            &key,
            TtlClass::Long,
            FetchOptions::new().revalidate(false),
            counted(&calls, 2u32),
        )
        .await
        .unwrap();
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Refresh lease
// ============================================================================

#[tokio::test]
async fn concurrent_hits_refresh_once() {
    let hoard = Hoard::builder().build().unwrap();
    let key = dashboard_key();
    hoard.cache().set(&key, &1u32, TtlClass::Long).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let results = join_all(
        (0..10).map(|_| hoard.fetch(&key, TtlClass::Long, counted(&calls, 2u32))),
    )
    .await;
    assert!(results.iter().all(|r| r.as_ref().unwrap().origin == Origin::Cache));

    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(hoard.cache().get::<u32>(&key).await, Some(2));
}

#[tokio::test]
async fn lease_throttles_until_expiry() {
    let hoard = Hoard::builder()
        .lease_ttl(Duration::from_millis(500))
        .build()
        .unwrap();
    let key = dashboard_key();
    hoard.cache().set(&key, &0u32, TtlClass::Long).await;
    let calls = Arc::new(AtomicUsize::new(0));

    hoard.fetch(&key, TtlClass::Long, counted(&calls, 1u32)).await.unwrap();
    settle().await;
    hoard.fetch(&key, TtlClass::Long, counted(&calls, 2u32)).await.unwrap();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "second hit is inside the lease window");

    tokio::time::sleep(Duration::from_millis(600)).await;
    hoard.fetch(&key, TtlClass::Long, counted(&calls, 3u32)).await.unwrap();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(hoard.cache().get::<u32>(&key).await, Some(3));
}

// ============================================================================
// Deadline
// ============================================================================

#[tokio::test(start_paused = true)]
async fn hanging_compute_times_out_at_deadline() {
    let hoard = Hoard::builder()
        .deadline(Duration::from_secs(1))
        .build()
        .unwrap();
    let key = dashboard_key();

    let started = tokio::time::Instant::now();
    let err = hoard
        .fetch(&key, TtlClass::Long, std::future::pending::<std::result::Result<u32, Infallible>>)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() <= Duration::from_millis(1200));
    assert_eq!(err.user_message(), "request timed out, please retry");
}

#[tokio::test(start_paused = true)]
async fn late_compute_still_fills_cache() {
    let hoard = Hoard::builder()
        .deadline(Duration::from_secs(1))
        .build()
        .unwrap();
    let key = dashboard_key();

    let err = hoard
        .fetch(&key, TtlClass::Long, || async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok::<_, Infallible>(Kpis { shops: 9 })
        })
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(hoard.cache().get::<Kpis>(&key).await, Some(Kpis { shops: 9 }));
}

#[tokio::test(start_paused = true)]
async fn per_call_deadline_override() {
    let hoard = Hoard::builder().build().unwrap();
    let key = dashboard_key();

    let started = tokio::time::Instant::now();
    let err = hoard
        .fetch_with(
            &key,
            TtlClass::Long,
            FetchOptions::new().deadline(Duration::from_millis(300)),
            std::future::pending::<std::result::Result<u32, Infallible>>,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HoardError::Timeout { deadline } if deadline == Duration::from_millis(300)));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn timeout_does_not_serve_fallback() {
    let hoard = Hoard::builder()
        .deadline(Duration::from_secs(1))
        .build()
        .unwrap();

    let result = hoard
        .fetch_with(
            &dashboard_key(),
            TtlClass::Long,
            FetchOptions::new().fallback(5u32),
            std::future::pending::<std::result::Result<u32, Infallible>>,
        )
        .await;

    assert!(result.unwrap_err().is_timeout());
}

// ============================================================================
// Upstream failure
// ============================================================================

#[tokio::test]
async fn upstream_failure_serves_fallback_as_stale() {
    let hoard = Hoard::builder().build().unwrap();
    let key = CacheKey::builder("list", "shops").param("page", 1).build().unwrap();
    let last_known = vec!["north".to_string()];

    let served = hoard
        .fetch_with(
            &key,
            TtlClass::Short,
            FetchOptions::new().fallback(last_known.clone()),
            failing,
        )
        .await
        .unwrap();

    assert_eq!(served.origin, Origin::Stale);
    assert!(served.is_stale());
    assert_eq!(served.value, last_known);
    assert_eq!(hoard.cache().get::<Vec<String>>(&key).await, None, "fallback is not cached");
}

#[tokio::test]
async fn upstream_failure_without_fallback_propagates() {
    let hoard = Hoard::builder().build().unwrap();
    let key = CacheKey::builder("list", "shops").build().unwrap();

    let err = hoard.fetch(&key, TtlClass::Short, failing).await.unwrap_err();

    assert!(err.is_upstream());
    assert!(err.to_string().contains("connection reset by peer"));
}

#[tokio::test]
async fn panicking_compute_is_an_upstream_failure() {
    let hoard = Hoard::builder().build().unwrap();

    let err = hoard
        .fetch(&dashboard_key(), TtlClass::Long, || async {
            if true {
                panic!("boom");
            }
            Ok::<u32, Infallible>(0)
        })
        .await
        .unwrap_err();

    assert!(err.is_upstream());
}

// ============================================================================
// Fail-open
// ============================================================================

#[tokio::test]
async fn broken_store_still_serves_computed_values() {
    let hoard = Hoard::builder()
        .store(Arc::new(FailingStore))
        .build()
        .unwrap();
    let key = dashboard_key();
    let calls = Arc::new(AtomicUsize::new(0));

    for expected_calls in 1..=3 {
        let served = hoard
            .fetch(&key, TtlClass::Long, counted(&calls, Kpis { shops: 42 }))
            .await
            .unwrap();
        assert_eq!(served.origin, Origin::Upstream);
        assert_eq!(served.value, Kpis { shops: 42 });
        assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
    }
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test(start_paused = true)]
async fn dashboard_kpis_lifecycle() {
    let key = dashboard_key();
    let hoard = Hoard::builder()
        .revalidate(false)
        .rule("shops", InvalidationRule::new().key(key.clone()))
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let first = hoard
        .fetch(&key, TtlClass::Long, counted(&calls, Kpis { shops: 42 }))
        .await
        .unwrap();
    assert_eq!(first.origin, Origin::Upstream);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;

    let second = hoard
        .fetch(&key, TtlClass::Long, counted(&calls, Kpis { shops: 0 }))
        .await
        .unwrap();
    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(second.value, Kpis { shops: 42 });
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    hoard.invalidate("shops", &[], &[]).await;

    let third = hoard
        .fetch(&key, TtlClass::Long, counted(&calls, Kpis { shops: 43 }))
        .await
        .unwrap();
    assert_eq!(third.origin, Origin::Upstream);
    assert_eq!(third.value, Kpis { shops: 43 });
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
