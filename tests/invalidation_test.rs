//! Tests for invalidation fan-out.

use std::sync::Arc;

use hoard::{
    Cache, CacheKey, Hoard, InvalidationRule, InvalidationRules, Invalidator, KeyShape,
    MemoryStore, QueryParams, TtlClass, TtlPolicy,
};

fn shops_rule() -> InvalidationRule {
    InvalidationRule::new()
        .key(CacheKey::builder("admin", "dashboard_kpis").build().unwrap())
        .shape(KeyShape::new("vendor", "shops"))
        .shape(KeyShape::new("vendor", "shops").sub("profile"))
        .tag("list:shops")
}

fn invalidator() -> (Invalidator, Cache) {
    let cache = Cache::new(Arc::new(MemoryStore::new()), TtlPolicy::default());
    let rules = InvalidationRules::new().table("shops", shops_rule());
    (Invalidator::new(cache.clone(), rules), cache)
}

fn page(n: i64) -> CacheKey {
    CacheKey::builder("list", "shops").param("page", n).build().unwrap()
}

#[tokio::test]
async fn entity_update_drops_exact_and_shaped_keys() {
    let (invalidator, cache) = invalidator();
    let dashboard = CacheKey::builder("admin", "dashboard_kpis").build().unwrap();
    let shop = CacheKey::builder("vendor", "shops").id(42).build().unwrap();
    let profile = CacheKey::builder("vendor", "shops").id(42).sub("profile").build().unwrap();
    let other_shop = CacheKey::builder("vendor", "shops").id(7).build().unwrap();

    for key in [&dashboard, &shop, &profile, &other_shop] {
        cache.set(key, &1u8, TtlClass::Long).await;
    }

    let report = invalidator.invalidate_entity("shops", 42).await;

    assert_eq!(report.keys_deleted, 3);
    assert_eq!(cache.get::<u8>(&dashboard).await, None);
    assert_eq!(cache.get::<u8>(&shop).await, None);
    assert_eq!(cache.get::<u8>(&profile).await, None);
    assert_eq!(cache.get::<u8>(&other_shop).await, Some(1));
}

#[tokio::test]
async fn table_change_purges_every_registered_list_key() {
    let (invalidator, cache) = invalidator();
    for n in 1..=20 {
        cache.set(&page(n), &n, TtlClass::Short).await;
    }
    let search = CacheKey::builder("list", "shops")
        .params(QueryParams::new().with("search", "north").with("limit", 50))
        .build()
        .unwrap();
    cache.set(&search, &0, TtlClass::Short).await;

    let report = invalidator.invalidate_table("shops").await;

    assert_eq!(report.tagged_purged, 21);
    for n in 1..=20 {
        assert_eq!(cache.get::<i64>(&page(n)).await, None);
    }
    assert_eq!(cache.get::<i64>(&search).await, None);
}

#[tokio::test]
async fn query_shapes_are_deleted_explicitly() {
    let (invalidator, cache) = invalidator();
    let shape = QueryParams::new().with("page", 3);
    cache.set(&page(3), &3, TtlClass::Short).await;

    let report = invalidator.invalidate("shops", &[], &[shape]).await;

    assert_eq!(report.keys_deleted, 1);
    assert_eq!(cache.get::<i64>(&page(3)).await, None);
}

#[tokio::test]
async fn invalidation_is_idempotent() {
    let (invalidator, cache) = invalidator();
    cache.set(&page(1), &1, TtlClass::Short).await;

    let first = invalidator.invalidate_table("shops").await;
    let second = invalidator.invalidate_table("shops").await;

    assert_eq!(first.total(), 1);
    assert_eq!(second.total(), 0);
}

#[tokio::test]
async fn unknown_table_purges_list_tag() {
    let (invalidator, cache) = invalidator();
    let orders = CacheKey::builder("list", "orders").param("page", 1).build().unwrap();
    cache.set(&orders, &1, TtlClass::Short).await;

    let report = invalidator.invalidate_table("orders").await;

    assert_eq!(report.tagged_purged, 1);
    assert_eq!(cache.get::<i64>(&orders).await, None);
}

#[tokio::test]
async fn narrow_key_invalidation() {
    let (invalidator, cache) = invalidator();
    cache.set(&page(1), &1, TtlClass::Short).await;
    cache.set(&page(2), &2, TtlClass::Short).await;

    assert!(invalidator.invalidate_key(&page(1)).await);
    assert!(!invalidator.invalidate_key(&page(1)).await);
    assert_eq!(cache.get::<i64>(&page(2)).await, Some(2));
}

#[tokio::test]
async fn detached_invalidation_completes() {
    let (invalidator, cache) = invalidator();
    let shop = CacheKey::builder("vendor", "shops").id(5).build().unwrap();
    cache.set(&shop, &1u8, TtlClass::Long).await;

    let report = invalidator
        .invalidate_detached("shops".to_string(), vec!["5".to_string()])
        .await
        .unwrap();

    assert!(report.keys_deleted >= 1);
    assert_eq!(cache.get::<u8>(&shop).await, None);
}

#[tokio::test]
async fn facade_invalidation_makes_next_read_a_miss() {
    let hoard = Hoard::builder().rule("shops", shops_rule()).build().unwrap();
    let profile = CacheKey::builder("vendor", "shops").id("42").sub("profile").build().unwrap();
    hoard.cache().set(&profile, &"Northwind", TtlClass::Long).await;

    hoard.invalidate("shops", &["42".to_string()], &[]).await;

    assert_eq!(hoard.cache().get::<String>(&profile).await, None);
}
