//! Test doubles shared by the integration tests.

use std::time::Duration;

use async_trait::async_trait;

use hoard::store::CacheStore;
use hoard::{HoardError, Result};

/// A store whose every operation fails, as if the connection were down.
pub struct FailingStore;

fn down<T>() -> Result<T> {
    Err(HoardError::Store("connection refused".into()))
}

#[async_trait]
impl CacheStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        down()
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> Result<()> {
        down()
    }

    async fn set_if_absent(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<bool> {
        down()
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        down()
    }

    async fn delete_by_prefix(&self, _prefix: &str) -> Result<u64> {
        down()
    }

    async fn index_add(&self, _tag: &str, _key: &str, _ttl: Option<Duration>) -> Result<()> {
        down()
    }

    async fn index_drain(&self, _tag: &str) -> Result<Vec<String>> {
        down()
    }
}
