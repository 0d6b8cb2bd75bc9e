//! Store fakes that fail every call, for exercising error paths.

use std::time::Duration;

use async_trait::async_trait;

use super::{Cache, CounterStore, FeatureStore};
use crate::error::StoreError;
use crate::features::{Feature, FeatureOptions, FeatureOverride, UserId};

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

pub(crate) struct UnavailableCounterStore;

#[async_trait]
impl CounterStore for UnavailableCounterStore {
    async fn get(&self, _key: &str) -> Result<Option<u64>, StoreError> {
        Err(down())
    }

    async fn increment(&self, _key: &str) -> Result<u64, StoreError> {
        Err(down())
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
        Err(down())
    }

    async fn set_if_absent_with_expiry(
        &self,
        _key: &str,
        _value: u64,
        _expiry: Duration,
    ) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn set_with_expiry(
        &self,
        _key: &str,
        _value: u64,
        _expiry: Duration,
    ) -> Result<(), StoreError> {
        Err(down())
    }

    async fn forget(&self, _key: &str) -> Result<(), StoreError> {
        Err(down())
    }
}

pub(crate) struct UnavailableFeatureStore;

#[async_trait]
impl FeatureStore for UnavailableFeatureStore {
    async fn find_by_name(&self, _name: &str) -> Result<Option<Feature>, StoreError> {
        Err(down())
    }

    async fn upsert(
        &self,
        _name: &str,
        _enabled: bool,
        _description: Option<&str>,
        _options: Option<FeatureOptions>,
    ) -> Result<Feature, StoreError> {
        Err(down())
    }

    async fn create_if_absent(
        &self,
        _name: &str,
        _enabled: bool,
        _description: Option<&str>,
        _options: Option<FeatureOptions>,
    ) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn find_override(
        &self,
        _name: &str,
        _user_id: UserId,
    ) -> Result<Option<bool>, StoreError> {
        Err(down())
    }

    async fn upsert_override(
        &self,
        _name: &str,
        _user_id: UserId,
        _enabled: bool,
    ) -> Result<(), StoreError> {
        Err(down())
    }

    async fn delete_override(&self, _name: &str, _user_id: UserId) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn list_all(&self) -> Result<Vec<Feature>, StoreError> {
        Err(down())
    }

    async fn list_overrides_for_user(
        &self,
        _user_id: UserId,
    ) -> Result<Vec<FeatureOverride>, StoreError> {
        Err(down())
    }
}

pub(crate) struct UnavailableCache;

#[async_trait]
impl Cache for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Err(down())
    }

    async fn put(
        &self,
        _key: &str,
        _value: serde_json::Value,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        Err(down())
    }

    async fn forget(&self, _key: &str) -> Result<(), StoreError> {
        Err(down())
    }
}
