//! Store abstractions consumed by the flag resolver and the rate limiter.
//!
//! Every call into a store is a potential suspension point, so all traits
//! are async. Implementations must make `CounterStore::increment` atomic;
//! the engines never lock around store calls themselves.

mod cache;
mod memory;
#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::features::{Feature, FeatureOptions, FeatureOverride, UserId};

pub use cache::{remember, Cache, MemoryCache};
pub use memory::{MemoryCounterStore, MemoryFeatureStore};

/// Shared counter store with expiring keys.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value of a live counter.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Atomically add one and return the new value. A missing key starts at zero
    /// and carries no expiry.
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// Remaining lifetime of the key. `None` when the key is absent, expired,
    /// or has no expiry set.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Atomically start a window: set the counter and its expiry only when no
    /// live window exists, i.e. the key is absent, expired, or has no expiry.
    /// Returns `false` when another caller already holds the window.
    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: u64,
        expiry: Duration,
    ) -> Result<bool, StoreError>;

    /// Overwrite the counter and start a fresh expiry.
    async fn set_with_expiry(&self, key: &str, value: u64, expiry: Duration)
        -> Result<(), StoreError>;

    /// Drop the counter immediately.
    async fn forget(&self, key: &str) -> Result<(), StoreError>;
}

/// Persistent store of feature definitions and per-user overrides.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Feature>, StoreError>;

    /// Insert or update a feature by name.
    ///
    /// `None` for `description` or `options` keeps the stored value; a new
    /// feature without a description gets `"Feature: {name}"`.
    async fn upsert(
        &self,
        name: &str,
        enabled: bool,
        description: Option<&str>,
        options: Option<FeatureOptions>,
    ) -> Result<Feature, StoreError>;

    /// Insert a feature only if no row with that name exists, returning
    /// whether it was inserted. Never modifies an existing row.
    async fn create_if_absent(
        &self,
        name: &str,
        enabled: bool,
        description: Option<&str>,
        options: Option<FeatureOptions>,
    ) -> Result<bool, StoreError>;

    async fn find_override(&self, name: &str, user_id: UserId)
        -> Result<Option<bool>, StoreError>;

    /// Insert or update the single override row for `(name, user_id)`.
    /// Fails with [`StoreError::Rejected`] when the feature does not exist.
    async fn upsert_override(
        &self,
        name: &str,
        user_id: UserId,
        enabled: bool,
    ) -> Result<(), StoreError>;

    /// Remove an override row, returning whether one existed.
    async fn delete_override(&self, name: &str, user_id: UserId) -> Result<bool, StoreError>;

    async fn list_all(&self) -> Result<Vec<Feature>, StoreError>;

    async fn list_overrides_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<FeatureOverride>, StoreError>;
}
