//! In-memory store implementations.
//!
//! These are shared by reference across tasks and are suitable for a single
//! process. A fleet of processes needs one external counter store instead.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use super::{CounterStore, FeatureStore};
use crate::error::StoreError;
use crate::features::{Feature, FeatureOptions, FeatureOverride, UserId};

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Counter store with Redis-like `INCR`/`TTL`/`SET EX` semantics.
///
/// Increments run under the map shard's write lock, so concurrent callers
/// for the same key always observe distinct values.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, CounterEntry>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of live counters.
    pub fn counter_count(&self) -> usize {
        let now = Instant::now();
        self.counters.iter().filter(|e| !e.is_expired(now)).count()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        Ok(self
            .counters
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.count))
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entry = self.counters.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: None,
        });

        if entry.is_expired(now) {
            *entry = CounterEntry {
                count: 0,
                expires_at: None,
            };
        }

        entry.count += 1;
        Ok(entry.count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let remaining = self.counters.get(key).and_then(|e| match e.expires_at {
            Some(at) if at > now => Some(at - now),
            _ => None,
        });

        if remaining.is_none() {
            self.counters.remove_if(key, |_, e| e.is_expired(now));
        }

        Ok(remaining)
    }

    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: u64,
        expiry: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entry = self.counters.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: None,
        });

        match entry.expires_at {
            Some(at) if at > now => Ok(false),
            _ => {
                *entry = CounterEntry {
                    count: value,
                    expires_at: Some(now + expiry),
                };
                Ok(true)
            }
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: u64,
        expiry: Duration,
    ) -> Result<(), StoreError> {
        self.counters.insert(
            key.to_string(),
            CounterEntry {
                count: value,
                expires_at: Some(Instant::now() + expiry),
            },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), StoreError> {
        self.counters.remove(key);
        Ok(())
    }
}

#[derive(Default)]
struct FeatureTables {
    features: BTreeMap<String, Feature>,
    overrides: BTreeMap<(String, UserId), FeatureOverride>,
}

/// Feature store keeping definitions and overrides in ordered maps.
#[derive(Default)]
pub struct MemoryFeatureStore {
    tables: RwLock<FeatureTables>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored override rows.
    pub fn override_count(&self) -> usize {
        self.tables.read().overrides.len()
    }
}

#[async_trait]
impl FeatureStore for MemoryFeatureStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Feature>, StoreError> {
        Ok(self.tables.read().features.get(name).cloned())
    }

    async fn upsert(
        &self,
        name: &str,
        enabled: bool,
        description: Option<&str>,
        options: Option<FeatureOptions>,
    ) -> Result<Feature, StoreError> {
        let mut tables = self.tables.write();
        let now = Utc::now();

        let feature = tables
            .features
            .entry(name.to_string())
            .and_modify(|f| {
                f.enabled = enabled;
                f.updated_at = now;
            })
            .or_insert_with(|| {
                debug!(feature = %name, "Creating feature row");
                Feature::new(name, enabled, Feature::default_description(name))
            });

        if let Some(description) = description {
            feature.description = description.to_string();
        }
        if let Some(options) = options {
            feature.options = options;
        }

        Ok(feature.clone())
    }

    async fn create_if_absent(
        &self,
        name: &str,
        enabled: bool,
        description: Option<&str>,
        options: Option<FeatureOptions>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        if tables.features.contains_key(name) {
            return Ok(false);
        }

        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| Feature::default_description(name));
        let mut feature = Feature::new(name, enabled, description);
        if let Some(options) = options {
            feature.options = options;
        }

        debug!(feature = %name, "Creating feature row");
        tables.features.insert(name.to_string(), feature);
        Ok(true)
    }

    async fn find_override(
        &self,
        name: &str,
        user_id: UserId,
    ) -> Result<Option<bool>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .overrides
            .get(&(name.to_string(), user_id))
            .map(|o| o.enabled))
    }

    async fn upsert_override(
        &self,
        name: &str,
        user_id: UserId,
        enabled: bool,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.features.contains_key(name) {
            return Err(StoreError::Rejected(format!("feature '{}' does not exist", name)));
        }

        tables.overrides.insert(
            (name.to_string(), user_id),
            FeatureOverride {
                feature_name: name.to_string(),
                user_id,
                enabled,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_override(&self, name: &str, user_id: UserId) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        Ok(tables.overrides.remove(&(name.to_string(), user_id)).is_some())
    }

    async fn list_all(&self) -> Result<Vec<Feature>, StoreError> {
        Ok(self.tables.read().features.values().cloned().collect())
    }

    async fn list_overrides_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<FeatureOverride>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .overrides
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }
}
