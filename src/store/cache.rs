//! Cache-through helper and an in-process TTL cache.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{trace, warn};

use crate::error::StoreError;

/// A key-value cache holding JSON values with a per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration)
        -> Result<(), StoreError>;

    /// Evict a key. Must complete before returning so later reads miss.
    async fn forget(&self, key: &str) -> Result<(), StoreError>;
}

/// Return the cached value for `key`, or run `producer` and cache its result.
///
/// Cache faults degrade to calling the producer; only producer errors are
/// returned to the caller.
pub async fn remember<T, F, Fut>(
    cache: &dyn Cache,
    key: &str,
    ttl: Duration,
    producer: F,
) -> Result<T, StoreError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match cache.get(key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(hit) => {
                trace!(key = %key, "Cache hit");
                return Ok(hit);
            }
            Err(e) => warn!(key = %key, error = %e, "Discarding undecodable cache entry"),
        },
        Ok(None) => trace!(key = %key, "Cache miss"),
        Err(e) => warn!(key = %key, error = %e, "Cache read failed, bypassing cache"),
    }

    let value = producer().await?;

    match serde_json::to_value(&value) {
        Ok(encoded) => {
            if let Err(e) = cache.put(key, encoded, ttl).await {
                warn!(key = %key, error = %e, "Cache write failed");
            }
        }
        Err(e) => warn!(key = %key, error = %e, "Value not cacheable"),
    }

    Ok(value)
}

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process cache backed by a concurrent map. Expired entries are dropped
/// lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| e.expires_at > Instant::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
