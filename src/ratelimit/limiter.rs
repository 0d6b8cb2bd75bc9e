//! Core fixed-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, trace};

use super::identity::{CounterKey, Identity};
use super::policy::{FailurePolicy, LimitPolicy};
use super::sink::{EventSink, RateLimitEvent, TracingSink};
use crate::config::RateLimitingConfig;
use crate::error::StoreError;
use crate::store::CounterStore;

/// Default namespace for counter keys.
const DEFAULT_KEY_PREFIX: &str = "rate_limit";

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    /// Whether this request went past the ceiling
    pub exceeded: bool,
    /// Requests left in the current window
    pub remaining: u64,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
    /// Ceiling applied to the identity
    pub limit: u64,
    /// Counter value after this request (0 when the store was unreachable)
    pub count: u64,
}

impl RateLimitDecision {
    /// The `(exceeded, remaining, reset_at)` triple.
    pub fn as_tuple(&self) -> (bool, u64, DateTime<Utc>) {
        (self.exceeded, self.remaining, self.reset_at)
    }

    /// Time a rejected caller should wait before retrying.
    pub fn retry_after(&self) -> Duration {
        (self.reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Response metadata headers for the HTTP layer.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_at.timestamp().to_string()),
        ];
        if self.exceeded {
            let secs = self.retry_after().as_secs_f64().ceil() as u64;
            headers.push(("Retry-After", secs.to_string()));
        }
        headers
    }
}

/// Fixed-window rate limiter over a shared counter store.
///
/// Holds no counter state itself; every decision goes through the store, so
/// all limiter instances sharing a store enforce the same limits.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    policy: LimitPolicy,
    key_prefix: String,
    failure_policy: FailurePolicy,
    sink: Arc<dyn EventSink>,
}

impl RateLimiter {
    /// Create a rate limiter with the default prefix, fail-open policy and tracing sink.
    pub fn new(store: Arc<dyn CounterStore>, policy: LimitPolicy) -> Self {
        Self {
            store,
            policy,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            failure_policy: FailurePolicy::default(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Create a rate limiter from configuration.
    pub fn with_config(store: Arc<dyn CounterStore>, config: &RateLimitingConfig) -> Self {
        Self::new(store, LimitPolicy::from_config(config))
            .with_key_prefix(&config.key_prefix)
            .with_failure_policy(config.failure_policy)
    }

    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn policy(&self) -> &LimitPolicy {
        &self.policy
    }

    /// Counter store key for an identity and endpoint.
    pub fn counter_key(&self, identity: &Identity, endpoint: &str) -> String {
        CounterKey::new(&self.key_prefix, identity, endpoint).to_string()
    }

    /// Count one request and decide whether it is over the ceiling.
    pub async fn check_limit(&self, identity: &Identity, endpoint: &str) -> RateLimitDecision {
        let key = self.counter_key(identity, endpoint);
        let limit = self.policy.ceiling(identity.class());

        trace!(key = %key, limit, "Checking rate limit");

        let (count, ttl) = match self.advance(&key).await {
            Ok(state) => state,
            Err(e) => return self.store_failure(&key, limit, e),
        };

        let exceeded = count > limit;
        let decision = RateLimitDecision {
            exceeded,
            remaining: limit.saturating_sub(count),
            reset_at: reset_at(ttl),
            limit,
            count,
        };

        if exceeded {
            self.sink.rate_limit_exceeded(&RateLimitEvent {
                identity: identity.to_string(),
                class: identity.class(),
                endpoint: endpoint.to_string(),
                count,
                limit,
            });
        }

        decision
    }

    /// Start a window or count within the live one, returning the new count
    /// and the window's remaining lifetime.
    ///
    /// Claiming the window and counting within it are each a single atomic
    /// store call, so a request that loses the claim can never reset a window
    /// another request already started.
    async fn advance(&self, key: &str) -> Result<(u64, Duration), StoreError> {
        let window = self.policy.window();
        if self.store.set_if_absent_with_expiry(key, 1, window).await? {
            debug!(key = %key, window_secs = window.as_secs(), "Starting new rate limit window");
            return Ok((1, window));
        }

        let count = self.store.increment(key).await?;
        let ttl = self.store.ttl(key).await?.unwrap_or(window);
        Ok((count, ttl))
    }

    fn store_failure(&self, key: &str, limit: u64, e: StoreError) -> RateLimitDecision {
        let reset_at = reset_at(self.policy.window());
        match self.failure_policy {
            FailurePolicy::FailOpen => {
                error!(key = %key, error = %e, "Counter store unavailable, admitting request");
                RateLimitDecision {
                    exceeded: false,
                    remaining: limit,
                    reset_at,
                    limit,
                    count: 0,
                }
            }
            FailurePolicy::FailClosed => {
                error!(key = %key, error = %e, "Counter store unavailable, rejecting request");
                RateLimitDecision {
                    exceeded: true,
                    remaining: 0,
                    reset_at,
                    limit,
                    count: 0,
                }
            }
        }
    }

    /// Current count for an identity and endpoint, if a window is live.
    pub async fn current_count(
        &self,
        identity: &Identity,
        endpoint: &str,
    ) -> Result<Option<u64>, StoreError> {
        self.store.get(&self.counter_key(identity, endpoint)).await
    }

    /// Drop the counter so the next request starts a fresh window.
    pub async fn reset(&self, identity: &Identity, endpoint: &str) -> Result<(), StoreError> {
        self.store.forget(&self.counter_key(identity, endpoint)).await
    }
}

fn reset_at(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
    Utc::now() + ttl
}
