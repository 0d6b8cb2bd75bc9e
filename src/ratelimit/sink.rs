//! Observability sink for rate limit events.

use serde::Serialize;
use tracing::warn;

use super::identity::IdentityClass;

/// Emitted whenever a request is counted past its ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitEvent {
    /// Rendered identity (anonymous addresses are hashed)
    pub identity: String,
    pub class: IdentityClass,
    pub endpoint: String,
    pub count: u64,
    pub limit: u64,
}

/// Receives rate limit events.
pub trait EventSink: Send + Sync {
    fn rate_limit_exceeded(&self, event: &RateLimitEvent);
}

/// Sink that writes events as structured warnings on the `rate_limit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn rate_limit_exceeded(&self, event: &RateLimitEvent) {
        warn!(
            target: "rate_limit",
            identity = %event.identity,
            class = ?event.class,
            endpoint = %event.endpoint,
            count = event.count,
            limit = event.limit,
            "Rate limit exceeded"
        );
    }
}
