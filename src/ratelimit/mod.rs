//! Fixed-window rate limiting.

mod identity;
mod limiter;
mod policy;
mod sink;

pub use identity::{CounterKey, Identity, IdentityClass};
pub use limiter::{RateLimitDecision, RateLimiter};
pub use policy::{FailurePolicy, LimitPolicy};
pub use sink::{EventSink, RateLimitEvent, TracingSink};
