//! Ceiling and window policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::identity::IdentityClass;
use crate::config::{CeilingConfig, RateLimitingConfig};

/// Decision taken when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit the request and log the fault
    #[default]
    FailOpen,
    /// Reject the request
    FailClosed,
}

/// Maps identity classes to ceilings within one fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    window: Duration,
    ceilings: CeilingConfig,
}

impl LimitPolicy {
    pub fn new(window: Duration, ceilings: CeilingConfig) -> Self {
        Self { window, ceilings }
    }

    pub fn from_config(config: &RateLimitingConfig) -> Self {
        Self::new(Duration::from_secs(config.window_secs), config.ceilings)
    }

    /// Maximum requests per window for a class. Does not depend on the endpoint.
    pub fn ceiling(&self, class: IdentityClass) -> u64 {
        match class {
            IdentityClass::Anonymous => self.ceilings.anonymous,
            IdentityClass::Authenticated => self.ceilings.authenticated,
            IdentityClass::Premium => self.ceilings.premium,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self::from_config(&RateLimitingConfig::default())
    }
}
