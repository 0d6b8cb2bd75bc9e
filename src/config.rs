//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TollgateError};
use crate::ratelimit::FailurePolicy;

/// Prefix for environment variable overrides, e.g. `TOLLGATE__RATE_LIMITING__WINDOW_SECS`.
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for Tollgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Feature flag configuration
    #[serde(default)]
    pub features: FeatureFlagConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Feature flag configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlagConfig {
    /// How long resolved flags stay cached, in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Optional YAML file with features to create on startup
    #[serde(default)]
    pub seed_path: Option<String>,
}

impl Default for FeatureFlagConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            seed_path: None,
        }
    }
}

impl FeatureFlagConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Fixed window length in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Prefix for counter keys in the counter store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Per-class request ceilings
    #[serde(default)]
    pub ceilings: CeilingConfig,

    /// What to decide when the counter store cannot be reached
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window(),
            key_prefix: default_key_prefix(),
            ceilings: CeilingConfig::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn default_window() -> u64 {
    60
}

fn default_key_prefix() -> String {
    "rate_limit".to_string()
}

/// Maximum requests per window for each identity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeilingConfig {
    #[serde(default = "default_anonymous_ceiling")]
    pub anonymous: u64,
    #[serde(default = "default_authenticated_ceiling")]
    pub authenticated: u64,
    #[serde(default = "default_premium_ceiling")]
    pub premium: u64,
}

impl Default for CeilingConfig {
    fn default() -> Self {
        Self {
            anonymous: default_anonymous_ceiling(),
            authenticated: default_authenticated_ceiling(),
            premium: default_premium_ceiling(),
        }
    }
}

fn default_anonymous_ceiling() -> u64 {
    5
}

fn default_authenticated_ceiling() -> u64 {
    100
}

fn default_premium_ceiling() -> u64 {
    300
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TollgateConfig {
    /// Load configuration from a single YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load layered configuration: defaults, then the optional file, then
    /// `TOLLGATE__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(Path::new(path)).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: TollgateConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TollgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engines cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.window_secs == 0 {
            return Err(TollgateError::Config(
                "rate_limiting.window_secs must be greater than zero".to_string(),
            ));
        }

        let ceilings = &self.rate_limiting.ceilings;
        if ceilings.anonymous > ceilings.authenticated
            || ceilings.authenticated > ceilings.premium
        {
            return Err(TollgateError::Config(format!(
                "ceilings must satisfy anonymous <= authenticated <= premium (got {} / {} / {})",
                ceilings.anonymous, ceilings.authenticated, ceilings.premium
            )));
        }

        Ok(())
    }
}
