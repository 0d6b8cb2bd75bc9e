//! Feature flag records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an authenticated user.
pub type UserId = u64;

/// A globally defined feature flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Unique feature name
    pub name: String,
    /// Global on/off state
    pub enabled: bool,
    /// Human readable description
    pub description: String,
    /// Rollout metadata
    #[serde(default)]
    pub options: FeatureOptions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feature {
    /// Create a feature stamped with the current time.
    pub fn new(name: impl Into<String>, enabled: bool, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            enabled,
            description: description.into(),
            options: FeatureOptions::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Description given to features created without one.
    pub fn default_description(name: &str) -> String {
        format!("Feature: {}", name)
    }
}

/// Optional rollout metadata attached to a feature.
///
/// Stored and returned with the feature; flag resolution does not evaluate it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureOptions {
    /// Intended share of users, 0 to 100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_percentage: Option<u8>,
    /// Intended end of the rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl FeatureOptions {
    pub fn is_empty(&self) -> bool {
        self.rollout_percentage.is_none() && self.expires_at.is_none()
    }
}

/// A per-user value that takes precedence over the global flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureOverride {
    pub feature_name: String,
    pub user_id: UserId,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}
