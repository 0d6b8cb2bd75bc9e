//! Feature seed files.
//!
//! A seed lists features (and optionally per-user overrides) to create on
//! startup. Rows that already exist are never modified by seeding.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::model::{FeatureOptions, UserId};
use crate::error::{Result, TollgateError};

/// A complete seed document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSeed {
    #[serde(default)]
    pub features: Vec<SeedFeature>,
    #[serde(default)]
    pub overrides: Vec<SeedOverride>,
}

/// A feature to create if absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedFeature {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Option<FeatureOptions>,
}

/// A user override to create if absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedOverride {
    pub feature: String,
    pub user_id: UserId,
    pub enabled: bool,
}

impl FeatureSeed {
    /// Load a seed from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading feature seed");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a seed from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let seed: FeatureSeed = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse feature seed: {}", e)))?;

        if let Some(empty) = seed.features.iter().find(|f| f.name.trim().is_empty()) {
            return Err(TollgateError::Config(format!(
                "Feature seed contains an entry without a name: {:?}",
                empty
            )));
        }

        Ok(seed)
    }
}
