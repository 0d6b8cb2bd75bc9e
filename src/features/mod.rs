//! Feature flag definitions, overrides and resolution.

mod model;
mod resolver;
mod seed;

pub use model::{Feature, FeatureOptions, FeatureOverride, UserId};
pub use resolver::{FeatureFlagResolver, SeedSummary};
pub use seed::{FeatureSeed, SeedFeature, SeedOverride};
