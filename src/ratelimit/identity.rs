//! Rate limit subjects and counter key generation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::UserId;

/// Hex MD5 digest used to keep raw addresses and paths out of counter keys.
fn digest(value: &str) -> String {
    format!("{:x}", md5::compute(value))
}

/// The subject a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Unauthenticated caller identified by client address
    Anonymous { address: String },
    /// Authenticated user
    User { id: UserId, premium: bool },
}

impl Identity {
    pub fn anonymous(address: impl Into<String>) -> Self {
        Identity::Anonymous {
            address: address.into(),
        }
    }

    pub fn user(id: UserId) -> Self {
        Identity::User { id, premium: false }
    }

    pub fn premium(id: UserId) -> Self {
        Identity::User { id, premium: true }
    }

    /// Classify this identity for ceiling lookup.
    pub fn class(&self) -> IdentityClass {
        match self {
            Identity::Anonymous { .. } => IdentityClass::Anonymous,
            Identity::User { premium: false, .. } => IdentityClass::Authenticated,
            Identity::User { premium: true, .. } => IdentityClass::Premium,
        }
    }
}

/// Renders the identity the way it appears in counter keys and logs.
/// Anonymous addresses are always hashed.
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Anonymous { address } => write!(f, "ip:{}", digest(address)),
            Identity::User { id, .. } => write!(f, "user:{}", id),
        }
    }
}

/// Identity classes, each with its own ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityClass {
    Anonymous,
    Authenticated,
    Premium,
}

/// A key that uniquely identifies one identity's counter for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Namespace prefix in the counter store
    pub prefix: String,
    /// Rendered identity segment
    pub identity: String,
    /// Digest of the endpoint path
    pub endpoint: String,
}

impl CounterKey {
    /// Create a new counter key from an identity and endpoint.
    pub fn new(prefix: &str, identity: &Identity, endpoint: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            identity: identity.to_string(),
            endpoint: digest(endpoint),
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:endpoint:{}", self.prefix, self.identity, self.endpoint)
    }
}
