//! Relying application identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Relying application a ticket is issued to, identified by its service URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Service {
    id: String,
}

impl Service {
    /// Creates a service from its identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Returns the service identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns whether a presented service is the one this ticket was issued for.
    ///
    /// Matching is exact on the identifier; a ticket issued for one URL is never
    /// redeemable by another.
    #[must_use]
    pub fn matches(&self, presented: &Self) -> bool {
        self.id == presented.id
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for Service {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
