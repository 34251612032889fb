//! Authentication results.
//!
//! An [`Authentication`] is produced by the external credential verifier and
//! owned by the ticket-granting ticket it backs. Readers always receive a
//! clone; the stored value is never shared.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known authentication attribute names.
pub mod attributes {
    /// Set to `true` when the user asked for a long-term ("remember me") session.
    pub const REMEMBER_ME: &str = "longTermAuthenticationRequestTokenUsed";
    /// Principal performing an impersonation.
    pub const SURROGATE_PRINCIPAL: &str = "surrogatePrincipal";
    /// User being impersonated.
    pub const SURROGATE_USER: &str = "surrogateUser";
    /// Names of the handlers that verified the credentials.
    pub const SUCCESSFUL_HANDLERS: &str = "successfulAuthenticationHandlers";
}

/// Authenticated subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier (user name or subject id).
    pub id: String,
    /// Principal attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Principal {
    /// Creates a principal without attributes.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a principal attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }
}

/// Outcome of a successful credential verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    /// Authenticated principal.
    pub principal: Principal,
    /// Authentication attributes (method metadata, remember-me, surrogate info).
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    /// When the credentials were verified.
    pub authenticated_at: DateTime<Utc>,
    /// Handlers that verified the credentials.
    #[serde(default)]
    pub successes: Vec<String>,
}

impl Authentication {
    /// Creates an authentication for the principal at the given instant.
    #[must_use]
    pub fn new(principal: Principal, authenticated_at: DateTime<Utc>) -> Self {
        Self {
            principal,
            attributes: BTreeMap::new(),
            authenticated_at,
            successes: Vec::new(),
        }
    }

    /// Adds an authentication attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Records the name of a handler that verified the credentials.
    #[must_use]
    pub fn with_success(mut self, handler: impl Into<String>) -> Self {
        self.successes.push(handler.into());
        self
    }

    /// Returns the principal identifier.
    #[must_use]
    pub fn principal_id(&self) -> &str {
        &self.principal.id
    }

    /// Returns the values of an authentication attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Returns whether an authentication attribute is present.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Returns whether the authentication requested a long-term session.
    #[must_use]
    pub fn is_remember_me(&self) -> bool {
        self.attribute(attributes::REMEMBER_ME)
            .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case("true")))
    }

    /// Returns whether this is an impersonation (surrogate) session.
    #[must_use]
    pub fn is_surrogate(&self) -> bool {
        self.has_attribute(attributes::SURROGATE_PRINCIPAL)
            && self.has_attribute(attributes::SURROGATE_USER)
    }
}
