//! Credential verification.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use sso_core::{Clock, TicketError, TicketResult};
use sso_ticket::authentication::attributes;
use sso_ticket::{Authentication, Principal};

/// Credentials presented by a user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    id: String,
    secret: String,
    remember_me: bool,
}

impl Credential {
    /// Creates a username/secret credential.
    #[must_use]
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            remember_me: false,
        }
    }

    /// Requests a long-term ("remember me") session.
    #[must_use]
    pub const fn with_remember_me(mut self, remember_me: bool) -> Self {
        self.remember_me = remember_me;
        self
    }

    /// Returns the claimed identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Returns whether a long-term session was requested.
    #[must_use]
    pub const fn remember_me(&self) -> bool {
        self.remember_me
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

/// Verifies credentials and produces an authentication.
#[async_trait]
pub trait CredentialVerifier: Send + Sync + fmt::Debug {
    /// Verifies the credential.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::Authentication`] if the credential is rejected.
    async fn verify(&self, credential: &Credential) -> TicketResult<Authentication>;
}

/// Verifier backed by an in-memory user table.
#[derive(Debug)]
pub struct InMemoryCredentialVerifier {
    users: DashMap<String, String>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCredentialVerifier {
    /// Name recorded as the successful handler.
    pub const HANDLER: &'static str = "InMemoryCredentialVerifier";

    /// Creates a verifier without users.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: DashMap::new(),
            clock,
        }
    }

    /// Adds or replaces a user.
    #[must_use]
    pub fn with_user(self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.users.insert(id.into(), secret.into());
        self
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryCredentialVerifier {
    async fn verify(&self, credential: &Credential) -> TicketResult<Authentication> {
        let accepted = self
            .users
            .get(credential.id())
            .is_some_and(|secret| secret.as_str() == credential.secret());
        if !accepted {
            tracing::debug!(principal = %credential.id(), "credential rejected");
            return Err(TicketError::Authentication(credential.id().to_string()));
        }

        let mut authentication = Authentication::new(Principal::new(credential.id()), self.clock.now())
            .with_success(Self::HANDLER)
            .with_attribute(attributes::SUCCESSFUL_HANDLERS, Self::HANDLER);
        if credential.remember_me() {
            authentication = authentication.with_attribute(attributes::REMEMBER_ME, "true");
        }
        Ok(authentication)
    }
}
