//! Error taxonomy for the ticket lifecycle.
//!
//! Every failure that can reach a protocol adapter is one of these variants.
//! Lookups that fail for different reasons (absent, wrong type, expired,
//! already consumed) all collapse into [`TicketError::InvalidTicket`] so a
//! caller cannot use the error to tell a replay apart from a forged id.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for ticket operations.
pub type TicketResult<T> = Result<T, TicketError>;

/// Errors raised by the ticket factory, registry and central authority.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketError {
    /// Ticket is absent, of the wrong type, expired or already consumed.
    ///
    /// The display form is deliberately generic; the id is kept for logs.
    #[error("ticket not recognized")]
    InvalidTicket(String),

    /// The service is not permitted to receive tickets.
    #[error("service is not authorized: {0}")]
    UnauthorizedService(String),

    /// The service is not permitted to use proxy authentication.
    #[error("service is not authorized to proxy: {0}")]
    UnauthorizedProxying(String),

    /// Ticket was used again before its minimum interval elapsed.
    ///
    /// The ticket remains valid; the caller should back off and retry.
    #[error("ticket used too frequently, retry after {retry_after:?}")]
    Throttled {
        /// Ticket identifier.
        id: String,
        /// Remaining time before the ticket may be used again.
        retry_after: Duration,
    },

    /// A ticket with the same identifier already exists.
    #[error("duplicate ticket identifier")]
    DuplicateTicket(String),

    /// The storage backend timed out or is partitioned.
    #[error("ticket registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Optimistic update lost every retry against concurrent writers.
    #[error("concurrent update on ticket exceeded retry budget")]
    ConcurrentUpdate(String),

    /// Presented credentials could not be verified.
    #[error("authentication failed")]
    Authentication(String),

    /// Presented credentials belong to a different principal than the session.
    #[error("authenticated principal does not match the session principal")]
    MixedPrincipal,

    /// Internal invariant violation (corrupt record, serialization failure).
    #[error("internal ticket error: {0}")]
    Internal(String),
}

impl TicketError {
    /// Creates an [`TicketError::InvalidTicket`] for the given id.
    #[must_use]
    pub fn invalid(id: impl Into<String>) -> Self {
        Self::InvalidTicket(id.into())
    }

    /// Returns whether the caller may retry the operation with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. } | Self::RegistryUnavailable(_) | Self::ConcurrentUpdate(_)
        )
    }

    /// Returns whether this error signals a broken internal invariant.
    ///
    /// Fatal errors are logged and must never be mapped onto a protocol response
    /// that reveals their nature.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DuplicateTicket(_) | Self::Internal(_))
    }

    /// Returns whether this is an invalid-ticket error.
    #[must_use]
    pub const fn is_invalid_ticket(&self) -> bool {
        matches!(self, Self::InvalidTicket(_))
    }

    /// Prefixes the context of a registry failure, leaving other errors untouched.
    #[must_use]
    pub fn with_registry_context(self, context: &str) -> Self {
        match self {
            Self::RegistryUnavailable(msg) => Self::RegistryUnavailable(format!("{context}: {msg}")),
            other => other,
        }
    }
}
