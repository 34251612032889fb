//! Storage driver error types.

use sso_core::TicketError;
use thiserror::Error;

/// Errors raised by storage drivers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection to the backend failed.
    #[error("ticket store connection error: {0}")]
    Connection(String),

    /// The backend did not answer in time.
    #[error("ticket store operation timed out")]
    Timeout,

    /// A stored payload could not be encoded or decoded.
    #[error("ticket store serialization error: {0}")]
    Serialization(String),

    /// Internal driver error.
    #[error("internal ticket store error: {0}")]
    Internal(String),
}

/// Result type for storage driver operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<StoreError> for TicketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(_) | StoreError::Timeout => {
                Self::RegistryUnavailable(err.to_string())
            }
            StoreError::Serialization(_) | StoreError::Internal(_) => Self::Internal(err.to_string()),
        }
    }
}
