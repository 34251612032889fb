//! # sso-authority
//!
//! The central authority composes the ticket factory, the expiration policy
//! engine and the ticket registry into the SSO session state machine:
//!
//! ```text
//! NoSession ──create TGT──> Authenticated ──destroy TGT──> LoggedOut
//!                               │
//!                               ├── grant ST ──> validate ST (consumes once)
//!                               └── create PGT ─> grant PT ──> validate PT
//! ```
//!
//! The authority holds no mutable state of its own. Every state change is a
//! registry insert, compare-and-swap or delete, so operations may run
//! concurrently from any number of tasks.
//!
//! External collaborators are traits:
//!
//! - [`CredentialVerifier`] - turns presented credentials into an authentication
//! - [`ServicesManager`] - decides which services may receive tickets or proxy
//! - [`SingleLogoutNotifier`] - delivers logout requests after a session ends

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod assertion;
pub mod authority;
pub mod credentials;
pub mod logout;
pub mod services;

pub use assertion::Assertion;
pub use authority::CentralAuthority;
pub use credentials::{Credential, CredentialVerifier, InMemoryCredentialVerifier};
pub use logout::{
    notify_single_logout, LogoutRequest, LogoutRequests, LogoutSummary, NotificationError,
    SingleLogoutNotifier,
};
pub use services::{RegisteredServices, ServicesManager};
