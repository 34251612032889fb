//! # sso-core
//!
//! Foundational types shared by every crate of the SSO ticket authority.
//!
//! - [`TicketError`] - the error taxonomy surfaced by the ticket lifecycle
//! - [`SsoConfig`] - ticket lifetimes, registry timeouts and sweep scheduling
//! - [`Clock`] - the time source consulted by expiration policies

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SsoConfig};
pub use error::{TicketError, TicketResult};
