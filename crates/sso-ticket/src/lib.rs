//! # sso-ticket
//!
//! Ticket model and policy engine for the SSO authority.
//!
//! ## Ticket kinds
//!
//! | Kind | Prefix | Role |
//! |------|--------|------|
//! | Ticket-granting ticket | `TGT-` | Root of an SSO session |
//! | Service ticket | `ST-` | Single-use credential for one relying application |
//! | Proxy-granting ticket | `PGT-` | Session root scoped to a proxying service |
//! | Proxy ticket | `PT-` | Single-use credential issued from a PGT |
//!
//! Tickets reference each other by id only. A granting ticket lists the ids it
//! issued; dependents carry the id of the ticket that granted them.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod authentication;
pub mod expiration;
pub mod factory;
pub mod id;
pub mod service;
pub mod ticket;

pub use authentication::{Authentication, Principal};
pub use expiration::{CompositeMode, DelegationRule, ExpirationPolicy, PolicySelector, TicketUsage};
pub use factory::{TicketFactory, TicketPolicies};
pub use id::{IdGenerator, RandomIdGenerator, TicketId, TicketKind};
pub use service::Service;
pub use ticket::{GrantingTicket, IssuedService, ServiceTicket, Ticket, TicketPayload, TicketState};
