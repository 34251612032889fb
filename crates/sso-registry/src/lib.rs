//! # sso-registry
//!
//! Ticket persistence for the SSO authority.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐     ┌───────────────────┐
//! │  TicketRegistry    │────>│  dyn TicketStore  │  put / get / compare_and_swap
//! │  (typed, timeouts) │     │  (byte payloads)  │  delete / scan
//! └────────────────────┘     └───────────────────┘
//!          ^
//!          │ sweep()
//! ┌────────────────────┐
//! │  EvictionSweep     │  background task, fixed interval
//! └────────────────────┘
//! ```
//!
//! Drivers only see versioned byte payloads. Every mutation the registry makes
//! is either an insert-if-absent, a compare-and-swap on the stored version or
//! an idempotent delete, so concurrent requests never need a shared lock.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod registry;
pub mod store;
pub mod sweep;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryTicketStore;
pub use registry::TicketRegistry;
pub use store::{TicketStore, VersionedTicket};
pub use sweep::{EvictionSweep, SweepReport};
