//! End-to-End Integration Tests
//!
//! These tests drive the complete ticket lifecycle through the central
//! authority over the in-memory store, with a manually driven clock.

mod common;
mod concurrency;
mod expiration;
mod logout;
mod proxy_flows;
mod sso_flows;
