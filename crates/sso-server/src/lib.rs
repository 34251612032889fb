//! # sso-server
//!
//! Process wiring for the SSO ticket authority.
//!
//! Builds the in-memory ticket store, the registry, the central authority and
//! the eviction sweep from [`ServerConfig`], and owns their lifecycle.
//! Protocol adapters embed [`SsoServer::authority`] to serve requests.
//!
//! ## Usage
//!
//! ```ignore
//! use sso_server::{ServerConfig, SsoServer};
//!
//! let config = ServerConfig::from_env()?;
//! let server = SsoServer::new(&config);
//! server.start();
//! // ... serve requests through server.authority() ...
//! server.shutdown().await;
//! ```

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod config;

pub use config::{ServerConfig, ServiceEntry};

use std::sync::Arc;

use sso_authority::{CentralAuthority, InMemoryCredentialVerifier, RegisteredServices};
use sso_core::{Clock, SystemClock, TicketResult};
use sso_registry::{EvictionSweep, MemoryTicketStore};

/// A wired SSO authority and its background tasks.
pub struct SsoServer {
    authority: CentralAuthority,
    sweep: EvictionSweep,
}

impl SsoServer {
    /// Wires the authority from configuration.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let services = RegisteredServices::new();
        for entry in &config.services {
            services.register(entry.pattern.clone(), entry.proxy);
        }
        let verifier = config
            .users
            .iter()
            .fold(InMemoryCredentialVerifier::new(Arc::clone(&clock)), |verifier, (id, secret)| {
                verifier.with_user(id.clone(), secret.clone())
            });

        let authority = CentralAuthority::from_config(
            Arc::new(MemoryTicketStore::new()),
            clock,
            Arc::new(services),
            Arc::new(verifier),
            &config.sso,
        );
        let sweep = EvictionSweep::from_config(authority.registry().clone(), &config.sso);

        tracing::info!(
            services = config.services.len(),
            users = config.users.len(),
            "SSO authority wired"
        );
        Self { authority, sweep }
    }

    /// Returns the central authority.
    #[must_use]
    pub const fn authority(&self) -> &CentralAuthority {
        &self.authority
    }

    /// Starts background tasks. Must be called inside a tokio runtime.
    pub fn start(&self) {
        self.sweep.start();
    }

    /// Returns the number of live SSO sessions.
    ///
    /// ## Errors
    ///
    /// Returns an error if the registry cannot be scanned.
    pub async fn session_count(&self) -> TicketResult<usize> {
        self.authority.registry().session_count().await
    }

    /// Stops background tasks.
    pub async fn shutdown(&self) {
        self.sweep.stop().await;
    }
}
