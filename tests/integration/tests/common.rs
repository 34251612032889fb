//! Common test utilities and fixtures.

use std::sync::Arc;
use std::time::Duration;

use sso_authority::{CentralAuthority, Credential, InMemoryCredentialVerifier, RegisteredServices, ServicesManager};
use sso_core::{Clock, ManualClock, SsoConfig};
use sso_registry::{EvictionSweep, MemoryTicketStore, TicketRegistry};
use sso_ticket::{Authentication, Principal, Service, TicketId};

pub const APP: &str = "https://app.example.org";
pub const PORTAL: &str = "https://portal.example.org";
pub const BACKEND: &str = "https://backend.example.org";

/// Test environment wiring an authority over an in-memory store.
pub struct TestEnv {
    /// Clock shared by the factory, registry and verifier.
    pub clock: ManualClock,
    /// Service registry, mutable during a test.
    pub services: Arc<RegisteredServices>,
    /// Backing store.
    pub store: MemoryTicketStore,
    /// Authority under test.
    pub authority: CentralAuthority,
}

impl TestEnv {
    /// Creates an environment with default configuration.
    pub fn new() -> Self {
        Self::with_config(&SsoConfig::default())
    }

    /// Creates an environment with the given configuration.
    pub fn with_config(config: &SsoConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sso_authority=debug,sso_registry=debug")
            .with_test_writer()
            .try_init();

        let clock = ManualClock::starting_now();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());

        let services = Arc::new(RegisteredServices::new());
        services.register(APP, false);
        services.register("https://a.example.org", false);
        services.register("https://b.example.org", false);
        services.register(PORTAL, true);
        services.register(BACKEND, false);

        let verifier = InMemoryCredentialVerifier::new(Arc::clone(&shared))
            .with_user("alice", "wonderland")
            .with_user("bob", "builder");

        let store = MemoryTicketStore::new();
        let authority = CentralAuthority::from_config(
            Arc::new(store.clone()),
            shared,
            Arc::clone(&services) as Arc<dyn ServicesManager>,
            Arc::new(verifier),
            config,
        );

        Self {
            clock,
            services,
            store,
            authority,
        }
    }

    /// Returns the registry behind the authority.
    pub fn registry(&self) -> &TicketRegistry {
        self.authority.registry()
    }

    /// Returns an eviction sweep over the registry.
    pub fn sweep(&self, interval: Duration, start_delay: Duration) -> EvictionSweep {
        EvictionSweep::new(self.registry().clone(), interval, start_delay)
    }

    /// Authentication for `alice`, verified now.
    pub fn alice(&self) -> Authentication {
        Authentication::new(Principal::new("alice"), self.clock.now())
    }

    /// Opens a session for `alice`.
    pub async fn login(&self) -> TicketId {
        self.authority
            .authenticate(&Credential::new("alice", "wonderland"))
            .await
            .expect("login")
    }

    /// Grants a service ticket from a session without credentials.
    pub async fn grant(&self, tgt: &TicketId, service: &str) -> TicketId {
        self.authority
            .grant_service_ticket(tgt, &Service::new(service), None)
            .await
            .expect("grant service ticket")
    }

    /// Returns whether the ticket is still stored.
    pub async fn exists(&self, id: &TicketId) -> bool {
        self.registry().find_ticket(id).await.expect("find ticket").is_some()
    }
}
