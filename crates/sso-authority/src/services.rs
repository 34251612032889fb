//! Service authorization.

use std::fmt::Debug;

use async_trait::async_trait;
use dashmap::DashMap;
use sso_ticket::Service;

/// Decides which services may receive tickets and use proxy authentication.
#[async_trait]
pub trait ServicesManager: Send + Sync + Debug {
    /// Returns whether tickets may be issued for the service.
    async fn is_service_allowed(&self, service: &Service) -> bool;

    /// Returns whether the service may obtain proxy-granting tickets.
    async fn is_proxying_allowed(&self, service: &Service) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    proxy: bool,
}

/// In-memory service registry.
///
/// Entries are service identifiers. An entry ending in `*` matches every
/// service whose identifier starts with the text before it; otherwise matching
/// is exact. Unregistered services are denied.
#[derive(Debug, Default)]
pub struct RegisteredServices {
    entries: DashMap<String, Registration>,
}

impl RegisteredServices {
    /// Creates an empty registry that denies everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that allows every service, proxying included.
    #[must_use]
    pub fn allow_all() -> Self {
        let services = Self::new();
        services.register("*", true);
        services
    }

    /// Registers a service or service pattern.
    pub fn register(&self, pattern: impl Into<String>, proxy: bool) {
        let pattern = pattern.into();
        tracing::debug!(service = %pattern, proxy, "service registered");
        self.entries.insert(pattern, Registration { proxy });
    }

    /// Removes a registration. Returns whether it existed.
    pub fn unregister(&self, pattern: &str) -> bool {
        self.entries.remove(pattern).is_some()
    }

    fn lookup(&self, service: &Service) -> Option<Registration> {
        if let Some(exact) = self.entries.get(service.id()) {
            return Some(*exact);
        }
        self.entries
            .iter()
            .filter_map(|entry| {
                let prefix = entry.key().strip_suffix('*')?;
                service
                    .id()
                    .starts_with(prefix)
                    .then(|| (prefix.len(), *entry.value()))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, registration)| registration)
    }
}

#[async_trait]
impl ServicesManager for RegisteredServices {
    async fn is_service_allowed(&self, service: &Service) -> bool {
        self.lookup(service).is_some()
    }

    async fn is_proxying_allowed(&self, service: &Service) -> bool {
        self.lookup(service).is_some_and(|registration| registration.proxy)
    }
}
