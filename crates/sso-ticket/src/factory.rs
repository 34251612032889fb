//! Ticket factory.
//!
//! Builds correctly typed, correctly chained tickets. The factory only
//! constructs values: persisting the ticket and linking it into its parent is
//! the registry's job, so a parent is only ever read here.

use std::sync::Arc;
use std::time::Duration;

use sso_core::{Clock, SsoConfig, TicketError, TicketResult};

use crate::authentication::Authentication;
use crate::expiration::{DelegationRule, ExpirationPolicy, PolicySelector};
use crate::id::{IdGenerator, RandomIdGenerator, TicketId, TicketKind};
use crate::service::Service;
use crate::ticket::{GrantingTicket, ServiceTicket, Ticket, TicketPayload};

/// Default expiration policy for each ticket kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketPolicies {
    /// Policy for ticket-granting tickets.
    pub ticket_granting: ExpirationPolicy,
    /// Policy for service tickets.
    pub service: ExpirationPolicy,
    /// Policy for proxy-granting tickets.
    pub proxy_granting: ExpirationPolicy,
    /// Policy for proxy tickets.
    pub proxy: ExpirationPolicy,
}

impl TicketPolicies {
    /// Builds the policies described by the configuration.
    ///
    /// Ticket-granting tickets delegate on the authentication: surrogate
    /// sessions get the short surrogate lifetime, "remember me" sessions the
    /// long-term lifetime, everything else the default idle/absolute window.
    #[must_use]
    pub fn from_config(config: &SsoConfig) -> Self {
        let secs = Duration::from_secs;
        Self {
            ticket_granting: ExpirationPolicy::Delegating {
                rules: vec![
                    DelegationRule {
                        when: PolicySelector::Surrogate,
                        policy: ExpirationPolicy::TicketGrantingDefault {
                            max_time_to_live: secs(config.surrogate_time_to_live),
                            time_to_idle: secs(config.surrogate_time_to_idle),
                        },
                    },
                    DelegationRule {
                        when: PolicySelector::RememberMe,
                        policy: ExpirationPolicy::time_to_live(secs(
                            config.tgt_remember_me_time_to_live,
                        )),
                    },
                ],
                default: Box::new(ExpirationPolicy::TicketGrantingDefault {
                    max_time_to_live: secs(config.tgt_max_time_to_live),
                    time_to_idle: secs(config.tgt_time_to_idle),
                }),
            },
            service: ExpirationPolicy::uses_or_timeout(
                config.st_number_of_uses,
                secs(config.st_time_to_live),
            ),
            proxy_granting: ExpirationPolicy::TicketGrantingDefault {
                max_time_to_live: secs(config.pgt_max_time_to_live),
                time_to_idle: secs(config.pgt_time_to_idle),
            },
            proxy: ExpirationPolicy::uses_or_timeout(
                config.pt_number_of_uses,
                secs(config.pt_time_to_live),
            ),
        }
    }

    /// Returns the default policy for a ticket kind.
    #[must_use]
    pub const fn for_kind(&self, kind: TicketKind) -> &ExpirationPolicy {
        match kind {
            TicketKind::TicketGranting => &self.ticket_granting,
            TicketKind::Service => &self.service,
            TicketKind::ProxyGranting => &self.proxy_granting,
            TicketKind::Proxy => &self.proxy,
        }
    }
}

impl Default for TicketPolicies {
    fn default() -> Self {
        Self::from_config(&SsoConfig::default())
    }
}

/// Constructs tickets with unguessable ids and the configured policies.
#[derive(Debug, Clone)]
pub struct TicketFactory {
    ids: Arc<dyn IdGenerator>,
    policies: TicketPolicies,
    clock: Arc<dyn Clock>,
}

impl TicketFactory {
    /// Creates a factory.
    #[must_use]
    pub fn new(ids: Arc<dyn IdGenerator>, policies: TicketPolicies, clock: Arc<dyn Clock>) -> Self {
        Self {
            ids,
            policies,
            clock,
        }
    }

    /// Creates a factory from configuration with the default id generator.
    #[must_use]
    pub fn from_config(config: &SsoConfig, clock: Arc<dyn Clock>) -> Self {
        let ids = config
            .ticket_id_suffix
            .as_deref()
            .map_or_else(RandomIdGenerator::new, |suffix| {
                RandomIdGenerator::new().with_suffix(suffix)
            });
        Self::new(Arc::new(ids), TicketPolicies::from_config(config), clock)
    }

    /// Returns the configured policies.
    #[must_use]
    pub const fn policies(&self) -> &TicketPolicies {
        &self.policies
    }

    /// Returns the clock tickets are stamped with.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Creates a ticket-granting ticket with the default policy.
    #[must_use]
    pub fn create_ticket_granting_ticket(&self, authentication: Authentication) -> Ticket {
        let policy = self.policies.ticket_granting.clone();
        self.create_ticket_granting_ticket_with_policy(authentication, policy)
    }

    /// Creates a ticket-granting ticket with an explicit policy.
    #[must_use]
    pub fn create_ticket_granting_ticket_with_policy(
        &self,
        authentication: Authentication,
        policy: ExpirationPolicy,
    ) -> Ticket {
        let id = self.ids.generate(TicketKind::TicketGranting);
        tracing::debug!(
            ticket = %id.abbreviated(),
            principal = %authentication.principal_id(),
            "creating ticket-granting ticket"
        );
        Ticket::new(
            id,
            TicketPayload::TicketGranting(GrantingTicket::root(authentication)),
            policy,
            self.clock.now(),
        )
    }

    /// Creates a service ticket granted by a ticket-granting ticket.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::InvalidTicket`] if the parent is not a valid
    /// ticket-granting ticket.
    pub fn create_service_ticket(
        &self,
        parent: &Ticket,
        service: Service,
        from_new_login: bool,
    ) -> TicketResult<Ticket> {
        let policy = self.policies.service.clone();
        self.create_service_ticket_with_policy(parent, service, from_new_login, policy)
    }

    /// Creates a service ticket with an explicit policy.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::InvalidTicket`] if the parent is not a valid
    /// ticket-granting ticket.
    pub fn create_service_ticket_with_policy(
        &self,
        parent: &Ticket,
        service: Service,
        from_new_login: bool,
        policy: ExpirationPolicy,
    ) -> TicketResult<Ticket> {
        self.dependent(parent, TicketKind::TicketGranting, TicketKind::Service, |id| {
            let payload = TicketPayload::Service(ServiceTicket::new(
                parent.id().clone(),
                service,
                from_new_login,
            ));
            (id, payload, policy)
        })
    }

    /// Creates a proxy ticket granted by a proxy-granting ticket.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::InvalidTicket`] if the parent is not a valid
    /// proxy-granting ticket.
    pub fn create_proxy_ticket(&self, parent: &Ticket, service: Service) -> TicketResult<Ticket> {
        let policy = self.policies.proxy.clone();
        self.dependent(parent, TicketKind::ProxyGranting, TicketKind::Proxy, |id| {
            let payload = TicketPayload::Proxy(ServiceTicket::new(parent.id().clone(), service, false));
            (id, payload, policy)
        })
    }

    /// Creates a proxy-granting ticket from a validated service or proxy ticket.
    ///
    /// The new ticket hangs off the granting ticket of `service_ticket`, owns a
    /// copy of that ticket's authentication and records the service that asked
    /// for it.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::InvalidTicket`] if either ticket is not valid, or
    /// if `granting` did not issue `service_ticket`.
    pub fn create_proxy_granting_ticket(
        &self,
        service_ticket: &Ticket,
        granting: &Ticket,
    ) -> TicketResult<Ticket> {
        let now = self.clock.now();
        let st = service_ticket
            .service_ticket()
            .filter(|_| !service_ticket.is_expired(now))
            .ok_or_else(|| TicketError::invalid(service_ticket.id().as_str()))?;
        if st.granting_ticket() != granting.id() {
            return Err(TicketError::invalid(service_ticket.id().as_str()));
        }
        let authentication = granting
            .authentication()
            .filter(|_| !granting.is_expired(now))
            .ok_or_else(|| TicketError::invalid(granting.id().as_str()))?
            .clone();

        let id = self.ids.generate(TicketKind::ProxyGranting);
        tracing::debug!(
            ticket = %id.abbreviated(),
            proxied_by = %st.service(),
            "creating proxy-granting ticket"
        );
        Ok(Ticket::new(
            id,
            TicketPayload::ProxyGranting(GrantingTicket::proxied(
                authentication,
                granting.id().clone(),
                st.service().clone(),
            )),
            self.policies.proxy_granting.clone(),
            now,
        ))
    }

    fn dependent<F>(
        &self,
        parent: &Ticket,
        parent_kind: TicketKind,
        kind: TicketKind,
        build: F,
    ) -> TicketResult<Ticket>
    where
        F: FnOnce(TicketId) -> (TicketId, TicketPayload, ExpirationPolicy),
    {
        let now = self.clock.now();
        if parent.kind() != parent_kind || parent.is_expired(now) {
            return Err(TicketError::invalid(parent.id().as_str()));
        }
        let (id, payload, policy) = build(self.ids.generate(kind));
        tracing::debug!(
            ticket = %id.abbreviated(),
            parent = %parent.id().abbreviated(),
            "creating {kind} ticket"
        );
        Ok(Ticket::new(id, payload, policy, now))
    }
}
