//! Central authority.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sso_core::{Clock, SsoConfig, TicketError, TicketResult};
use sso_registry::{TicketRegistry, TicketStore};
use sso_ticket::{Authentication, GrantingTicket, Service, Ticket, TicketFactory, TicketId, TicketKind};

use crate::assertion::Assertion;
use crate::credentials::{Credential, CredentialVerifier};
use crate::logout::{LogoutRequest, LogoutRequests};
use crate::services::ServicesManager;

const SESSION_ROOT: &[TicketKind] = &[TicketKind::TicketGranting];
const PROXY_GRANTING: &[TicketKind] = &[TicketKind::ProxyGranting];
const GRANTING: &[TicketKind] = &[TicketKind::TicketGranting, TicketKind::ProxyGranting];
const SERVICE: &[TicketKind] = &[TicketKind::Service];
const PROXY: &[TicketKind] = &[TicketKind::Proxy];
const REDEEMABLE: &[TicketKind] = &[TicketKind::Service, TicketKind::Proxy];

/// Longest granting chain followed before the chain is treated as corrupt.
const MAX_CHAIN_DEPTH: usize = 16;

/// Issues, grants, validates and destroys tickets.
///
/// Cheap to clone; clones share the registry and collaborators.
#[derive(Debug, Clone)]
pub struct CentralAuthority {
    registry: TicketRegistry,
    factory: TicketFactory,
    services: Arc<dyn ServicesManager>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl CentralAuthority {
    /// Creates an authority from its parts.
    #[must_use]
    pub fn new(
        registry: TicketRegistry,
        factory: TicketFactory,
        services: Arc<dyn ServicesManager>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            registry,
            factory,
            services,
            verifier,
        }
    }

    /// Creates an authority over a store, wired from configuration.
    #[must_use]
    pub fn from_config(
        store: Arc<dyn TicketStore>,
        clock: Arc<dyn Clock>,
        services: Arc<dyn ServicesManager>,
        verifier: Arc<dyn CredentialVerifier>,
        config: &SsoConfig,
    ) -> Self {
        Self::new(
            TicketRegistry::from_config(store, Arc::clone(&clock), config),
            TicketFactory::from_config(config, clock),
            services,
            verifier,
        )
    }

    /// Returns the ticket registry.
    #[must_use]
    pub const fn registry(&self) -> &TicketRegistry {
        &self.registry
    }

    /// Returns the ticket factory.
    #[must_use]
    pub const fn factory(&self) -> &TicketFactory {
        &self.factory
    }

    /// Verifies credentials and opens an SSO session for them.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::Authentication`] if the credentials are rejected
    /// - any error of [`CentralAuthority::create_ticket_granting_ticket`]
    pub async fn authenticate(&self, credential: &Credential) -> TicketResult<TicketId> {
        let authentication = self.verifier.verify(credential).await?;
        self.create_ticket_granting_ticket(authentication).await
    }

    /// Opens a new SSO session. A new ticket-granting ticket is always created.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::RegistryUnavailable`] if the ticket cannot be stored
    /// - [`TicketError::DuplicateTicket`] on an id collision
    pub async fn create_ticket_granting_ticket(
        &self,
        authentication: Authentication,
    ) -> TicketResult<TicketId> {
        let context = with_context("create ticket-granting ticket");
        let tgt = self.factory.create_ticket_granting_ticket(authentication);
        self.registry.add_ticket(&tgt).await.map_err(context)?;

        tracing::info!(
            ticket = %tgt.id().abbreviated(),
            principal = tgt.authentication().map_or("", Authentication::principal_id),
            "SSO session created"
        );
        Ok(tgt.id().clone())
    }

    /// Grants a service ticket from an SSO session.
    ///
    /// When `credential` is given it is verified again and must belong to the
    /// session owner; the resulting ticket is then marked as issued from a new
    /// login, which satisfies `renew` at validation.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::InvalidTicket`] if the session is absent or expired
    /// - [`TicketError::UnauthorizedService`] if the service may not receive tickets
    /// - [`TicketError::Authentication`] / [`TicketError::MixedPrincipal`] for bad credentials
    /// - [`TicketError::Throttled`] if the session policy demands a pause
    pub async fn grant_service_ticket(
        &self,
        tgt_id: &TicketId,
        service: &Service,
        credential: Option<&Credential>,
    ) -> TicketResult<TicketId> {
        let context = with_context("grant service ticket");
        let session = self.registry.get_ticket(tgt_id, SESSION_ROOT).await.map_err(context)?;
        self.ensure_service_allowed(service).await?;

        let from_new_login = match credential {
            Some(credential) => {
                self.verify_session_owner(&session, credential).await?;
                true
            }
            None => false,
        };

        session.ensure_usable(self.now()).map_err(context)?;
        let st = self
            .factory
            .create_service_ticket(&session, service.clone(), from_new_login)?;
        self.registry.add_ticket(&st).await.map_err(context)?;
        let linked = self
            .registry
            .update_with(tgt_id, SESSION_ROOT, |tgt| {
                tgt.record_use(self.now())?;
                tgt.record_issued_service(st.id().clone(), service.clone())
            })
            .await;
        if let Err(err) = linked {
            self.discard(st.id()).await;
            return Err(context(err));
        }

        tracing::debug!(
            ticket = %st.id().abbreviated(),
            session = %tgt_id.abbreviated(),
            service = %service,
            from_new_login,
            "service ticket granted"
        );
        Ok(st.id().clone())
    }

    /// Validates and consumes a service ticket.
    ///
    /// Only service tickets are accepted; proxy tickets go through
    /// [`CentralAuthority::validate_proxy_ticket`]. A ticket presented for the
    /// wrong service is rejected without being consumed.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::InvalidTicket`] if the ticket is absent, expired, already
    ///   consumed, issued for another service, or its session is gone; also when
    ///   `renew` is requested for a ticket not issued from a new login (the
    ///   ticket is consumed regardless)
    pub async fn validate_service_ticket(
        &self,
        st_id: &TicketId,
        service: &Service,
        renew: bool,
    ) -> TicketResult<Assertion> {
        self.validate(st_id, service, renew, SERVICE, "validate service ticket")
            .await
    }

    /// Validates and consumes a service or proxy ticket.
    ///
    /// ## Errors
    ///
    /// Same as [`CentralAuthority::validate_service_ticket`], plus
    /// [`TicketError::UnauthorizedProxying`] if a service in the proxy chain is
    /// no longer allowed to proxy.
    pub async fn validate_proxy_ticket(
        &self,
        ticket_id: &TicketId,
        service: &Service,
        renew: bool,
    ) -> TicketResult<Assertion> {
        self.validate(ticket_id, service, renew, REDEEMABLE, "validate proxy ticket")
            .await
    }

    /// Issues a proxy-granting ticket to the service a ticket was issued for.
    ///
    /// Must be called before the ticket is validated: the ticket has to be
    /// valid, and each service or proxy ticket backs at most one proxy-granting
    /// ticket. The new ticket hangs off the ticket's granting ticket.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::InvalidTicket`] if the ticket or its chain is not valid,
    ///   or it already backed a proxy-granting ticket
    /// - [`TicketError::UnauthorizedProxying`] if the service may not proxy
    pub async fn create_proxy_granting_ticket(&self, ticket_id: &TicketId) -> TicketResult<TicketId> {
        let context = with_context("create proxy-granting ticket");
        let ticket = self.registry.get_ticket(ticket_id, REDEEMABLE).await.map_err(context)?;
        let payload = ticket
            .service_ticket()
            .ok_or_else(|| TicketError::invalid(ticket_id.as_str()))?;
        let proxy = payload.service().clone();
        let granting_id = payload.granting_ticket().clone();

        if !self.services.is_proxying_allowed(&proxy).await {
            tracing::warn!(service = %proxy, "service is not allowed to proxy");
            return Err(TicketError::UnauthorizedProxying(proxy.to_string()));
        }
        let chain = self.granting_chain(&granting_id).await.map_err(context)?;
        self.ensure_proxying_allowed(&chain).await?;
        let granting = chain
            .first()
            .ok_or_else(|| TicketError::invalid(granting_id.as_str()))?;

        if payload.has_granted_proxy() {
            return Err(TicketError::invalid(ticket_id.as_str()));
        }
        let pgt = self.factory.create_proxy_granting_ticket(&ticket, granting)?;
        self.registry.add_ticket(&pgt).await.map_err(context)?;

        // Linked before the backing ticket is claimed: an unclaimed link is
        // undone below, a claimed ticket cannot be released.
        let linked = self
            .registry
            .update_with(&granting_id, GRANTING, |g| {
                g.record_proxy_granting_ticket(pgt.id().clone())
            })
            .await;
        if let Err(err) = linked {
            self.discard(pgt.id()).await;
            return Err(context(err));
        }
        let claimed = self
            .registry
            .update_with(ticket_id, REDEEMABLE, |t| t.mark_proxy_granted(self.now()))
            .await;
        if let Err(err) = claimed {
            self.discard(pgt.id()).await;
            self.unlink_proxy_granting_ticket(&granting_id, pgt.id()).await;
            return Err(context(err));
        }

        tracing::info!(
            ticket = %pgt.id().abbreviated(),
            parent = %granting_id.abbreviated(),
            proxied_by = %proxy,
            "proxy-granting ticket created"
        );
        Ok(pgt.id().clone())
    }

    /// Grants a proxy ticket for a back-end service from a proxy-granting ticket.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::InvalidTicket`] if the ticket or any granting ticket up
    ///   its chain is absent or expired
    /// - [`TicketError::UnauthorizedService`] if the target may not receive tickets
    /// - [`TicketError::UnauthorizedProxying`] if a proxying service lost its permission
    /// - [`TicketError::Throttled`] if the policy demands a pause
    pub async fn grant_proxy_ticket(&self, pgt_id: &TicketId, target: &Service) -> TicketResult<TicketId> {
        let context = with_context("grant proxy ticket");
        if pgt_id.kind() != Some(TicketKind::ProxyGranting) {
            return Err(TicketError::invalid(pgt_id.as_str()));
        }
        let chain = self.granting_chain(pgt_id).await.map_err(context)?;
        self.ensure_service_allowed(target).await?;
        self.ensure_proxying_allowed(&chain).await?;

        let pgt = chain
            .first()
            .ok_or_else(|| TicketError::invalid(pgt_id.as_str()))?;
        pgt.ensure_usable(self.now()).map_err(context)?;
        let pt = self.factory.create_proxy_ticket(pgt, target.clone())?;
        self.registry.add_ticket(&pt).await.map_err(context)?;
        let linked = self
            .registry
            .update_with(pgt_id, PROXY_GRANTING, |parent| {
                parent.record_use(self.now())?;
                parent.record_issued_service(pt.id().clone(), target.clone())
            })
            .await;
        if let Err(err) = linked {
            self.discard(pt.id()).await;
            return Err(context(err));
        }

        tracing::debug!(
            ticket = %pt.id().abbreviated(),
            parent = %pgt_id.abbreviated(),
            service = %target,
            "proxy ticket granted"
        );
        Ok(pt.id().clone())
    }

    /// Ends an SSO session.
    ///
    /// Deletes the ticket-granting ticket and every ticket reachable from it,
    /// then returns one logout request per ticket the session handed to a
    /// service. Destroying an absent session yields nothing.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::InvalidTicket`] if the id is not a ticket-granting ticket id
    /// - [`TicketError::RegistryUnavailable`] if the store fails
    pub async fn destroy_ticket_granting_ticket(&self, tgt_id: &TicketId) -> TicketResult<LogoutRequests> {
        let context = with_context("destroy ticket-granting ticket");
        if tgt_id.kind() != Some(TicketKind::TicketGranting) {
            return Err(TicketError::invalid(tgt_id.as_str()));
        }
        let removed = self.registry.remove_ticket_tree(tgt_id).await.map_err(context)?;

        let Some(root) = removed.first().filter(|ticket| ticket.id() == tgt_id) else {
            tracing::debug!(ticket = %tgt_id.abbreviated(), "no session to destroy");
            return Ok(LogoutRequests::new(Vec::new(), removed.len()));
        };
        let requests = logout_requests(&removed);
        tracing::info!(
            ticket = %tgt_id.abbreviated(),
            principal = root.authentication().map_or("", Authentication::principal_id),
            tickets_removed = removed.len(),
            services = requests.len(),
            "SSO session destroyed"
        );
        Ok(LogoutRequests::new(requests, removed.len()))
    }

    /// Returns the services that proxied to obtain a proxy-granting or proxy
    /// ticket, nearest first.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::InvalidTicket`] if the ticket is not a valid
    /// proxy-granting or proxy ticket.
    pub async fn proxy_chain(&self, ticket_id: &TicketId) -> TicketResult<Vec<Service>> {
        let start = match ticket_id.kind() {
            Some(TicketKind::ProxyGranting) => ticket_id.clone(),
            Some(TicketKind::Proxy) => self
                .registry
                .get_ticket(ticket_id, PROXY)
                .await?
                .granting_ticket_id()
                .cloned()
                .ok_or_else(|| TicketError::invalid(ticket_id.as_str()))?,
            _ => return Err(TicketError::invalid(ticket_id.as_str())),
        };
        let chain = self.granting_chain(&start).await?;
        Ok(proxy_links(&chain).into_iter().map(|(_, service)| service).collect())
    }

    async fn validate(
        &self,
        id: &TicketId,
        service: &Service,
        renew: bool,
        kinds: &[TicketKind],
        operation: &'static str,
    ) -> TicketResult<Assertion> {
        let context = with_context(operation);
        let ticket = self.registry.get_ticket(id, kinds).await.map_err(context)?;
        let payload = ticket
            .service_ticket()
            .ok_or_else(|| TicketError::invalid(id.as_str()))?;
        if !payload.service().matches(service) {
            tracing::warn!(
                ticket = %id.abbreviated(),
                issued_for = %payload.service(),
                presented = %service,
                "ticket presented by another service"
            );
            return Err(TicketError::invalid(id.as_str()));
        }

        let chain = self
            .granting_chain(payload.granting_ticket())
            .await
            .map_err(context)?;
        self.ensure_proxying_allowed(&chain).await?;
        let primary = chain
            .last()
            .and_then(Ticket::authentication)
            .cloned()
            .ok_or_else(|| TicketError::invalid(id.as_str()))?;

        self.registry
            .update_with(id, kinds, |t| t.consume(self.now()))
            .await
            .map_err(|err| {
                if err.is_invalid_ticket() {
                    tracing::warn!(ticket = %id.abbreviated(), "ticket redeemed concurrently");
                }
                context(err)
            })?;

        let from_new_login = payload.is_from_new_login();
        if renew && !from_new_login {
            tracing::warn!(ticket = %id.abbreviated(), "renew requested but ticket came from SSO");
            return Err(TicketError::invalid(id.as_str()));
        }

        tracing::debug!(ticket = %id.abbreviated(), service = %service, "ticket validated");
        Ok(Assertion::new(
            service.clone(),
            primary,
            proxy_links(&chain),
            from_new_login,
        ))
    }

    /// Walks from a granting ticket up to its session root, nearest first.
    async fn granting_chain(&self, start: &TicketId) -> TicketResult<Vec<Ticket>> {
        let mut chain = Vec::new();
        let mut next = Some(start.clone());
        while let Some(id) = next {
            if chain.len() >= MAX_CHAIN_DEPTH {
                return Err(TicketError::Internal(format!(
                    "granting chain of {} exceeds {MAX_CHAIN_DEPTH} tickets",
                    start.abbreviated()
                )));
            }
            let ticket = self.registry.get_ticket(&id, GRANTING).await?;
            next = ticket.granting().and_then(GrantingTicket::parent).cloned();
            chain.push(ticket);
        }
        match chain.last() {
            Some(root) if root.kind() == TicketKind::TicketGranting => Ok(chain),
            _ => Err(TicketError::invalid(start.as_str())),
        }
    }

    async fn ensure_service_allowed(&self, service: &Service) -> TicketResult<()> {
        if self.services.is_service_allowed(service).await {
            Ok(())
        } else {
            tracing::warn!(service = %service, "service is not authorized");
            Err(TicketError::UnauthorizedService(service.to_string()))
        }
    }

    async fn ensure_proxying_allowed(&self, chain: &[Ticket]) -> TicketResult<()> {
        for (_, proxy) in proxy_links(chain) {
            if !self.services.is_proxying_allowed(&proxy).await {
                tracing::warn!(service = %proxy, "proxying service lost its permission");
                return Err(TicketError::UnauthorizedProxying(proxy.to_string()));
            }
        }
        Ok(())
    }

    async fn verify_session_owner(&self, session: &Ticket, credential: &Credential) -> TicketResult<()> {
        let authentication = self.verifier.verify(credential).await?;
        let owner = session.authentication().map(Authentication::principal_id);
        if owner != Some(authentication.principal_id()) {
            tracing::warn!(
                session = %session.id().abbreviated(),
                presented = %authentication.principal_id(),
                "credentials belong to another principal"
            );
            return Err(TicketError::MixedPrincipal);
        }
        Ok(())
    }

    /// Deletes a child ticket whose parent could not be updated.
    async fn discard(&self, id: &TicketId) {
        if let Err(err) = self.registry.delete_ticket(id).await {
            tracing::warn!(
                ticket = %id.abbreviated(),
                error = %err,
                "failed to discard unlinked ticket"
            );
        }
    }

    async fn unlink_proxy_granting_ticket(&self, granting_id: &TicketId, pgt_id: &TicketId) {
        let unlinked = self
            .registry
            .update_with(granting_id, GRANTING, |g| g.forget_proxy_granting_ticket(pgt_id))
            .await;
        if let Err(err) = unlinked {
            // A vanished granting ticket has no link left to undo.
            if !err.is_invalid_ticket() {
                tracing::warn!(
                    ticket = %pgt_id.abbreviated(),
                    parent = %granting_id.abbreviated(),
                    error = %err,
                    "failed to unlink proxy-granting ticket"
                );
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.factory.clock().now()
    }
}

/// Returns the proxying links of a granting chain: each proxy-granting
/// ticket's authentication with the service that requested it, nearest first.
fn proxy_links(chain: &[Ticket]) -> Vec<(Authentication, Service)> {
    chain
        .iter()
        .filter_map(|ticket| {
            let granting = ticket.granting()?;
            let proxy = granting.proxied_by()?;
            Some((granting.authentication().clone(), proxy.clone()))
        })
        .collect()
}

/// Builds logout requests from a removed ticket tree, root first.
fn logout_requests(removed: &[Ticket]) -> Vec<LogoutRequest> {
    let mut requests = Vec::new();
    for ticket in removed {
        let Some(granting) = ticket.granting() else {
            continue;
        };
        if let Some(proxy) = granting.proxied_by() {
            requests.push(LogoutRequest {
                ticket_id: ticket.id().clone(),
                service: proxy.clone(),
            });
        }
        requests.extend(granting.services().iter().map(|issued| LogoutRequest {
            ticket_id: issued.ticket_id.clone(),
            service: issued.service.clone(),
        }));
    }
    requests
}

/// Attaches the operation to registry failures and logs throttling.
fn with_context(operation: &'static str) -> impl Fn(TicketError) -> TicketError + Copy {
    move |err| {
        if let TicketError::Throttled { id, retry_after } = &err {
            tracing::warn!(
                operation,
                ticket = %TicketId::from(id.as_str()).abbreviated(),
                ?retry_after,
                "ticket throttled"
            );
        }
        err.with_registry_context(operation)
    }
}
