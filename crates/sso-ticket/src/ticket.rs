//! Ticket model.
//!
//! A [`Ticket`] pairs immutable identity (id, creation time, policy, kind
//! payload) with mutable lifecycle state (last use, use count, state). The
//! lifecycle state only moves forward: `Valid -> Expired` and
//! `Valid -> Consumed`, never back.
//!
//! Tickets reference each other by [`TicketId`] only. Cascade deletion walks
//! these ids instead of an object graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sso_core::{TicketError, TicketResult};

use crate::authentication::Authentication;
use crate::expiration::{ExpirationPolicy, TicketUsage};
use crate::id::{TicketId, TicketKind};
use crate::service::Service;

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketState {
    /// Usable.
    #[default]
    Valid,
    /// Expired by its policy or explicitly.
    Expired,
    /// Redeemed; single-use tickets end here.
    Consumed,
}

/// Child ticket issued for a service, kept for single-logout fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedService {
    /// Id of the service or proxy ticket.
    pub ticket_id: TicketId,
    /// Service the ticket was issued to.
    pub service: Service,
}

/// Payload of ticket-granting and proxy-granting tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantingTicket {
    authentication: Authentication,
    /// Granting ticket this one was derived from (proxy chaining), by id.
    parent: Option<TicketId>,
    /// Service that requested this proxy-granting ticket.
    proxied_by: Option<Service>,
    /// Service and proxy tickets issued from this ticket, in issue order.
    services: Vec<IssuedService>,
    /// Proxy-granting tickets derived from this ticket.
    proxy_granting_tickets: Vec<TicketId>,
}

impl GrantingTicket {
    /// Creates the payload of a root ticket-granting ticket.
    #[must_use]
    pub const fn root(authentication: Authentication) -> Self {
        Self {
            authentication,
            parent: None,
            proxied_by: None,
            services: Vec::new(),
            proxy_granting_tickets: Vec::new(),
        }
    }

    /// Creates the payload of a proxy-granting ticket.
    #[must_use]
    pub const fn proxied(authentication: Authentication, parent: TicketId, proxied_by: Service) -> Self {
        Self {
            authentication,
            parent: Some(parent),
            proxied_by: Some(proxied_by),
            services: Vec::new(),
            proxy_granting_tickets: Vec::new(),
        }
    }

    /// Returns the backing authentication.
    #[must_use]
    pub const fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    /// Returns the id of the granting ticket this one was derived from.
    #[must_use]
    pub const fn parent(&self) -> Option<&TicketId> {
        self.parent.as_ref()
    }

    /// Returns the service that requested this proxy-granting ticket.
    #[must_use]
    pub const fn proxied_by(&self) -> Option<&Service> {
        self.proxied_by.as_ref()
    }

    /// Returns the tickets issued for services, in issue order.
    #[must_use]
    pub fn services(&self) -> &[IssuedService] {
        &self.services
    }

    /// Returns the ids of derived proxy-granting tickets.
    #[must_use]
    pub fn proxy_granting_tickets(&self) -> &[TicketId] {
        &self.proxy_granting_tickets
    }
}

/// Payload of service and proxy tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTicket {
    granting_ticket: TicketId,
    service: Service,
    from_new_login: bool,
    /// Set once a proxy-granting ticket was issued on the strength of this ticket.
    #[serde(default)]
    proxy_granted: bool,
}

impl ServiceTicket {
    /// Creates a service ticket payload.
    #[must_use]
    pub const fn new(granting_ticket: TicketId, service: Service, from_new_login: bool) -> Self {
        Self {
            granting_ticket,
            service,
            from_new_login,
            proxy_granted: false,
        }
    }

    /// Returns the id of the ticket that granted this one.
    #[must_use]
    pub const fn granting_ticket(&self) -> &TicketId {
        &self.granting_ticket
    }

    /// Returns the target service.
    #[must_use]
    pub const fn service(&self) -> &Service {
        &self.service
    }

    /// Returns whether the ticket was issued right after an interactive login.
    #[must_use]
    pub const fn is_from_new_login(&self) -> bool {
        self.from_new_login
    }

    /// Returns whether a proxy-granting ticket was already issued from this ticket.
    #[must_use]
    pub const fn has_granted_proxy(&self) -> bool {
        self.proxy_granted
    }
}

/// Kind-specific part of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TicketPayload {
    /// Ticket-granting ticket.
    TicketGranting(GrantingTicket),
    /// Proxy-granting ticket.
    ProxyGranting(GrantingTicket),
    /// Service ticket.
    Service(ServiceTicket),
    /// Proxy ticket.
    Proxy(ServiceTicket),
}

/// A ticket: identity, lifecycle state and kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    id: TicketId,
    created_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
    count_of_uses: u32,
    expiration_policy: ExpirationPolicy,
    state: TicketState,
    payload: TicketPayload,
    /// Storage version this copy was read at; assigned by the registry.
    #[serde(skip)]
    version: u64,
}

impl Ticket {
    /// Creates a fresh, valid ticket.
    #[must_use]
    pub fn new(
        id: TicketId,
        payload: TicketPayload,
        expiration_policy: ExpirationPolicy,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            created_at,
            last_used_at: created_at,
            count_of_uses: 0,
            expiration_policy,
            state: TicketState::Valid,
            payload,
            version: 0,
        }
    }

    /// Returns the ticket id.
    #[must_use]
    pub const fn id(&self) -> &TicketId {
        &self.id
    }

    /// Returns the ticket kind.
    #[must_use]
    pub const fn kind(&self) -> TicketKind {
        match self.payload {
            TicketPayload::TicketGranting(_) => TicketKind::TicketGranting,
            TicketPayload::ProxyGranting(_) => TicketKind::ProxyGranting,
            TicketPayload::Service(_) => TicketKind::Service,
            TicketPayload::Proxy(_) => TicketKind::Proxy,
        }
    }

    /// Returns the creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the time of the last use (creation time if never used).
    #[must_use]
    pub const fn last_used_at(&self) -> DateTime<Utc> {
        self.last_used_at
    }

    /// Returns the number of successful uses.
    #[must_use]
    pub const fn count_of_uses(&self) -> u32 {
        self.count_of_uses
    }

    /// Returns the expiration policy fixed at creation.
    #[must_use]
    pub const fn expiration_policy(&self) -> &ExpirationPolicy {
        &self.expiration_policy
    }

    /// Returns the recorded state (expiration is not evaluated).
    #[must_use]
    pub const fn state(&self) -> TicketState {
        self.state
    }

    /// Returns the kind-specific payload.
    #[must_use]
    pub const fn payload(&self) -> &TicketPayload {
        &self.payload
    }

    /// Returns the storage version this copy was read at.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Records the storage version this copy corresponds to.
    ///
    /// Only storage layers call this.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Returns the usage record policies are evaluated against.
    #[must_use]
    pub const fn usage(&self) -> TicketUsage {
        TicketUsage {
            created_at: self.created_at,
            last_used_at: self.last_used_at,
            count_of_uses: self.count_of_uses,
        }
    }

    /// Returns the granting payload of TGTs and PGTs.
    #[must_use]
    pub const fn granting(&self) -> Option<&GrantingTicket> {
        match &self.payload {
            TicketPayload::TicketGranting(g) | TicketPayload::ProxyGranting(g) => Some(g),
            _ => None,
        }
    }

    /// Returns the service payload of STs and PTs.
    #[must_use]
    pub const fn service_ticket(&self) -> Option<&ServiceTicket> {
        match &self.payload {
            TicketPayload::Service(s) | TicketPayload::Proxy(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the authentication backing a granting ticket.
    ///
    /// Service and proxy tickets do not own an authentication; it is resolved
    /// through their granting ticket.
    #[must_use]
    pub fn authentication(&self) -> Option<&Authentication> {
        self.granting().map(GrantingTicket::authentication)
    }

    /// Returns the id of the ticket this one depends on, if any.
    #[must_use]
    pub fn granting_ticket_id(&self) -> Option<&TicketId> {
        match &self.payload {
            TicketPayload::TicketGranting(g) | TicketPayload::ProxyGranting(g) => g.parent(),
            TicketPayload::Service(s) | TicketPayload::Proxy(s) => Some(s.granting_ticket()),
        }
    }

    /// Returns the ids of every ticket issued directly by this one.
    #[must_use]
    pub fn descendant_ids(&self) -> Vec<TicketId> {
        self.granting()
            .map(|g| {
                g.services
                    .iter()
                    .map(|issued| issued.ticket_id.clone())
                    .chain(g.proxy_granting_tickets.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns whether the ticket is unusable at `now`.
    ///
    /// Evaluation is lazy: a ticket whose policy has lapsed reports expired
    /// even while its recorded state still says [`TicketState::Valid`].
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state != TicketState::Valid
            || self
                .expiration_policy
                .is_expired(&self.usage(), self.authentication(), now)
    }

    /// Returns the effective state at `now`.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> TicketState {
        match self.state {
            TicketState::Valid if self.is_expired(now) => TicketState::Expired,
            state => state,
        }
    }

    /// Checks that a use at `now` would be accepted, without recording it.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::InvalidTicket`] if the ticket is expired or consumed
    /// - [`TicketError::Throttled`] if the policy demands more spacing between uses
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> TicketResult<()> {
        if self.is_expired(now) {
            return Err(TicketError::invalid(self.id.as_str()));
        }
        if let Some(retry_after) =
            self.expiration_policy
                .throttle_delay(&self.usage(), self.authentication(), now)
        {
            return Err(TicketError::Throttled {
                id: self.id.to_string(),
                retry_after,
            });
        }
        Ok(())
    }

    /// Records a use at `now`.
    ///
    /// ## Errors
    ///
    /// Same as [`Ticket::ensure_usable`]; the ticket is left untouched.
    pub fn record_use(&mut self, now: DateTime<Utc>) -> TicketResult<()> {
        self.ensure_usable(now)?;
        self.count_of_uses = self.count_of_uses.saturating_add(1);
        self.last_used_at = now.max(self.last_used_at);
        Ok(())
    }

    /// Records a use and moves the ticket to [`TicketState::Consumed`].
    ///
    /// ## Errors
    ///
    /// Same as [`Ticket::record_use`].
    pub fn consume(&mut self, now: DateTime<Utc>) -> TicketResult<()> {
        self.record_use(now)?;
        self.state = TicketState::Consumed;
        Ok(())
    }

    /// Marks a valid ticket expired. Other states are left as they are.
    pub fn mark_expired(&mut self) {
        if self.state == TicketState::Valid {
            self.state = TicketState::Expired;
        }
    }

    /// Links a service or proxy ticket issued from this granting ticket.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::Internal`] if this is not a granting ticket.
    pub fn record_issued_service(&mut self, ticket_id: TicketId, service: Service) -> TicketResult<()> {
        let granting = self.granting_mut()?;
        granting.services.push(IssuedService { ticket_id, service });
        Ok(())
    }

    /// Links a proxy-granting ticket derived from this granting ticket.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::Internal`] if this is not a granting ticket.
    pub fn record_proxy_granting_ticket(&mut self, ticket_id: TicketId) -> TicketResult<()> {
        let granting = self.granting_mut()?;
        granting.proxy_granting_tickets.push(ticket_id);
        Ok(())
    }

    /// Unlinks a proxy-granting ticket, returning whether it was linked.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::Internal`] if this is not a granting ticket.
    pub fn forget_proxy_granting_ticket(&mut self, ticket_id: &TicketId) -> TicketResult<bool> {
        let granting = self.granting_mut()?;
        let before = granting.proxy_granting_tickets.len();
        granting.proxy_granting_tickets.retain(|linked| linked != ticket_id);
        Ok(granting.proxy_granting_tickets.len() != before)
    }

    /// Records that a proxy-granting ticket is being issued from this ticket.
    ///
    /// A service or proxy ticket backs at most one proxy-granting ticket.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::InvalidTicket`] if this is not a usable service or
    /// proxy ticket, or if it already backed a proxy-granting ticket.
    pub fn mark_proxy_granted(&mut self, now: DateTime<Utc>) -> TicketResult<()> {
        if self.is_expired(now) {
            return Err(TicketError::invalid(self.id.as_str()));
        }
        match &mut self.payload {
            TicketPayload::Service(s) | TicketPayload::Proxy(s) if !s.proxy_granted => {
                s.proxy_granted = true;
                Ok(())
            }
            _ => Err(TicketError::invalid(self.id.as_str())),
        }
    }

    fn granting_mut(&mut self) -> TicketResult<&mut GrantingTicket> {
        match &mut self.payload {
            TicketPayload::TicketGranting(g) | TicketPayload::ProxyGranting(g) => Ok(g),
            _ => Err(TicketError::Internal(format!(
                "{} cannot issue dependent tickets",
                self.id.abbreviated()
            ))),
        }
    }
}
