//! Typed ticket registry over a storage driver.
//!
//! The registry is the only component that touches the store. It serializes
//! tickets, evaluates expiration on read, bounds every store call with a
//! timeout and turns the driver's compare-and-swap into retrying
//! read-modify-write updates.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sso_core::{Clock, SsoConfig, TicketError, TicketResult};
use sso_ticket::{Ticket, TicketId, TicketKind};

use crate::error::StoreResult;
use crate::store::{TicketStore, VersionedTicket};
use crate::sweep::SweepReport;

/// Ticket registry.
#[derive(Debug, Clone)]
pub struct TicketRegistry {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    operation_timeout: Duration,
    update_retries: u32,
}

impl TicketRegistry {
    /// Creates a registry with default timeouts.
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>) -> Self {
        Self::from_config(store, clock, &SsoConfig::default())
    }

    /// Creates a registry using the configured timeout and retry budget.
    #[must_use]
    pub fn from_config(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>, config: &SsoConfig) -> Self {
        Self {
            store,
            clock,
            operation_timeout: config.registry_operation_timeout(),
            update_retries: config.registry_update_retries,
        }
    }

    /// Overrides the per-call store timeout.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Overrides how many times a conflicting update is retried.
    #[must_use]
    pub fn with_update_retries(mut self, retries: u32) -> Self {
        self.update_retries = retries;
        self
    }

    /// Returns the clock used to evaluate expiration.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Persists a new ticket.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::DuplicateTicket`] if the id is already taken
    /// - [`TicketError::RegistryUnavailable`] if the store fails or times out
    pub async fn add_ticket(&self, ticket: &Ticket) -> TicketResult<()> {
        let data = encode(ticket)?;
        let ttl_hint = ticket.expiration_policy().max_lifetime();
        let stored = self
            .call("add ticket", self.store.put(ticket.id().as_str(), data, ttl_hint))
            .await?;

        if stored.is_none() {
            tracing::error!(ticket = %ticket.id().abbreviated(), "ticket id collision");
            return Err(TicketError::DuplicateTicket(ticket.id().to_string()));
        }
        tracing::debug!(
            ticket = %ticket.id().abbreviated(),
            kind = %ticket.kind(),
            "ticket added"
        );
        Ok(())
    }

    /// Reads a ticket as stored, without type or expiration checks.
    ///
    /// ## Errors
    ///
    /// Returns an error if the store fails or the record is corrupt.
    pub async fn find_ticket(&self, id: &TicketId) -> TicketResult<Option<Ticket>> {
        self.call("get ticket", self.store.get(id.as_str()))
            .await?
            .map(|record| decode(id.as_str(), record))
            .transpose()
    }

    /// Reads a valid ticket of one of the expected kinds.
    ///
    /// A ticket found expired is evicted, together with its descendants,
    /// before the lookup fails.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::InvalidTicket`] if the ticket is absent, of another
    ///   kind, expired or consumed
    /// - [`TicketError::RegistryUnavailable`] if the store fails or times out
    pub async fn get_ticket(&self, id: &TicketId, kinds: &[TicketKind]) -> TicketResult<Ticket> {
        if !id.kind().is_some_and(|kind| kinds.contains(&kind)) {
            return Err(TicketError::invalid(id.as_str()));
        }
        let Some(ticket) = self.find_ticket(id).await? else {
            tracing::debug!(ticket = %id.abbreviated(), "ticket not found");
            return Err(TicketError::invalid(id.as_str()));
        };
        if !kinds.contains(&ticket.kind()) {
            return Err(TicketError::invalid(id.as_str()));
        }
        if ticket.is_expired(self.clock.now()) {
            tracing::debug!(
                ticket = %id.abbreviated(),
                state = ?ticket.state(),
                "evicting unusable ticket on read"
            );
            if let Err(err) = self.remove_ticket_tree(id).await {
                tracing::warn!(ticket = %id.abbreviated(), error = %err, "eviction on read failed");
            }
            return Err(TicketError::invalid(id.as_str()));
        }
        Ok(ticket)
    }

    /// Writes back a ticket read from this registry.
    ///
    /// The write only succeeds if nobody changed the ticket since it was read.
    /// Returns the ticket carrying its new storage version.
    ///
    /// ## Errors
    ///
    /// - [`TicketError::ConcurrentUpdate`] if the stored version moved on or the
    ///   ticket was deleted
    /// - [`TicketError::RegistryUnavailable`] if the store fails or times out
    pub async fn update_ticket(&self, ticket: &Ticket) -> TicketResult<Ticket> {
        match self.swap(ticket).await? {
            Some(version) => {
                let mut updated = ticket.clone();
                updated.set_version(version);
                Ok(updated)
            }
            None => Err(TicketError::ConcurrentUpdate(ticket.id().to_string())),
        }
    }

    /// Atomically reads, mutates and writes back a valid ticket.
    ///
    /// `mutate` runs against a fresh copy on every attempt and may run more
    /// than once. When it fails, nothing is written and its error is returned
    /// as is. Conflicting writes are retried up to the configured budget.
    ///
    /// ## Errors
    ///
    /// - any error of [`TicketRegistry::get_ticket`] or of `mutate`
    /// - [`TicketError::ConcurrentUpdate`] once the retry budget is spent
    pub async fn update_with<R, F>(
        &self,
        id: &TicketId,
        kinds: &[TicketKind],
        mut mutate: F,
    ) -> TicketResult<(Ticket, R)>
    where
        F: FnMut(&mut Ticket) -> TicketResult<R> + Send,
        R: Send,
    {
        for attempt in 0..=self.update_retries {
            let mut ticket = self.get_ticket(id, kinds).await?;
            let outcome = mutate(&mut ticket)?;
            if let Some(version) = self.swap(&ticket).await? {
                ticket.set_version(version);
                return Ok((ticket, outcome));
            }
            tracing::debug!(ticket = %id.abbreviated(), attempt, "ticket changed concurrently, retrying");
        }
        tracing::warn!(
            ticket = %id.abbreviated(),
            retries = self.update_retries,
            "ticket update lost every retry"
        );
        Err(TicketError::ConcurrentUpdate(id.to_string()))
    }

    /// Deletes a ticket and, for granting tickets, everything it issued.
    ///
    /// Returns the number of tickets removed. Deleting an absent id removes
    /// nothing and is not an error.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::RegistryUnavailable`] if the store fails.
    pub async fn delete_ticket(&self, id: &TicketId) -> TicketResult<usize> {
        let removed = self.remove_ticket_tree(id).await?;
        if !removed.is_empty() {
            tracing::debug!(ticket = %id.abbreviated(), removed = removed.len(), "ticket deleted");
        }
        Ok(removed.len())
    }

    /// Deletes a ticket tree and returns the tickets this call removed.
    ///
    /// Tickets are returned root first, children in issue order. Deletion runs
    /// leaves first so an interrupted cascade never leaves a child without the
    /// parent that lists it. Tickets removed concurrently by someone else are
    /// not reported.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::RegistryUnavailable`] if the store fails.
    pub async fn remove_ticket_tree(&self, id: &TicketId) -> TicketResult<Vec<Ticket>> {
        let mut pending = vec![id.clone()];
        let mut seen = HashSet::new();
        let mut tree = Vec::new();

        while let Some(next) = pending.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(ticket) = self.find_ticket(&next).await? {
                pending.extend(ticket.descendant_ids().into_iter().rev());
                tree.push(ticket);
            }
        }

        let mut removed = Vec::with_capacity(tree.len());
        for ticket in tree.into_iter().rev() {
            if self
                .call("delete ticket", self.store.delete(ticket.id().as_str()))
                .await?
            {
                removed.push(ticket);
            }
        }
        removed.reverse();
        Ok(removed)
    }

    /// Streams a snapshot of every stored ticket, expired ones included.
    ///
    /// ## Errors
    ///
    /// Returns [`TicketError::RegistryUnavailable`] if the scan cannot start;
    /// per-record failures are yielded as stream items.
    pub async fn get_tickets(&self) -> TicketResult<BoxStream<'_, TicketResult<Ticket>>> {
        let records = self.call("scan tickets", self.store.scan()).await?;
        Ok(records
            .map(|entry| {
                let (id, record) = entry.map_err(TicketError::from)?;
                decode(&id, record)
            })
            .boxed())
    }

    /// Counts valid ticket-granting tickets, i.e. live SSO sessions.
    ///
    /// ## Errors
    ///
    /// Returns an error if the scan fails.
    pub async fn session_count(&self) -> TicketResult<usize> {
        self.count_valid(TicketKind::TicketGranting).await
    }

    /// Counts valid service tickets.
    ///
    /// ## Errors
    ///
    /// Returns an error if the scan fails.
    pub async fn service_ticket_count(&self) -> TicketResult<usize> {
        self.count_valid(TicketKind::Service).await
    }

    /// Runs one eviction pass: deletes every ticket that is expired now.
    ///
    /// Unreadable records are logged and skipped. Deletions race benignly with
    /// explicit deletes of the same ids.
    ///
    /// ## Errors
    ///
    /// Returns an error only if the scan cannot start.
    pub async fn sweep(&self) -> TicketResult<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let mut expired = Vec::new();

        let mut tickets = self.get_tickets().await?;
        while let Some(entry) = tickets.next().await {
            report.examined += 1;
            match entry {
                Ok(ticket) if ticket.is_expired(now) => expired.push(ticket.id().clone()),
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "skipping unreadable ticket"),
            }
        }
        drop(tickets);

        for id in expired {
            match self.remove_ticket_tree(&id).await {
                Ok(removed) => report.removed += removed.len(),
                Err(err) => {
                    tracing::warn!(ticket = %id.abbreviated(), error = %err, "failed to evict ticket");
                }
            }
        }
        Ok(report)
    }

    async fn count_valid(&self, kind: TicketKind) -> TicketResult<usize> {
        let now = self.clock.now();
        self.get_tickets()
            .await?
            .try_fold(0, |count, ticket| async move {
                Ok(if ticket.kind() == kind && !ticket.is_expired(now) {
                    count + 1
                } else {
                    count
                })
            })
            .await
    }

    async fn swap(&self, ticket: &Ticket) -> TicketResult<Option<u64>> {
        let data = encode(ticket)?;
        let ttl_hint = ticket.expiration_policy().max_lifetime();
        self.call(
            "update ticket",
            self.store
                .compare_and_swap(ticket.id().as_str(), ticket.version(), data, ttl_hint),
        )
        .await
    }

    async fn call<T, F>(&self, operation: &str, call: F) -> TicketResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, call).await {
            Ok(result) => result.map_err(|err| TicketError::from(err).with_registry_context(operation)),
            Err(_) => {
                tracing::warn!(operation, timeout = ?self.operation_timeout, "ticket store call timed out");
                Err(TicketError::RegistryUnavailable(format!(
                    "{operation}: timed out after {:?}",
                    self.operation_timeout
                )))
            }
        }
    }
}

fn encode(ticket: &Ticket) -> TicketResult<Vec<u8>> {
    serde_json::to_vec(ticket).map_err(|err| {
        TicketError::Internal(format!("cannot encode {}: {err}", ticket.id().abbreviated()))
    })
}

fn decode(id: &str, record: VersionedTicket) -> TicketResult<Ticket> {
    let mut ticket: Ticket = serde_json::from_slice(&record.data).map_err(|err| {
        TicketError::Internal(format!(
            "corrupt record {}: {err}",
            TicketId::from(id).abbreviated()
        ))
    })?;
    if ticket.id().as_str() != id {
        return Err(TicketError::Internal(format!(
            "record {} holds another ticket",
            TicketId::from(id).abbreviated()
        )));
    }
    ticket.set_version(record.version);
    Ok(ticket)
}
