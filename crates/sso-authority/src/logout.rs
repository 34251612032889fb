//! Single-logout fan-out.
//!
//! Destroying a session yields one [`LogoutRequest`] per ticket the session
//! issued to a service. Delivery is the notifier's business; the authority
//! hands the requests over once and never retries.

use std::fmt::Debug;

use async_trait::async_trait;
use sso_ticket::{Service, TicketId};
use thiserror::Error;

/// A service to notify that a session it joined has ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutRequest {
    /// Ticket the service received, so it can find its local session.
    pub ticket_id: TicketId,
    /// Service to notify.
    pub service: Service,
}

/// One-shot sequence of logout requests produced by a session destruction.
#[derive(Debug)]
pub struct LogoutRequests {
    requests: std::vec::IntoIter<LogoutRequest>,
    tickets_removed: usize,
}

impl LogoutRequests {
    pub(crate) fn new(requests: Vec<LogoutRequest>, tickets_removed: usize) -> Self {
        Self {
            requests: requests.into_iter(),
            tickets_removed,
        }
    }

    /// Returns how many tickets the destruction removed, the session root included.
    #[must_use]
    pub const fn tickets_removed(&self) -> usize {
        self.tickets_removed
    }
}

impl Iterator for LogoutRequests {
    type Item = LogoutRequest;

    fn next(&mut self) -> Option<Self::Item> {
        self.requests.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.requests.size_hint()
    }
}

impl ExactSizeIterator for LogoutRequests {}

/// Failed logout delivery.
#[derive(Debug, Error)]
#[error("logout notification to {service} failed: {reason}")]
pub struct NotificationError {
    /// Service that could not be notified.
    pub service: Service,
    /// Failure description.
    pub reason: String,
}

/// Delivers logout requests to services.
#[async_trait]
pub trait SingleLogoutNotifier: Send + Sync + Debug {
    /// Notifies one service.
    ///
    /// ## Errors
    ///
    /// Returns an error if delivery failed; the caller does not retry.
    async fn notify(&self, request: &LogoutRequest) -> Result<(), NotificationError>;
}

/// Totals of a single-logout fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogoutSummary {
    /// Requests delivered.
    pub notified: usize,
    /// Requests that failed.
    pub failed: usize,
}

/// Drives a notifier over the requests of a destroyed session.
///
/// Failures are logged and counted; nothing is retried.
pub async fn notify_single_logout<I>(requests: I, notifier: &dyn SingleLogoutNotifier) -> LogoutSummary
where
    I: IntoIterator<Item = LogoutRequest> + Send,
    I::IntoIter: Send,
{
    let mut summary = LogoutSummary::default();
    for request in requests {
        match notifier.notify(&request).await {
            Ok(()) => summary.notified += 1,
            Err(err) => {
                tracing::warn!(
                    ticket = %request.ticket_id.abbreviated(),
                    error = %err,
                    "single logout notification failed"
                );
                summary.failed += 1;
            }
        }
    }
    tracing::debug!(notified = summary.notified, failed = summary.failed, "single logout done");
    summary
}
