//! Expiration policy engine.
//!
//! Policies are values, evaluated by a single function over a ticket's usage
//! record ([`TicketUsage`]), the authentication backing it (for delegating
//! policies) and the current instant. Evaluation never mutates a ticket.
//!
//! Two outcomes are distinct:
//!
//! - [`ExpirationPolicy::is_expired`] - the ticket is dead for good.
//! - [`ExpirationPolicy::throttle_delay`] - the ticket is alive but was used
//!   too recently; the caller should retry after the returned delay.
//!
//! Elapsed time is measured on the UTC wall clock, not a monotonic clock:
//! usage timestamps are persisted with the ticket and compared on whichever
//! node reads it next, possibly after a restart, where a monotonic instant
//! would mean nothing. Elapsed time is clamped at zero, so a timestamp written
//! by a node whose clock runs ahead never expires a ticket early.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::authentication::Authentication;

/// Usage record a policy is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketUsage {
    /// When the ticket was created.
    pub created_at: DateTime<Utc>,
    /// When the ticket was last used (creation time if never used).
    pub last_used_at: DateTime<Utc>,
    /// Number of successful uses.
    pub count_of_uses: u32,
}

impl TicketUsage {
    /// Usage record of a ticket created at `created_at` and never used.
    #[must_use]
    pub const fn fresh(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            last_used_at: created_at,
            count_of_uses: 0,
        }
    }
}

/// How a composite policy combines its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    /// Expired as soon as any member says so.
    #[default]
    Any,
    /// Expired only when every member says so.
    All,
}

/// Predicate over the authentication backing a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicySelector {
    /// The user asked for a long-term session.
    RememberMe,
    /// The session is an impersonation.
    Surrogate,
    /// An authentication attribute is present.
    AttributePresent {
        /// Attribute name.
        name: String,
    },
    /// An authentication attribute holds the given value.
    AttributeEquals {
        /// Attribute name.
        name: String,
        /// Expected value.
        value: String,
    },
}

impl PolicySelector {
    /// Returns whether the selector applies to the authentication.
    #[must_use]
    pub fn matches(&self, authentication: &Authentication) -> bool {
        match self {
            Self::RememberMe => authentication.is_remember_me(),
            Self::Surrogate => authentication.is_surrogate(),
            Self::AttributePresent { name } => authentication.has_attribute(name),
            Self::AttributeEquals { name, value } => authentication
                .attribute(name)
                .is_some_and(|values| values.iter().any(|v| v == value)),
        }
    }
}

/// One branch of a delegating policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRule {
    /// Condition selecting this branch.
    pub when: PolicySelector,
    /// Policy applied when the condition holds.
    pub policy: ExpirationPolicy,
}

/// Expiration policy attached to a ticket at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpirationPolicy {
    /// Never expires.
    NeverExpires,
    /// Always expired; useful to disable a ticket kind.
    AlwaysExpires,
    /// Expires once `time_to_live` has elapsed since creation.
    TimeToLive {
        /// Lifetime measured from creation.
        time_to_live: Duration,
    },
    /// Expires once `time_to_idle` has elapsed since the last use.
    TimeToIdle {
        /// Idle window measured from the last use.
        time_to_idle: Duration,
    },
    /// Expires at creation plus `timeout`, the deadline itself included.
    HardTimeout {
        /// Absolute lifetime measured from creation.
        timeout: Duration,
    },
    /// Expires after `max_uses` successful uses.
    UsageCount {
        /// Permitted number of uses.
        max_uses: u32,
    },
    /// Never expires on its own, but rejects uses closer than `min_interval`.
    Throttled {
        /// Minimum spacing between two uses.
        min_interval: Duration,
    },
    /// Sliding idle window bounded by an absolute lifetime.
    TicketGrantingDefault {
        /// Absolute lifetime measured from creation.
        max_time_to_live: Duration,
        /// Idle window measured from the last use.
        time_to_idle: Duration,
    },
    /// Combination of policies.
    Composite {
        /// Member policies.
        policies: Vec<ExpirationPolicy>,
        /// Combination mode.
        #[serde(default)]
        mode: CompositeMode,
    },
    /// Chooses a policy from the authentication backing the ticket.
    ///
    /// Rules are tried in order; tickets without an authentication (service
    /// and proxy tickets) and tickets matching no rule use `default`.
    Delegating {
        /// Ordered selection rules.
        rules: Vec<DelegationRule>,
        /// Fallback policy.
        default: Box<ExpirationPolicy>,
    },
}

impl ExpirationPolicy {
    /// Shorthand for [`ExpirationPolicy::TimeToLive`].
    #[must_use]
    pub const fn time_to_live(time_to_live: Duration) -> Self {
        Self::TimeToLive { time_to_live }
    }

    /// Shorthand for [`ExpirationPolicy::TimeToIdle`].
    #[must_use]
    pub const fn time_to_idle(time_to_idle: Duration) -> Self {
        Self::TimeToIdle { time_to_idle }
    }

    /// Shorthand for a composite that expires when any member expires.
    #[must_use]
    pub const fn any_of(policies: Vec<Self>) -> Self {
        Self::Composite {
            policies,
            mode: CompositeMode::Any,
        }
    }

    /// Shorthand for a use-limited, time-limited policy (service tickets).
    #[must_use]
    pub fn uses_or_timeout(max_uses: u32, time_to_live: Duration) -> Self {
        Self::any_of(vec![
            Self::UsageCount { max_uses },
            Self::TimeToLive { time_to_live },
        ])
    }

    /// Returns whether a ticket with this usage record is expired at `now`.
    #[must_use]
    pub fn is_expired(
        &self,
        usage: &TicketUsage,
        authentication: Option<&Authentication>,
        now: DateTime<Utc>,
    ) -> bool {
        match self {
            Self::NeverExpires | Self::Throttled { .. } => false,
            Self::AlwaysExpires => true,
            Self::TimeToLive { time_to_live } => elapsed(usage.created_at, now) > *time_to_live,
            Self::TimeToIdle { time_to_idle } => elapsed(usage.last_used_at, now) > *time_to_idle,
            Self::HardTimeout { timeout } => elapsed(usage.created_at, now) >= *timeout,
            Self::UsageCount { max_uses } => usage.count_of_uses >= *max_uses,
            Self::TicketGrantingDefault {
                max_time_to_live,
                time_to_idle,
            } => {
                elapsed(usage.created_at, now) > *max_time_to_live
                    || elapsed(usage.last_used_at, now) > *time_to_idle
            }
            Self::Composite { policies, mode } => match mode {
                CompositeMode::Any => policies
                    .iter()
                    .any(|p| p.is_expired(usage, authentication, now)),
                CompositeMode::All => {
                    !policies.is_empty()
                        && policies
                            .iter()
                            .all(|p| p.is_expired(usage, authentication, now))
                }
            },
            Self::Delegating { .. } => self
                .select(authentication)
                .is_expired(usage, authentication, now),
        }
    }

    /// Returns how long the caller must wait before the ticket may be used again.
    ///
    /// `None` means a use at `now` is permitted. Only [`ExpirationPolicy::Throttled`]
    /// members produce a delay.
    #[must_use]
    pub fn throttle_delay(
        &self,
        usage: &TicketUsage,
        authentication: Option<&Authentication>,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        match self {
            Self::Throttled { min_interval } => {
                if usage.count_of_uses == 0 {
                    return None;
                }
                let since_last_use = elapsed(usage.last_used_at, now);
                (since_last_use < *min_interval).then(|| *min_interval - since_last_use)
            }
            Self::Composite { policies, .. } => policies
                .iter()
                .filter_map(|p| p.throttle_delay(usage, authentication, now))
                .max(),
            Self::Delegating { .. } => self
                .select(authentication)
                .throttle_delay(usage, authentication, now),
            _ => None,
        }
    }

    /// Returns an upper bound on the lifetime of a ticket under this policy.
    ///
    /// Used as the time-to-live hint handed to storage backends. `None` means
    /// the lifetime is unbounded (idle-only or use-only policies).
    #[must_use]
    pub fn max_lifetime(&self) -> Option<Duration> {
        match self {
            Self::AlwaysExpires => Some(Duration::ZERO),
            Self::TimeToLive { time_to_live } => Some(*time_to_live),
            Self::HardTimeout { timeout } => Some(*timeout),
            Self::TicketGrantingDefault {
                max_time_to_live, ..
            } => Some(*max_time_to_live),
            Self::NeverExpires
            | Self::TimeToIdle { .. }
            | Self::UsageCount { .. }
            | Self::Throttled { .. } => None,
            Self::Composite { policies, mode } => match mode {
                CompositeMode::Any => policies.iter().filter_map(Self::max_lifetime).min(),
                CompositeMode::All => policies
                    .iter()
                    .map(Self::max_lifetime)
                    .collect::<Option<Vec<_>>>()
                    .and_then(|bounds| bounds.into_iter().max()),
            },
            Self::Delegating { rules, default } => rules
                .iter()
                .map(|rule| rule.policy.max_lifetime())
                .chain(std::iter::once(default.max_lifetime()))
                .collect::<Option<Vec<_>>>()
                .and_then(|bounds| bounds.into_iter().max()),
        }
    }

    fn select(&self, authentication: Option<&Authentication>) -> &Self {
        let Self::Delegating { rules, default } = self else {
            return self;
        };
        let Some(authentication) = authentication else {
            return default;
        };
        match rules.iter().find(|rule| rule.when.matches(authentication)) {
            Some(rule) => {
                tracing::trace!(selector = ?rule.when, "delegating expiration policy matched");
                &rule.policy
            }
            None => default,
        }
    }
}

/// Wall-clock time from `since` to `now`, zero if `since` lies ahead.
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
