//! Ticket identifiers.
//!
//! An identifier is `<PREFIX>-<random>[-<suffix>]`. The prefix names the
//! ticket kind for routing and debugging; the random part carries the
//! security and is drawn from the thread-local CSPRNG, never from a counter
//! or a timestamp.

use std::fmt;

use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};

/// Length of the random part of an identifier.
///
/// 40 alphanumeric characters carry about 238 bits of entropy (log2(62^40)).
pub const RANDOM_PART_LENGTH: usize = 40;

/// Kind of ticket, encoded as the identifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketKind {
    /// Ticket-granting ticket (`TGT-`).
    TicketGranting,
    /// Service ticket (`ST-`).
    Service,
    /// Proxy-granting ticket (`PGT-`).
    ProxyGranting,
    /// Proxy ticket (`PT-`).
    Proxy,
}

impl TicketKind {
    /// Returns the identifier prefix, without the separator.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::TicketGranting => "TGT",
            Self::Service => "ST",
            Self::ProxyGranting => "PGT",
            Self::Proxy => "PT",
        }
    }

    /// Parses the kind from an identifier prefix.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "TGT" => Some(Self::TicketGranting),
            "ST" => Some(Self::Service),
            "PGT" => Some(Self::ProxyGranting),
            "PT" => Some(Self::Proxy),
            _ => None,
        }
    }

    /// Returns whether tickets of this kind can grant dependent tickets.
    #[must_use]
    pub const fn is_granting(self) -> bool {
        matches!(self, Self::TicketGranting | Self::ProxyGranting)
    }

    /// Returns whether tickets of this kind are consumed on redemption.
    #[must_use]
    pub const fn is_single_use(self) -> bool {
        matches!(self, Self::Service | Self::Proxy)
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Opaque ticket identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Wraps a raw identifier as received from a caller.
    ///
    /// No validation happens here; unknown or malformed ids simply fail lookup.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the kind encoded in the prefix, if recognizable.
    #[must_use]
    pub fn kind(&self) -> Option<TicketKind> {
        self.0
            .split_once('-')
            .and_then(|(prefix, _)| TicketKind::from_prefix(prefix))
    }

    /// Returns a shortened form safe for logging.
    ///
    /// The full id is a bearer credential and must not be written to logs.
    #[must_use]
    pub fn abbreviated(&self) -> String {
        let visible: String = self.0.chars().take(12).collect();
        if visible.len() < self.0.len() {
            format!("{visible}...")
        } else {
            visible
        }
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TicketId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TicketId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generator of unique, unguessable ticket identifiers.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generates a new identifier for a ticket of the given kind.
    fn generate(&self, kind: TicketKind) -> TicketId;
}

/// Default generator drawing the random part from the thread-local CSPRNG.
#[derive(Debug, Clone, Default)]
pub struct RandomIdGenerator {
    suffix: Option<String>,
}

impl RandomIdGenerator {
    /// Creates a generator without a node suffix.
    #[must_use]
    pub const fn new() -> Self {
        Self { suffix: None }
    }

    /// Appends a node suffix to every generated id (clustered deployments).
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.suffix = (!suffix.is_empty()).then_some(suffix);
        self
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate(&self, kind: TicketKind) -> TicketId {
        let random = random_alphanumeric(RANDOM_PART_LENGTH);
        let id = match &self.suffix {
            Some(suffix) => format!("{}-{random}-{suffix}", kind.prefix()),
            None => format!("{}-{random}", kind.prefix()),
        };
        TicketId(id)
    }
}

/// Generates a cryptographically secure random alphanumeric string.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}
