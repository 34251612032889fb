//! Storage driver trait.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreResult;

/// A stored ticket payload together with its storage version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedTicket {
    /// Version assigned by the store on the last write.
    ///
    /// Versions are never reused for the same id, so a stale reader can
    /// always detect that the record changed underneath it.
    pub version: u64,
    /// Serialized ticket.
    pub data: Vec<u8>,
}

/// Minimal key-value contract a ticket storage backend must honor.
///
/// Implementations must be thread-safe and every operation must be atomic
/// per id. `ttl_hint` is an upper bound on how long the record can be useful;
/// backends with native expiry may use it, others can ignore it.
#[async_trait]
pub trait TicketStore: Send + Sync + Debug {
    /// Inserts a record if no live record exists under `id`.
    ///
    /// Returns the assigned version, or `None` if the id is taken.
    async fn put(
        &self,
        id: &str,
        data: Vec<u8>,
        ttl_hint: Option<Duration>,
    ) -> StoreResult<Option<u64>>;

    /// Reads a record.
    ///
    /// Returns `None` if the id is absent or its ttl hint has elapsed.
    async fn get(&self, id: &str) -> StoreResult<Option<VersionedTicket>>;

    /// Replaces a record only if its current version is `expected_version`.
    ///
    /// Returns the new version, or `None` if the record changed or vanished.
    async fn compare_and_swap(
        &self,
        id: &str,
        expected_version: u64,
        data: Vec<u8>,
        ttl_hint: Option<Duration>,
    ) -> StoreResult<Option<u64>>;

    /// Deletes a record.
    ///
    /// Returns whether a record was removed. Deleting an absent id is not an
    /// error.
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Streams a snapshot of all live records.
    ///
    /// The stream is finite and may be restarted by calling `scan` again.
    /// Distributed backends may return an eventually consistent view.
    async fn scan(&self) -> StoreResult<BoxStream<'_, StoreResult<(String, VersionedTicket)>>>;
}
