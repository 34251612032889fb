//! In-memory ticket store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::time::Instant;

use crate::error::StoreResult;
use crate::store::{TicketStore, VersionedTicket};

#[derive(Debug, Clone)]
struct Record {
    version: u64,
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Record {
    fn new(version: u64, data: Vec<u8>, ttl_hint: Option<Duration>, now: Instant) -> Self {
        Self {
            version,
            data,
            expires_at: ttl_hint.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        !matches!(self.expires_at, Some(at) if at <= now)
    }

    fn to_versioned(&self) -> VersionedTicket {
        VersionedTicket {
            version: self.version,
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: DashMap<String, Record>,
    next_version: AtomicU64,
}

/// Ticket store backed by a concurrent hash map.
///
/// Suitable for single-node deployments and tests. Clones share the same
/// records. The ttl hint is honored: records past it read as absent and are
/// dropped by [`MemoryTicketStore::purge_expired`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTicketStore {
    inner: Arc<Inner>,
}

impl MemoryTicketStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .records
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .count()
    }

    /// Returns whether the store holds no live records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops records whose ttl hint has elapsed. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.records.len();
        self.inner.records.retain(|_, record| record.is_live(now));
        before.saturating_sub(self.inner.records.len())
    }

    fn next_version(&self) -> u64 {
        self.inner.next_version.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn put(
        &self,
        id: &str,
        data: Vec<u8>,
        ttl_hint: Option<Duration>,
    ) -> StoreResult<Option<u64>> {
        let now = Instant::now();
        let version = self.next_version();
        match self.inner.records.entry(id.to_owned()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_live(now) {
                    return Ok(None);
                }
                slot.insert(Record::new(version, data, ttl_hint, now));
            }
            Entry::Vacant(slot) => {
                slot.insert(Record::new(version, data, ttl_hint, now));
            }
        }
        Ok(Some(version))
    }

    async fn get(&self, id: &str) -> StoreResult<Option<VersionedTicket>> {
        let now = Instant::now();
        Ok(self
            .inner
            .records
            .get(id)
            .filter(|record| record.is_live(now))
            .map(|record| record.to_versioned()))
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected_version: u64,
        data: Vec<u8>,
        ttl_hint: Option<Duration>,
    ) -> StoreResult<Option<u64>> {
        let now = Instant::now();
        match self.inner.records.get_mut(id) {
            Some(mut record) if record.is_live(now) && record.version == expected_version => {
                let version = self.next_version();
                *record = Record::new(version, data, ttl_hint, now);
                Ok(Some(version))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .inner
            .records
            .remove(id)
            .is_some_and(|(_, record)| record.is_live(now)))
    }

    async fn scan(&self) -> StoreResult<BoxStream<'_, StoreResult<(String, VersionedTicket)>>> {
        let now = Instant::now();
        let snapshot: Vec<_> = self
            .inner
            .records
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .map(|entry| Ok((entry.key().clone(), entry.value().to_versioned())))
            .collect();
        Ok(stream::iter(snapshot).boxed())
    }
}
