//! In-memory query cache.
//!
//! Provides thread-safe storage of query results with subscription to
//! changes, per-key quiescing of in-flight refetches, and invalidation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::{CacheEntry, CacheError, CacheKey, CacheStore, RecordId};

/// Broadcast channel capacity for cache updates.
const BROADCAST_CHANNEL_CAPACITY: usize = 1024;

/// Update event for cache subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    /// A payload was written (fetch result, optimistic patch or restore).
    Written { key: CacheKey },
    /// An entry was marked stale; subscribers should refetch it.
    Invalidated { key: CacheKey },
    /// An entry was removed.
    Removed { key: CacheKey },
    /// Refetches for a key were suspended.
    Quiesced { key: CacheKey },
    /// The last quiesce hold on a key was released.
    Resumed { key: CacheKey },
}

/// Proof that a refetch was started, used to decide whether its result
/// may still land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: CacheKey,
    epoch: u64,
}

impl FetchTicket {
    /// The key being fetched.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

/// A cached entry with its bookkeeping.
#[derive(Debug, Clone)]
struct Slot {
    entry: CacheEntry,
    /// Insertion sequence, gives keys a stable discovery order.
    seq: u64,
    stale: bool,
    /// Outstanding quiesce holds.
    holds: u32,
    /// Bumped on every quiesce; fetches started before it are dropped.
    epoch: u64,
}

/// In-memory query cache.
///
/// Thread-safe and designed for concurrent access from multiple tasks.
pub struct QueryCache {
    slots: DashMap<CacheKey, Slot>,
    next_seq: AtomicU64,
    /// Broadcast channel for cache updates.
    updates_tx: broadcast::Sender<CacheUpdate>,
    /// When true, mutations do not notify subscribers.
    suppress_broadcasts: AtomicBool,
}

impl QueryCache {
    /// Create a new empty cache.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to cache updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.updates_tx.subscribe()
    }

    /// Set whether broadcasts should be suppressed, e.g. while seeding.
    pub fn set_suppress_broadcasts(&self, suppress: bool) {
        self.suppress_broadcasts.store(suppress, Ordering::SeqCst);
        debug!(suppress, "cache broadcast suppression changed");
    }

    fn broadcast(&self, update: CacheUpdate) {
        if self.suppress_broadcasts.load(Ordering::SeqCst) {
            return;
        }
        if self.updates_tx.send(update).is_err() {
            trace!("no subscribers for cache update");
        }
    }

    /// Insert a fetched result, checking its shape against the key.
    ///
    /// Collection keys take collection entries; single-record keys take a
    /// single entry for the same record.
    pub fn insert(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        check_shape(&key, &entry)?;
        self.store(key.clone(), entry, true);
        self.broadcast(CacheUpdate::Written { key });
        Ok(())
    }

    /// Get an entry.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.slots.get(key).map(|s| s.entry.clone())
    }

    /// Remove an entry.
    pub fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.slots.remove(key).map(|(_, slot)| slot.entry);
        if removed.is_some() {
            self.broadcast(CacheUpdate::Removed { key: key.clone() });
            trace!(key = %key, "cache: entry removed");
        }
        removed
    }

    /// All keys in discovery order.
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<(u64, CacheKey)> = self
            .slots
            .iter()
            .map(|s| (s.value().seq, s.key().clone()))
            .collect();
        keys.sort_by_key(|(seq, _)| *seq);
        keys.into_iter().map(|(_, key)| key).collect()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether an entry has been invalidated since it was last fetched.
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.slots.get(key).is_some_and(|s| s.stale)
    }

    /// Whether refetches for a key are currently suspended.
    pub fn is_quiesced(&self, key: &CacheKey) -> bool {
        self.slots.get(key).is_some_and(|s| s.holds > 0)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.slots.clear();
        debug!("cache cleared");
    }

    /// Start a refetch for a key.
    pub fn begin_fetch(&self, key: &CacheKey) -> FetchTicket {
        let epoch = self.slots.get(key).map(|s| s.epoch).unwrap_or(0);
        FetchTicket {
            key: key.clone(),
            epoch,
        }
    }

    /// Land a refetch result.
    ///
    /// Returns `Ok(false)` when the result was dropped because the key was
    /// quiesced after the fetch started or is still quiesced.
    pub fn complete_fetch(&self, ticket: FetchTicket, entry: CacheEntry) -> Result<bool, CacheError> {
        check_shape(&ticket.key, &entry)?;
        let landed = match self.slots.entry(ticket.key.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.holds > 0 || slot.epoch != ticket.epoch {
                    false
                } else {
                    slot.entry = entry;
                    slot.stale = false;
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    entry,
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    stale: false,
                    holds: 0,
                    epoch: 0,
                });
                true
            }
        };

        if landed {
            trace!(key = %ticket.key, "cache: fetch landed");
            self.broadcast(CacheUpdate::Written { key: ticket.key });
        } else {
            debug!(key = %ticket.key, "cache: dropped fetch result for quiesced key");
        }
        Ok(landed)
    }

    fn store(&self, key: CacheKey, entry: CacheEntry, fresh: bool) {
        match self.slots.entry(key) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.entry = entry;
                if fresh {
                    slot.stale = false;
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    entry,
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    stale: false,
                    holds: 0,
                    epoch: 0,
                });
            }
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        let (updates_tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        Self {
            slots: DashMap::new(),
            next_seq: AtomicU64::new(0),
            updates_tx,
            suppress_broadcasts: AtomicBool::new(false),
        }
    }
}

impl CacheStore for QueryCache {
    fn list_keys_matching(&self, resource: &str, ids: &[RecordId]) -> Vec<CacheKey> {
        let mut keys: Vec<(u64, CacheKey)> = self
            .slots
            .iter()
            .filter(|s| s.key().affected_by(resource, ids))
            .map(|s| (s.value().seq, s.key().clone()))
            .collect();
        keys.sort_by_key(|(seq, _)| *seq);
        keys.into_iter().map(|(_, key)| key).collect()
    }

    fn read(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.get(key)
    }

    fn write(&self, key: &CacheKey, payload: CacheEntry) {
        self.store(key.clone(), payload, false);
        trace!(key = %key, "cache: entry written");
        self.broadcast(CacheUpdate::Written { key: key.clone() });
    }

    fn invalidate(&self, key: &CacheKey) {
        let invalidated = match self.slots.get_mut(key) {
            Some(mut slot) => {
                slot.stale = true;
                true
            }
            None => false,
        };
        if invalidated {
            trace!(key = %key, "cache: entry invalidated");
            self.broadcast(CacheUpdate::Invalidated { key: key.clone() });
        }
    }

    fn quiesce(&self, key: &CacheKey) {
        let quiesced = match self.slots.get_mut(key) {
            Some(mut slot) => {
                slot.holds += 1;
                slot.epoch += 1;
                true
            }
            None => false,
        };
        if quiesced {
            trace!(key = %key, "cache: key quiesced");
            self.broadcast(CacheUpdate::Quiesced { key: key.clone() });
        }
    }

    fn resume(&self, key: &CacheKey) {
        let released = match self.slots.get_mut(key) {
            Some(mut slot) if slot.holds > 0 => {
                slot.holds -= 1;
                slot.holds == 0
            }
            _ => false,
        };
        if released {
            trace!(key = %key, "cache: key resumed");
            self.broadcast(CacheUpdate::Resumed { key: key.clone() });
        }
    }
}

/// Check that a payload fits the query kind of its key.
fn check_shape(key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
    match (key.record_id(), entry) {
        (None, CacheEntry::Collection { .. }) => Ok(()),
        (None, CacheEntry::Single { .. }) => Err(CacheError::KindMismatch {
            key: key.clone(),
            expected: "collection",
        }),
        (Some(id), CacheEntry::Single { record }) if &record.id == id => Ok(()),
        (Some(_), CacheEntry::Single { record }) => Err(CacheError::RecordMismatch {
            key: key.clone(),
            found: record.id.to_string(),
        }),
        (Some(_), CacheEntry::Collection { .. }) => Err(CacheError::KindMismatch {
            key: key.clone(),
            expected: "single",
        }),
    }
}
