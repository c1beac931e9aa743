//! Snapshot capture.
//!
//! Records the payload of every cache entry a batch may touch, before the
//! entry is patched, so a failed or cancelled batch can be rolled back
//! exactly.

use tracing::trace;

use optimist_cache::{CacheEntry, CacheKey, CacheStore, RecordId};

/// One captured cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    /// Key the payload was read from.
    pub key: CacheKey,
    /// Payload as it was before the batch.
    pub prior: CacheEntry,
}

/// Prior cache state for one submission, in discovery order.
///
/// Each captured key holds one quiesce hold until the snapshot is consumed
/// by the reconciler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    /// Captured entries, in discovery order.
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Captured keys, in discovery order.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.iter().map(|e| &e.key)
    }

    /// Number of captured entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<SnapshotEntry> {
        self.entries
    }
}

/// Capture every cached entry of `resource` a batch touching `ids` may
/// affect.
///
/// Each key is quiesced before it is read so an in-flight refetch cannot
/// land between the read and the optimistic patch. Keys that disappear
/// between listing and reading are released and skipped. An empty snapshot
/// means there is nothing to patch.
pub fn capture(cache: &dyn CacheStore, resource: &str, ids: &[RecordId]) -> Snapshot {
    let mut entries = Vec::new();

    for key in cache.list_keys_matching(resource, ids) {
        cache.quiesce(&key);
        match cache.read(&key) {
            Some(prior) => {
                trace!(key = %key, "snapshot: captured entry");
                entries.push(SnapshotEntry { key, prior });
            }
            None => {
                trace!(key = %key, "snapshot: entry vanished before read");
                cache.resume(&key);
            }
        }
    }

    Snapshot { entries }
}
