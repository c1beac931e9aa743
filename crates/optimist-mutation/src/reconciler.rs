//! Reconciliation of a settled submission into the cache.

use tracing::{debug, trace};

use optimist_cache::{CacheStore, RecordId};

use crate::Snapshot;

/// Settle a successful optimistic submission.
///
/// Every captured key is invalidated so downstream readers refetch it, then
/// its quiesce hold is released. Payloads are never written here.
pub fn on_success(cache: &dyn CacheStore, snapshot: Snapshot) {
    let count = snapshot.len();
    for entry in snapshot.into_entries() {
        cache.invalidate(&entry.key);
        cache.resume(&entry.key);
    }
    debug!(count, "reconciler: invalidated captured keys");
}

/// Settle a successful pessimistic submission.
///
/// Nothing was captured, so the keys affected now are invalidated.
pub fn invalidate_matching(cache: &dyn CacheStore, resource: &str, ids: &[RecordId]) {
    let keys = cache.list_keys_matching(resource, ids);
    for key in &keys {
        cache.invalidate(key);
    }
    debug!(resource, count = keys.len(), "reconciler: invalidated matching keys");
}

/// Settle a failed submission by restoring the snapshot verbatim.
pub fn on_failure(cache: &dyn CacheStore, snapshot: Snapshot) {
    restore(cache, snapshot);
}

/// Settle a cancelled submission by restoring the snapshot verbatim.
pub fn on_cancel(cache: &dyn CacheStore, snapshot: Snapshot) {
    restore(cache, snapshot);
}

fn restore(cache: &dyn CacheStore, snapshot: Snapshot) {
    let count = snapshot.len();
    for entry in snapshot.into_entries() {
        trace!(key = %entry.key, "reconciler: restoring prior payload");
        cache.write(&entry.key, entry.prior);
        cache.resume(&entry.key);
    }
    debug!(count, "reconciler: restored snapshot");
}
