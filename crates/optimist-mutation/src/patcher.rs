//! Optimistic patcher.

use std::collections::HashSet;

use tracing::trace;

use optimist_cache::{CacheEntry, CacheStore, Patch, RecordId};

use crate::Snapshot;

/// Write `values` over every captured entry, through the cache store.
///
/// Works from the snapshot's prior payloads, which were read under a
/// quiesce hold and so still match the cache.
pub fn apply(cache: &dyn CacheStore, snapshot: &Snapshot, ids: &[RecordId], values: &Patch) {
    let targets: HashSet<&RecordId> = ids.iter().collect();

    for entry in snapshot.entries() {
        let patched = patch_entry(&entry.prior, &targets, values);
        trace!(key = %entry.key, "patcher: writing optimistic payload");
        cache.write(&entry.key, patched);
    }
}

/// Merge `values` over the targeted records of one payload.
///
/// Collections keep their order and total, and records outside `targets`
/// are untouched. A single-record payload is already keyed to a targeted
/// record and is patched unconditionally.
pub fn patch_entry(entry: &CacheEntry, targets: &HashSet<&RecordId>, values: &Patch) -> CacheEntry {
    match entry {
        CacheEntry::Collection { records, total } => CacheEntry::Collection {
            records: records
                .iter()
                .map(|record| {
                    if targets.contains(&record.id) {
                        record.merged(values)
                    } else {
                        record.clone()
                    }
                })
                .collect(),
            total: *total,
        },
        CacheEntry::Single { record } => CacheEntry::Single {
            record: record.merged(values),
        },
    }
}
