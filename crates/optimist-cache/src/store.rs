//! The cache store contract required by the mutation coordinator.

use crate::{CacheEntry, CacheKey, RecordId};

/// A key/value query cache the coordinator writes through.
///
/// Implementations must be safe to share between concurrent submissions.
/// Every method is synchronous so staging completes before control returns
/// to the caller.
pub trait CacheStore: Send + Sync {
    /// Keys of `resource` that a batch touching `ids` may affect, in
    /// discovery order: every collection key of the resource plus the
    /// single-record keys whose id is in `ids`.
    fn list_keys_matching(&self, resource: &str, ids: &[RecordId]) -> Vec<CacheKey>;

    /// Read a payload verbatim.
    fn read(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Write a payload verbatim.
    fn write(&self, key: &CacheKey, payload: CacheEntry);

    /// Mark an entry stale so the next read refetches it.
    fn invalidate(&self, key: &CacheKey);

    /// Suspend refetches for a key. Holds nest: each call needs a matching
    /// [`CacheStore::resume`].
    fn quiesce(&self, key: &CacheKey);

    /// Release one quiesce hold.
    fn resume(&self, key: &CacheKey);
}
