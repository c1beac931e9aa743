//! Error types for the query cache.

use thiserror::Error;

use crate::CacheKey;

/// Errors that can occur when populating the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Payload shape does not match the query kind of its key.
    #[error("payload kind mismatch for {key}: expected {expected} entry")]
    KindMismatch {
        key: CacheKey,
        expected: &'static str,
    },

    /// Single-record payload stored under a key for a different record.
    #[error("record {found} stored under {key}")]
    RecordMismatch { key: CacheKey, found: String },

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
