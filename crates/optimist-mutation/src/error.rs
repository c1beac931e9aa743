//! Error types for batch mutations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::BatchOutcome;

/// Reason carried by a cancelled submission.
pub const CANCELLED_REASON: &str = "mutationCancelled";

/// Outcome of one submission.
pub type BatchResult = Result<BatchOutcome, MutationError>;

/// Failure reported by the remote update executor.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("remote update failed with status {status}: {message}")]
pub struct RemoteFailure {
    /// Machine-readable status (HTTP status for HTTP backends).
    pub status: u16,
    /// Human-readable message.
    pub message: String,
}

impl RemoteFailure {
    /// Create a new remote failure.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Errors that can end a submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// Empty id set, rejected before any cache access.
    #[error("no record ids given, nothing to mutate")]
    NoOpSubmission,

    /// The remote write failed.
    #[error(transparent)]
    Remote(#[from] RemoteFailure),

    /// The undo window was cancelled before the remote call fired.
    #[error("mutation cancelled: {reason}")]
    Cancelled { reason: &'static str },

    /// Undo window outside the accepted range.
    #[error("undo delay of {delay_ms}ms exceeds the maximum of {max_ms}ms")]
    InvalidDelay { delay_ms: u128, max_ms: u64 },

    /// Invalid coordinator configuration.
    #[error("invalid coordinator configuration: {0}")]
    InvalidConfig(String),

    /// The remote call or the settle task ended without producing an outcome.
    #[error("submission aborted: {0}")]
    Aborted(String),
}

impl MutationError {
    /// The error every cancelled submission resolves with.
    pub fn cancelled() -> Self {
        MutationError::Cancelled {
            reason: CANCELLED_REASON,
        }
    }

    /// Whether this error is a deliberate cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MutationError::Cancelled { .. })
    }

    /// Status code to surface to users, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            MutationError::Remote(failure) => Some(failure.status),
            _ => None,
        }
    }
}
