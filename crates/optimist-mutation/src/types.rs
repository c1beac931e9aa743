//! Mutation types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use optimist_cache::{Patch, RecordId};

/// How a batch mutation treats the cache before the remote confirms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationMode {
    /// Leave the cache alone until the remote confirms.
    Pessimistic,
    /// Patch immediately, roll back on failure.
    Optimistic,
    /// Patch immediately, delay the remote call by an undo window that can
    /// be cancelled, roll back on failure or cancellation.
    #[default]
    Undoable,
}

impl MutationMode {
    /// Whether the cache is patched before the remote call.
    pub fn patches_early(self) -> bool {
        !matches!(self, MutationMode::Pessimistic)
    }
}

impl fmt::Display for MutationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationMode::Pessimistic => write!(f, "pessimistic"),
            MutationMode::Optimistic => write!(f, "optimistic"),
            MutationMode::Undoable => write!(f, "undoable"),
        }
    }
}

/// A batch update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    /// Resource the records belong to.
    pub resource: String,
    /// Records to update.
    pub ids: Vec<RecordId>,
    /// Fields to overwrite on every record.
    pub values: Patch,
    /// Mutation mode.
    #[serde(default)]
    pub mode: MutationMode,
    /// Undo window; the configured default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
}

impl MutationRequest {
    /// Create an undoable request with the default undo window.
    pub fn new(
        resource: impl Into<String>,
        ids: impl IntoIterator<Item = RecordId>,
        values: Patch,
    ) -> Self {
        Self {
            resource: resource.into(),
            ids: ids.into_iter().collect(),
            values,
            mode: MutationMode::default(),
            delay: None,
        }
    }

    /// Set the mutation mode.
    pub fn mode(mut self, mode: MutationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the undo window.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// What the remote reports after a successful batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Ids the remote updated.
    pub ids: Vec<RecordId>,
}

impl BatchOutcome {
    /// Create an outcome for the given ids.
    pub fn new(ids: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }
}

/// Lifecycle phase of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Capturing and patching the cache, arming the undo window.
    Staging,
    /// Waiting on the undo window or the remote call.
    Committing,
    /// Outcome reconciled into the cache.
    Settled,
}

/// Identifier of one submission, used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    /// Generate a new random submission id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
