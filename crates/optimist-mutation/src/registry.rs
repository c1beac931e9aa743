//! Cancellation registry for user-facing undo affordances.
//!
//! When a registry is installed, the coordinator hands it the cancel token
//! of each undoable submission instead of arming its own timer. The
//! registry owns the undo window: it fires the token when the window is
//! over (timer, notification dismissed) or cancels it when the user undoes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use optimist_cache::RecordId;

use crate::{CancelScheduler, CancelToken, Notifier, TokenState};

/// Owner of undo windows for undoable submissions.
pub trait CancellationRegistry: Send + Sync {
    /// Take ownership of the undo window for a batch.
    fn register_cancellable(
        &self,
        resource: &str,
        ids: &[RecordId],
        token: CancelToken,
        delay: Duration,
    );

    /// Forget a batch once it settled. Only the entry holding `token` is
    /// removed; a newer submission of the same batch keeps its window.
    fn remove(&self, resource: &str, ids: &[RecordId], token: &CancelToken);
}

/// A batch waiting in its undo window.
#[derive(Debug, Clone)]
pub struct PendingUndo {
    pub resource: String,
    pub ids: Vec<RecordId>,
    pub token: CancelToken,
    pub delay: Duration,
    pub registered_at: DateTime<Utc>,
}

/// In-memory registry keyed by notification key.
pub struct UndoRegistry {
    entries: DashMap<String, PendingUndo>,
    /// Fire tokens automatically once their window elapses.
    timers: bool,
}

impl UndoRegistry {
    /// Registry that leaves firing entirely to the caller.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            timers: false,
        })
    }

    /// Registry that also fires each token after its window.
    pub fn with_timers() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            timers: true,
        })
    }

    /// Undo a batch still inside its window.
    ///
    /// Returns `true` if this call cancelled it.
    pub fn undo(&self, resource: &str, ids: &[RecordId]) -> bool {
        let key = Notifier::notification_key(resource, ids);
        let cancelled = self
            .entries
            .get(&key)
            .map(|entry| entry.token.cancel())
            .unwrap_or(false);
        if cancelled {
            info!(key = %key, "batch undone");
        }
        cancelled
    }

    /// End a batch's window early and let its remote call run.
    ///
    /// Returns `true` if this call fired it.
    pub fn commit(&self, resource: &str, ids: &[RecordId]) -> bool {
        let key = Notifier::notification_key(resource, ids);
        let fired = self
            .entries
            .get(&key)
            .map(|entry| entry.token.fire())
            .unwrap_or(false);
        if fired {
            debug!(key = %key, "undo window closed early");
        }
        fired
    }

    /// Fire every batch still inside its window, e.g. on shutdown.
    ///
    /// Returns the number of tokens fired.
    pub fn commit_all(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.token.fire())
            .count()
    }

    /// Whether a batch is still inside its window.
    pub fn is_pending(&self, resource: &str, ids: &[RecordId]) -> bool {
        let key = Notifier::notification_key(resource, ids);
        self.entries
            .get(&key)
            .is_some_and(|entry| entry.token.state() == TokenState::Armed)
    }

    /// Batches still inside their window, oldest first.
    pub fn pending(&self) -> Vec<PendingUndo> {
        let mut pending: Vec<PendingUndo> = self
            .entries
            .iter()
            .filter(|entry| entry.token.state() == TokenState::Armed)
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|entry| entry.registered_at);
        pending
    }

    /// Number of registered batches, settled or not yet removed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no batch is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CancellationRegistry for UndoRegistry {
    fn register_cancellable(
        &self,
        resource: &str,
        ids: &[RecordId],
        token: CancelToken,
        delay: Duration,
    ) {
        let key = Notifier::notification_key(resource, ids);
        if self.timers {
            CancelScheduler::start_timer(token.clone(), delay);
        }
        let pending = PendingUndo {
            resource: resource.to_string(),
            ids: ids.to_vec(),
            token,
            delay,
            registered_at: Utc::now(),
        };
        if let Some(previous) = self.entries.insert(key.clone(), pending) {
            // Newer window owns the undo affordance; the older batch commits.
            let fired = previous.token.fire();
            debug!(key = %key, fired, "replaced pending undo");
        }
    }

    fn remove(&self, resource: &str, ids: &[RecordId], token: &CancelToken) {
        let key = Notifier::notification_key(resource, ids);
        self.entries
            .remove_if(&key, |_, entry| entry.token.same_token(token));
    }
}
