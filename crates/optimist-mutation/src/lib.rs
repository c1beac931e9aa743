//! Optimistic batch-mutation coordinator.
//!
//! Applies a partial update to a set of records in a client-held query
//! cache before the remote write is confirmed, then reconciles:
//! - Captures a snapshot of every affected cache entry
//! - Patches the entries optimistically
//! - Optionally holds the remote call in a cancellable undo window
//! - Invalidates on success, restores the snapshot on failure or undo
//! - Emits one success/error notification per outcome

mod config;
mod coordinator;
mod error;
pub mod executor;
pub mod notifier;
pub mod patcher;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
mod types;

pub use config::{CoordinatorConfig, DEFAULT_UNDO_DELAY_MS, MAX_UNDO_DELAY_MS};
pub use coordinator::{Coordinator, CoordinatorBuilder, Submission};
pub use error::{BatchResult, CANCELLED_REASON, MutationError, RemoteFailure};
pub use executor::{FnExecutor, RemoteExecutor, from_fn};
pub use notifier::{
    BroadcastSink, NotificationDetail, NotificationEvent, NotificationKind, NotificationSink,
    Notifier, NullSink,
};
pub use registry::{CancellationRegistry, PendingUndo, UndoRegistry};
pub use scheduler::{CancelScheduler, CancelToken, TokenState};
pub use snapshot::{Snapshot, SnapshotEntry};
pub use types::{BatchOutcome, MutationMode, MutationRequest, Phase, SubmissionId};
