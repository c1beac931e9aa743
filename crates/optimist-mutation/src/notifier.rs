//! Success/error notifications for settled submissions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use optimist_cache::RecordId;

use crate::{CoordinatorConfig, MutationError};

/// Broadcast channel capacity for notification events.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// Kind of notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
}

/// Structured detail attached to a notification, for template rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDetail {
    /// Number of records in the batch.
    pub count: usize,
    /// Remote status code, for errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Whether the batch went through an undo window.
    pub undoable: bool,
}

/// A user-facing event describing how a batch settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Coalescing key: the same batch always produces the same key.
    pub key: String,
    pub kind: NotificationKind,
    pub resource: String,
    /// Template key, or the remote's own message for errors.
    pub message: String,
    pub detail: NotificationDetail,
    pub emitted_at: DateTime<Utc>,
}

/// Receives notification events. Fire-and-forget.
pub trait NotificationSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: NotificationEvent);
}

/// Sink that publishes events on a broadcast channel.
///
/// Slow subscribers may lag and miss events; emitting never blocks.
pub struct BroadcastSink {
    tx: broadcast::Sender<NotificationEvent>,
}

impl BroadcastSink {
    /// Create a new sink.
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        Arc::new(Self { tx })
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn emit(&self, event: NotificationEvent) {
        if self.tx.send(event).is_err() {
            trace!("no subscribers for notification");
        }
    }
}

/// Sink that drops every event.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn emit(&self, _event: NotificationEvent) {}
}

/// Builds notification events and hands them to a sink.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    notify_on_success: bool,
    success_message: String,
    error_message: String,
}

impl Notifier {
    /// Create a notifier from the coordinator configuration.
    pub fn new(sink: Arc<dyn NotificationSink>, config: &CoordinatorConfig) -> Self {
        Self {
            sink,
            notify_on_success: config.notify_on_success,
            success_message: config.success_message.clone(),
            error_message: config.error_message.clone(),
        }
    }

    /// Coalescing key for a batch: resource plus sorted, deduplicated ids.
    pub fn notification_key(resource: &str, ids: &[RecordId]) -> String {
        let mut ids: Vec<&RecordId> = ids.iter().collect();
        ids.sort();
        ids.dedup();
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        format!("{}:{}", resource, ids.join(","))
    }

    /// Report a successful batch. Returns whether an event was emitted.
    pub fn success(&self, resource: &str, ids: &[RecordId], undoable: bool) -> bool {
        if !self.notify_on_success {
            return false;
        }
        self.emit(NotificationEvent {
            key: Self::notification_key(resource, ids),
            kind: NotificationKind::Success,
            resource: resource.to_string(),
            message: self.success_message.clone(),
            detail: NotificationDetail {
                count: ids.len(),
                status: None,
                undoable,
            },
            emitted_at: Utc::now(),
        });
        true
    }

    /// Report a failed batch. Returns whether an event was emitted.
    ///
    /// Cancellations are deliberate and never reported.
    pub fn error(
        &self,
        resource: &str,
        ids: &[RecordId],
        undoable: bool,
        err: &MutationError,
    ) -> bool {
        if err.is_cancelled() {
            trace!(resource, "suppressing notification for cancelled batch");
            return false;
        }
        let message = match err {
            MutationError::Remote(failure) if !failure.message.trim().is_empty() => {
                failure.message.clone()
            }
            _ => self.error_message.clone(),
        };
        self.emit(NotificationEvent {
            key: Self::notification_key(resource, ids),
            kind: NotificationKind::Error,
            resource: resource.to_string(),
            message,
            detail: NotificationDetail {
                count: ids.len(),
                status: err.status(),
                undoable,
            },
            emitted_at: Utc::now(),
        });
        true
    }

    fn emit(&self, event: NotificationEvent) {
        debug!(key = %event.key, kind = ?event.kind, "emitting notification");
        self.sink.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RemoteFailure;

    fn ids(raw: &[i64]) -> Vec<RecordId> {
        raw.iter().copied().map(RecordId::Int).collect()
    }

    fn notifier() -> (Notifier, broadcast::Receiver<NotificationEvent>) {
        let sink = BroadcastSink::new();
        let rx = sink.subscribe();
        (Notifier::new(sink, &CoordinatorConfig::default()), rx)
    }

    #[test]
    fn test_key_is_order_independent() {
        assert_eq!(
            Notifier::notification_key("posts", &ids(&[2, 1, 2])),
            Notifier::notification_key("posts", &ids(&[1, 2]))
        );
        assert_eq!(Notifier::notification_key("posts", &ids(&[1, 2])), "posts:1,2");
        assert_ne!(
            Notifier::notification_key("posts", &ids(&[1])),
            Notifier::notification_key("users", &ids(&[1]))
        );
    }

    #[test]
    fn test_success_event() {
        let (notifier, mut rx) = notifier();
        assert!(notifier.success("posts", &ids(&[1, 2]), true));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, NotificationKind::Success);
        assert_eq!(event.resource, "posts");
        assert_eq!(event.message, "notification.updated");
        assert_eq!(event.detail.count, 2);
        assert!(event.detail.undoable);
    }

    #[test]
    fn test_success_can_be_disabled() {
        let sink = BroadcastSink::new();
        let mut rx = sink.subscribe();
        let config = CoordinatorConfig::default().with_success_notifications(false);
        let notifier = Notifier::new(sink, &config);

        assert!(!notifier.success("posts", &ids(&[1]), false));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_error_uses_remote_message() {
        let (notifier, mut rx) = notifier();
        let err = MutationError::Remote(RemoteFailure::new(409, "conflict"));
        assert!(notifier.error("posts", &ids(&[1]), false, &err));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, NotificationKind::Error);
        assert_eq!(event.message, "conflict");
        assert_eq!(event.detail.status, Some(409));
        assert!(!event.detail.undoable);
    }

    #[test]
    fn test_error_reports_undoable_flag() {
        let (notifier, mut rx) = notifier();
        let err = MutationError::Remote(RemoteFailure::new(500, "boom"));
        assert!(notifier.error("posts", &ids(&[1, 2]), true, &err));

        let event = rx.try_recv().unwrap();
        assert!(event.detail.undoable);
        assert_eq!(event.detail.count, 2);
    }

    #[test]
    fn test_error_falls_back_to_template() {
        let (notifier, mut rx) = notifier();
        let err = MutationError::Remote(RemoteFailure::new(500, ""));
        notifier.error("posts", &ids(&[1]), false, &err);
        assert_eq!(rx.try_recv().unwrap().message, "notification.http_error");
    }

    #[test]
    fn test_cancel_is_suppressed() {
        let (notifier, mut rx) = notifier();
        assert!(!notifier.error("posts", &ids(&[1]), true, &MutationError::cancelled()));
        assert!(rx.try_recv().is_err());
    }
}
