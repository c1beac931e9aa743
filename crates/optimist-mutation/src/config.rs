//! Coordinator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::MutationError;

/// Default undo window in milliseconds.
pub const DEFAULT_UNDO_DELAY_MS: u64 = 5_000;

/// Longest undo window accepted, in milliseconds (10 minutes).
pub const MAX_UNDO_DELAY_MS: u64 = 600_000;

const DEFAULT_SUCCESS_MESSAGE: &str = "notification.updated";
const DEFAULT_ERROR_MESSAGE: &str = "notification.http_error";

/// Configuration for a [`crate::Coordinator`].
///
/// Messages are template keys handed to the notification surface, which
/// owns translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Undo window used when a request does not carry one.
    pub undo_delay_ms: u64,
    /// Emit a notification when a batch succeeds.
    pub notify_on_success: bool,
    /// Template key for success notifications.
    pub success_message: String,
    /// Template key for error notifications when the remote gave no message.
    pub error_message: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            undo_delay_ms: DEFAULT_UNDO_DELAY_MS,
            notify_on_success: true,
            success_message: DEFAULT_SUCCESS_MESSAGE.to_string(),
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Set the default undo window.
    pub fn with_undo_delay(mut self, delay: Duration) -> Self {
        self.undo_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable or disable success notifications.
    pub fn with_success_notifications(mut self, enabled: bool) -> Self {
        self.notify_on_success = enabled;
        self
    }

    /// The default undo window.
    pub fn undo_delay(&self) -> Duration {
        Duration::from_millis(self.undo_delay_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), MutationError> {
        check_delay(self.undo_delay())?;
        if self.success_message.trim().is_empty() {
            return Err(MutationError::InvalidConfig(
                "success_message must not be empty".to_string(),
            ));
        }
        if self.error_message.trim().is_empty() {
            return Err(MutationError::InvalidConfig(
                "error_message must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check an undo window against [`MAX_UNDO_DELAY_MS`].
pub(crate) fn check_delay(delay: Duration) -> Result<(), MutationError> {
    if delay.as_millis() > u128::from(MAX_UNDO_DELAY_MS) {
        return Err(MutationError::InvalidDelay {
            delay_ms: delay.as_millis(),
            max_ms: MAX_UNDO_DELAY_MS,
        });
    }
    Ok(())
}
