//! Undo window scheduling.
//!
//! An undoable submission holds its remote call behind a [`CancelToken`].
//! The token is a single-use state machine, `Armed -> Fired` or
//! `Armed -> Cancelled`, stored in a watch channel so the transition is a
//! compare-and-set and observers can await it without polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, trace};

/// State of a [`CancelToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Waiting for the window to elapse or be cancelled.
    Armed,
    /// The window elapsed, the remote call may run.
    Fired,
    /// The window was cancelled, the remote call will never run.
    Cancelled,
}

impl TokenState {
    /// Whether the token has left `Armed`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TokenState::Armed)
    }
}

/// Single-use handle deciding whether a held remote call runs.
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<TokenState>>,
}

impl CancelToken {
    /// Create an armed token with no timer attached.
    ///
    /// The owner of the undo window resolves it with [`CancelToken::fire`]
    /// or [`CancelToken::cancel`].
    pub fn new() -> Self {
        let (state, _) = watch::channel(TokenState::Armed);
        Self {
            state: Arc::new(state),
        }
    }

    /// Current state.
    pub fn state(&self) -> TokenState {
        *self.state.borrow()
    }

    /// Transition `Armed -> Fired`.
    ///
    /// Returns `false` if the token was already fired or cancelled.
    pub fn fire(&self) -> bool {
        self.transition(TokenState::Fired)
    }

    /// Transition `Armed -> Cancelled`.
    ///
    /// Returns `true` only for the call that observed `Armed`; once that
    /// happens the remote call can never run. Later calls, and calls after
    /// the token fired, are no-ops returning `false`.
    pub fn cancel(&self) -> bool {
        self.transition(TokenState::Cancelled)
    }

    fn transition(&self, to: TokenState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == TokenState::Armed {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            trace!(state = ?to, "cancel token resolved");
        }
        changed
    }

    /// Watch the token state, e.g. to drive an undo countdown.
    pub fn subscribe(&self) -> watch::Receiver<TokenState> {
        self.state.subscribe()
    }

    /// Wait until the token leaves `Armed` and return its final state.
    pub async fn resolved(&self) -> TokenState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // The sender lives as long as `self`, so this is unreachable in
            // practice; report whatever the state is.
            Err(_) => self.state(),
        }
    }

    /// Whether two handles share the same token.
    pub fn same_token(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Arms undo windows backed by tokio timers.
pub struct CancelScheduler;

impl CancelScheduler {
    /// Arm a token that fires after `delay` unless cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(delay: Duration) -> CancelToken {
        let token = CancelToken::new();
        Self::start_timer(token.clone(), delay);
        token
    }

    /// Fire `token` after `delay`, stopping early if it resolves first.
    pub fn start_timer(token: CancelToken, delay: Duration) {
        tokio::spawn(async move {
            let mut rx = token.subscribe();
            tokio::select! {
                _ = sleep(delay) => {
                    if token.fire() {
                        debug!(delay_ms = delay.as_millis() as u64, "undo window elapsed");
                    }
                }
                _ = rx.wait_for(|state| state.is_terminal()) => {
                    trace!("undo timer stopped, token already resolved");
                }
            }
        });
    }
}
