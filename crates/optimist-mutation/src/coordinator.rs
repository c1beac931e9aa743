//! Batch-mutation coordinator.
//!
//! Each submission runs `Staging -> Committing -> Settled`. Staging happens
//! synchronously inside [`Coordinator::submit`], so the cache reflects the
//! optimistic patch before control returns. The rest runs on a spawned task
//! whose result the returned [`Submission`] resolves to.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use optimist_cache::{CacheStore, Patch, RecordId};

use crate::config::check_delay;
use crate::{
    BatchResult, CancelScheduler, CancelToken, CancellationRegistry, CoordinatorConfig,
    MutationError, MutationMode, MutationRequest, NotificationSink, Notifier, NullSink, Phase,
    RemoteExecutor, Snapshot, SubmissionId, TokenState, patcher, reconciler, snapshot,
};

/// Coordinates optimistic batch mutations against a shared cache.
///
/// Cheaply cloneable; clones share collaborators and the in-flight count.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    cache: Arc<dyn CacheStore>,
    executor: Arc<dyn RemoteExecutor>,
    notifier: Notifier,
    registry: Option<Arc<dyn CancellationRegistry>>,
    config: CoordinatorConfig,
    in_flight: Arc<AtomicUsize>,
}

/// One staged batch, owned by its settle task.
struct PendingMutation {
    id: SubmissionId,
    resource: String,
    ids: Vec<RecordId>,
    values: Patch,
    mode: MutationMode,
}

/// Builder for a [`Coordinator`].
pub struct CoordinatorBuilder {
    cache: Arc<dyn CacheStore>,
    executor: Arc<dyn RemoteExecutor>,
    sink: Arc<dyn NotificationSink>,
    registry: Option<Arc<dyn CancellationRegistry>>,
    config: CoordinatorConfig,
}

impl CoordinatorBuilder {
    /// Set the notification sink. Defaults to dropping notifications.
    pub fn notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Hand undo windows to a cancellation registry instead of the
    /// coordinator's own timers.
    pub fn registry(mut self, registry: Arc<dyn CancellationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and build the coordinator.
    pub fn build(self) -> Result<Coordinator, MutationError> {
        self.config.validate()?;
        let notifier = Notifier::new(self.sink, &self.config);
        Ok(Coordinator {
            inner: Arc::new(Inner {
                cache: self.cache,
                executor: self.executor,
                notifier,
                registry: self.registry,
                config: self.config,
                in_flight: Arc::new(AtomicUsize::new(0)),
            }),
        })
    }
}

impl Coordinator {
    /// Start building a coordinator over a cache and a remote executor.
    pub fn builder(
        cache: Arc<dyn CacheStore>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            cache,
            executor,
            sink: Arc::new(NullSink),
            registry: None,
            config: CoordinatorConfig::default(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Number of submissions not yet settled.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Stage a batch mutation and start committing it.
    ///
    /// Rejects empty id sets and out-of-range undo windows before touching
    /// the cache. On return, optimistic and undoable batches are already
    /// visible in the cache. Must be called from within a tokio runtime.
    pub fn submit(&self, request: MutationRequest) -> Result<Submission, MutationError> {
        let MutationRequest {
            resource,
            ids,
            values,
            mode,
            delay,
        } = request;

        let ids = dedup_ids(ids);
        if ids.is_empty() {
            debug!(resource = %resource, "rejecting batch without ids");
            return Err(MutationError::NoOpSubmission);
        }
        let delay = match mode {
            MutationMode::Undoable => {
                let delay = delay.unwrap_or_else(|| self.inner.config.undo_delay());
                check_delay(delay)?;
                Some(delay)
            }
            _ => None,
        };

        let pending = PendingMutation {
            id: SubmissionId::new(),
            resource,
            ids,
            values,
            mode,
        };
        let span = info_span!(
            "submission",
            id = %pending.id,
            resource = %pending.resource,
            mode = %pending.mode,
            count = pending.ids.len(),
        );
        let _entered = span.enter();

        let (phase_tx, phase_rx) = watch::channel(Phase::Staging);
        let cache = self.inner.cache.as_ref();

        let snapshot = if mode.patches_early() {
            let snapshot = snapshot::capture(cache, &pending.resource, &pending.ids);
            patcher::apply(cache, &snapshot, &pending.ids, &pending.values);
            debug!(entries = snapshot.len(), "staged optimistic patch");
            Some(snapshot)
        } else {
            None
        };

        let token = delay.map(|delay| match &self.inner.registry {
            Some(registry) => {
                let token = CancelToken::new();
                registry.register_cancellable(&pending.resource, &pending.ids, token.clone(), delay);
                debug!(delay_ms = delay.as_millis() as u64, "undo window handed to registry");
                token
            }
            None => {
                debug!(delay_ms = delay.as_millis() as u64, "undo window armed");
                CancelScheduler::arm(delay)
            }
        });

        phase_tx.send_replace(Phase::Committing);
        let guard = InFlight::enter(&self.inner.in_flight);
        let id = pending.id;
        let inner = Arc::clone(&self.inner);
        let task_token = token.clone();
        let task = tokio::spawn(
            async move {
                let outcome = inner.commit(&pending, task_token.as_ref()).await;
                inner.settle(&pending, snapshot, task_token.as_ref(), &outcome);
                phase_tx.send_replace(Phase::Settled);
                drop(guard);
                outcome
            }
            .instrument(span.clone()),
        );

        Ok(Submission {
            id,
            token,
            phase: phase_rx,
            task,
        })
    }

    /// Submit a batch and wait for it to settle.
    #[tracing::instrument(skip(self, request), fields(resource = %request.resource, mode = %request.mode))]
    pub async fn submit_and_wait(&self, request: MutationRequest) -> BatchResult {
        self.submit(request)?.await
    }
}

impl Inner {
    /// Wait out the undo window, if any, then run the remote call.
    async fn commit(&self, pending: &PendingMutation, token: Option<&CancelToken>) -> BatchResult {
        if let Some(token) = token {
            match token.resolved().await {
                TokenState::Fired => debug!("undo window closed, committing"),
                _ => {
                    debug!("undo window cancelled, skipping remote call");
                    return Err(MutationError::cancelled());
                }
            }
        }

        // Own task, so a panicking executor still settles through the failure path
        let executor = Arc::clone(&self.executor);
        let (resource, ids, values) = (
            pending.resource.clone(),
            pending.ids.clone(),
            pending.values.clone(),
        );
        let call = tokio::spawn(
            async move { executor.update_many(&resource, &ids, &values).await }.in_current_span(),
        );
        match call.await {
            Ok(result) => result.map_err(MutationError::from),
            Err(e) => Err(MutationError::Aborted(e.to_string())),
        }
    }

    /// Reconcile the outcome into the cache and notify.
    fn settle(
        &self,
        pending: &PendingMutation,
        snapshot: Option<Snapshot>,
        token: Option<&CancelToken>,
        outcome: &BatchResult,
    ) {
        let cache = self.cache.as_ref();
        let undoable = token.is_some();

        match outcome {
            Ok(_) => {
                match snapshot {
                    Some(snapshot) => reconciler::on_success(cache, snapshot),
                    None => reconciler::invalidate_matching(cache, &pending.resource, &pending.ids),
                }
                self.notifier
                    .success(&pending.resource, &pending.ids, undoable);
                info!("batch committed");
            }
            Err(err) if err.is_cancelled() => {
                if let Some(snapshot) = snapshot {
                    reconciler::on_cancel(cache, snapshot);
                }
                info!("batch cancelled");
            }
            Err(err) => {
                if let Some(snapshot) = snapshot {
                    reconciler::on_failure(cache, snapshot);
                }
                self.notifier
                    .error(&pending.resource, &pending.ids, undoable, err);
                warn!(error = %err, "batch failed, cache restored");
            }
        }

        if let Some(token) = token
            && let Some(registry) = &self.registry
        {
            registry.remove(&pending.resource, &pending.ids, token);
        }
    }
}

/// A staged submission.
///
/// Await it (it implements [`IntoFuture`]) for the outcome. Dropping it
/// does not abandon the batch; it still settles in the background.
pub struct Submission {
    id: SubmissionId,
    token: Option<CancelToken>,
    phase: watch::Receiver<Phase>,
    task: JoinHandle<BatchResult>,
}

impl Submission {
    /// Submission id, as recorded in tracing spans.
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    /// Cancel token of an undoable submission.
    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.token.as_ref()
    }

    /// Cancel the undo window.
    ///
    /// Returns `true` if this call prevented the remote call. Always `false`
    /// for non-undoable submissions.
    pub fn cancel(&self) -> bool {
        self.token.as_ref().is_some_and(CancelToken::cancel)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch lifecycle phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Wait for the outcome.
    pub async fn outcome(self) -> BatchResult {
        self.await
    }
}

impl IntoFuture for Submission {
    type Output = BatchResult;
    type IntoFuture = Pin<Box<dyn Future<Output = BatchResult> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            match self.task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(MutationError::Aborted(e.to_string())),
            }
        })
    }
}

/// Keeps the in-flight count accurate even if a settle task is aborted.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Remove duplicate ids, keeping first occurrences in order.
fn dedup_ids(ids: Vec<RecordId>) -> Vec<RecordId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
