//! Remote update executor boundary.

use std::future::Future;

use async_trait::async_trait;

use optimist_cache::{Patch, RecordId};

use crate::{BatchOutcome, RemoteFailure};

/// Performs the actual batch write against the remote source.
///
/// Errors and successes are passed to the reconciler unchanged; retry
/// policy, if any, belongs to the implementation.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Apply `values` to every record in `ids` of `resource`.
    async fn update_many(
        &self,
        resource: &str,
        ids: &[RecordId],
        values: &Patch,
    ) -> Result<BatchOutcome, RemoteFailure>;
}

/// Executor backed by a closure.
pub struct FnExecutor<F> {
    f: F,
}

/// Wrap a closure returning a future as a [`RemoteExecutor`].
pub fn from_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(String, Vec<RecordId>, Patch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<BatchOutcome, RemoteFailure>> + Send + 'static,
{
    FnExecutor { f }
}

#[async_trait]
impl<F, Fut> RemoteExecutor for FnExecutor<F>
where
    F: Fn(String, Vec<RecordId>, Patch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<BatchOutcome, RemoteFailure>> + Send + 'static,
{
    async fn update_many(
        &self,
        resource: &str,
        ids: &[RecordId],
        values: &Patch,
    ) -> Result<BatchOutcome, RemoteFailure> {
        (self.f)(resource.to_string(), ids.to_vec(), values.clone()).await
    }
}
