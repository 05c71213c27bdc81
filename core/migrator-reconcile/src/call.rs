//! Runs blocking store calls off the async runtime, time-boxed.

use crate::cancel::CancelToken;
use crate::error::{ReconcileError, ReconcileResult};
use migrator_db::DbResult;
use std::time::Duration;

/// Runs `f` on the blocking pool and waits at most `timeout` for it.
///
/// A call that overruns keeps running on the blocking pool; only the
/// wait is abandoned.
pub(crate) async fn with_timeout<R, F>(timeout: Duration, f: F) -> ReconcileResult<R>
where
    F: FnOnce() -> DbResult<R> + Send + 'static,
    R: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Err(_) => Err(ReconcileError::Timeout),
        Ok(Err(join)) => Err(ReconcileError::Task(join.to_string())),
        Ok(Ok(out)) => Ok(out?),
    }
}

/// Like [`with_timeout`], but also gives up as soon as `cancel` fires.
pub(crate) async fn cancellable<R, F>(
    cancel: &CancelToken,
    timeout: Duration,
    f: F,
) -> ReconcileResult<R>
where
    F: FnOnce() -> DbResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(ReconcileError::Cancelled),
        res = with_timeout(timeout, f) => res,
    }
}
