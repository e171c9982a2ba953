//! Cancellation-aware suspension points.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Drive `fut` unless `token` fires first.
///
/// Returns `None` when cancelled; cancellation wins if both are ready.
pub(crate) async fn unless_cancelled<F: Future>(
    token: &CancellationToken,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = token.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Sleep for `duration`; returns `false` if cancelled before it elapsed.
pub(crate) async fn pause(token: &CancellationToken, duration: Duration) -> bool {
    unless_cancelled(token, tokio::time::sleep(duration))
        .await
        .is_some()
}
