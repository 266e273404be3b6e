use std::{future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;
use tracing::warn;

/// Await `task`, then `finalizer()`, then return the task's outcome unchanged.
///
/// The finalizer runs whether the task returned or panicked. Its own output is discarded
/// and a panic inside it is logged and swallowed, so it never replaces the task's outcome.
/// A task panic is resumed after the finalizer ran.
pub async fn lastly<F, C, G>(task: F, finalizer: C) -> F::Output
where
    F: Future,
    C: FnOnce() -> G,
    G: Future,
{
    let outcome = AssertUnwindSafe(task).catch_unwind().await;

    let finalized = AssertUnwindSafe(async move {
        finalizer().await;
    })
    .catch_unwind()
    .await;
    if finalized.is_err() {
        warn!("finalizer panicked; keeping the task outcome");
    }

    match outcome {
        Ok(out) => out,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
