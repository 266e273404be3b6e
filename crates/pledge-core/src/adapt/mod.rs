//! Boundary helpers: callback adaptation, finalizers, sequential search and timers.
mod denodeify;
pub use denodeify::{NodeCallback, denodeify};

mod find;
pub use find::{async_find, async_find_map};

mod lastly;
pub use lastly::lastly;

use std::time::Duration;

/// Resolve after `ms` milliseconds.
pub async fn sleep(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Yield once to the scheduler so that already-woken tasks run before the caller resumes.
pub async fn next_tick() {
    tokio::task::yield_now().await;
}
