use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::metrics::MetricsHandle;

/// Shared coordination context passed to every primitive.
///
/// Carries the metrics backend and an optional abort signal. A fresh context never cancels,
/// so primitives keep their advisory semantics (timed-out or failed work keeps running)
/// unless the caller cancels the token explicitly.
#[derive(Clone)]
pub struct CoordContext {
    metrics: MetricsHandle,
    cancel: CancellationToken,
}

impl CoordContext {
    /// Create a new context with the given params.
    pub fn new(metrics: MetricsHandle, cancel: CancellationToken) -> Self {
        Self { metrics, cancel }
    }

    /// Get a clonable handle to the metrics backend.
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    /// Token that aborts in-flight work of primitives built from this context once cancelled.
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Replace the metrics backend and return updated context.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the cancellation token and return updated context.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Derive a context whose token is a child of this one.
    ///
    /// Cancelling the parent cancels the child; cancelling the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        Self {
            metrics: self.metrics.clone(),
            cancel: self.cancel.child_token(),
        }
    }
}

impl Default for CoordContext {
    fn default() -> Self {
        Self {
            metrics: crate::metrics::noop_metrics(),
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for CoordContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordContext")
            .field("canceled", &self.cancel.is_cancelled())
            .field("metrics", &"<handle>")
            .finish()
    }
}

impl fmt::Display for CoordContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoordContext(canceled={})", self.cancel.is_cancelled())
    }
}
