use std::sync::Arc;

/// Outcome of one unit of coordinated work, for metrics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Work completed successfully (and was accepted, where validation applies).
    Success,
    /// Work failed with a user error.
    Failure,
    /// Work was aborted through the coordination context.
    Canceled,
    /// A deadline fired before the work settled.
    Timeout,
    /// Work settled after a newer request had been issued.
    Outdated,
    /// Work produced a value the validator did not accept.
    Rejected,
}

impl TaskOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskOutcome::Success => "success",
            TaskOutcome::Failure => "failure",
            TaskOutcome::Canceled => "canceled",
            TaskOutcome::Timeout => "timeout",
            TaskOutcome::Outdated => "outdated",
            TaskOutcome::Rejected => "rejected",
        }
    }
}

/// Backend metrics collection interface.
///
/// Implementations are injected via [`crate::CoordContext`] and shared by every primitive
/// built from that context.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record that a primitive started a unit of work (a worker, an attempt, a slot, a run).
    ///
    /// # Arguments
    /// - `primitive`: one of the `PRIMITIVE_*` labels
    fn record_task_started(&self, primitive: &str);
    /// Record completion of a unit of work with outcome and duration.
    ///
    /// # Arguments
    /// - `primitive`: one of the `PRIMITIVE_*` labels
    /// - `outcome`: how the work settled
    /// - `duration_ms`: time from start to settlement in milliseconds
    fn record_task_completed(&self, primitive: &str, outcome: TaskOutcome, duration_ms: u64);
    /// Record a coordination decision that is not itself a unit of work.
    ///
    /// Examples: a call coalesced into a queued slot, a dispatch loop halted early,
    /// in-flight work left running after the caller stopped waiting.
    ///
    /// # Arguments
    /// - `primitive`: one of the `PRIMITIVE_*` labels
    /// - `event`: one of the `EVENT_*` labels
    fn record_event(&self, primitive: &str, event: &str);
}

/// Shared handle to metrics backend.
///
/// Stored in [`crate::CoordContext`] and cloned into each primitive.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
