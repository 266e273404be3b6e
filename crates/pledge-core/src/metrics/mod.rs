//! Metrics collection abstraction for the coordination primitives.
//!
//! Backends (prometheus, statsd, test recorders) implement [`MetricsBackend`] and are injected via [`crate::CoordContext`].
mod backend;
pub use backend::{MetricsBackend, MetricsHandle, TaskOutcome};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Bounded executor (`limit::run`, `filter`, `some`).
pub const PRIMITIVE_LIMIT: &str = "limit";
/// Serialized call coordinator.
pub const PRIMITIVE_SERIAL: &str = "serial";
/// Generation-tagging request serializer.
pub const PRIMITIVE_REQUEST: &str = "request";
/// Retry with validation.
pub const PRIMITIVE_RETRY: &str = "retry";
/// Timeout race.
pub const PRIMITIVE_TIMEOUT: &str = "timeout";

/// A call joined an already queued slot instead of creating one.
pub const EVENT_COALESCED: &str = "coalesced";
/// A call created the queued (next) slot.
pub const EVENT_SCHEDULED: &str = "scheduled";
/// A producer attempt was not accepted and another one follows.
pub const EVENT_RETRY: &str = "retry";
/// A dispatch loop stopped handing out new work before the input was exhausted.
pub const EVENT_DISPATCH_HALTED: &str = "dispatch_halted";
/// Work was left running in the background after its result stopped mattering.
pub const EVENT_ABANDONED: &str = "abandoned";
/// In-flight work was aborted through the cancellation token.
pub const EVENT_ABORTED: &str = "aborted";

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}

/// Milliseconds elapsed since `started`, saturating.
#[inline]
pub(crate) fn elapsed_ms(started: tokio::time::Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
