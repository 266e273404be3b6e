use std::convert::Infallible;

use thiserror::Error;

/// Deadline of a timeout race fired before the raced task settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out after {duration_ms}ms")]
pub struct TimedOut {
    /// Configured duration of the race.
    pub duration_ms: u64,
}

impl TimedOut {
    pub const fn new(duration_ms: u64) -> Self {
        Self { duration_ms }
    }
}

/// Failure of a bounded execution (`limit::run`, `filter`, `filter_keyed`, `some`).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimitError<E> {
    /// First worker failure observed, unaltered.
    #[error("worker failed: {0}")]
    Worker(E),

    /// The context token was cancelled; in-flight workers were aborted.
    #[error("bounded execution canceled")]
    Canceled,
}

/// Failure observed by a caller bound to a serialized call slot.
///
/// Every caller bound to the same slot receives an identical copy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError<E> {
    /// The wrapped factory failed.
    #[error("serialized call failed: {0}")]
    Failed(E),

    /// The slot task panicked or was torn down before producing an outcome.
    #[error("serialized call slot terminated without an outcome")]
    Panicked,
}

/// Failure of a retry-with-validation run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The producer failed on the final attempt; its error is carried unaltered.
    #[error("producer failed: {0}")]
    Producer(E),

    /// Every attempt produced a value, none of which was accepted by the validator.
    #[error("no valid response found")]
    NoValidResponse {
        /// Number of producer invocations made.
        attempts: u32,
    },

    /// The context token was cancelled before an accepted value was produced.
    #[error("retry canceled")]
    Canceled,
}

/// Failure of a timeout race.
///
/// `E` is the raced task's own error when it is raced through `try_run`; plain `run` hands
/// the task output back untouched and never produces [`RaceError::Task`].
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RaceError<E = Infallible> {
    #[error(transparent)]
    TimedOut(#[from] TimedOut),

    /// The context token was cancelled; the raced task was aborted.
    #[error("race canceled")]
    Canceled,

    /// The task settled in time with an error; carried unaltered.
    #[error("task failed: {0}")]
    Task(E),
}

impl<E> RaceError<E> {
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, RaceError::TimedOut(_))
    }
}

/// Failure of a callback-style operation adapted into a future.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallbackError<E> {
    /// The callback was invoked with a non-null error.
    #[error("callback reported an error: {0}")]
    Failed(E),

    /// The callback was dropped without ever being invoked.
    #[error("callback dropped without being invoked")]
    Dropped,
}
