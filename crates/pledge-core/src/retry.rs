//! Bounded retry with result validation.
use std::future::Future;

use pledge_model::RetryPolicy;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

use crate::{
    context::CoordContext,
    error::RetryError,
    metrics::{EVENT_RETRY, PRIMITIVE_RETRY, TaskOutcome, elapsed_ms},
};

/// Retry controller: a [`RetryPolicy`] plus the context it reports to.
#[derive(Debug, Clone, Default)]
pub struct Retry {
    policy: RetryPolicy,
    ctx: CoordContext,
}

impl Retry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ctx: CoordContext::default(),
        }
    }

    /// Attach a coordination context (metrics, cancellation).
    pub fn with_context(mut self, ctx: CoordContext) -> Self {
        self.ctx = ctx;
        self
    }

    #[inline]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `producer` until `validator` accepts a value or the attempt limit is reached.
    ///
    /// Per attempt:
    /// - producer fails: on the final attempt its error is returned as [`RetryError::Producer`],
    ///   otherwise the next attempt follows (the validator is not consulted);
    /// - producer succeeds: the validator is called once; an accepted value is returned at once,
    ///   a rejected one on the final attempt yields [`RetryError::NoValidResponse`].
    ///
    /// The backoff delay is slept between attempts, never after the last one.
    #[instrument(level = "debug", name = "retry", skip_all, fields(limit = self.policy.limit()))]
    pub async fn run<F, Fut, T, E, V>(&self, mut producer: F, mut validator: V) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        V: FnMut(&T) -> bool,
    {
        let limit = self.policy.limit();
        let metrics = self.ctx.metrics();
        let cancel = self.ctx.cancel();

        for attempt in 1..=limit {
            if cancel.is_cancelled() {
                return Err(RetryError::Canceled);
            }
            let last = attempt == limit;

            metrics.record_task_started(PRIMITIVE_RETRY);
            let started = Instant::now();
            let produced = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    metrics.record_task_completed(PRIMITIVE_RETRY, TaskOutcome::Canceled, elapsed_ms(started));
                    return Err(RetryError::Canceled);
                }
                produced = producer() => produced,
            };

            match produced {
                Ok(value) => {
                    if validator(&value) {
                        metrics.record_task_completed(PRIMITIVE_RETRY, TaskOutcome::Success, elapsed_ms(started));
                        trace!(attempt, "value accepted");
                        return Ok(value);
                    }
                    metrics.record_task_completed(PRIMITIVE_RETRY, TaskOutcome::Rejected, elapsed_ms(started));
                    if last {
                        debug!(attempts = attempt, "no attempt produced an accepted value");
                        return Err(RetryError::NoValidResponse { attempts: attempt });
                    }
                    trace!(attempt, "value rejected by validator");
                }
                Err(err) => {
                    metrics.record_task_completed(PRIMITIVE_RETRY, TaskOutcome::Failure, elapsed_ms(started));
                    if last {
                        debug!(attempts = attempt, "producer failed on the final attempt");
                        return Err(RetryError::Producer(err));
                    }
                    trace!(attempt, "producer failed");
                }
            }

            metrics.record_event(PRIMITIVE_RETRY, EVENT_RETRY);
            let delay = self.policy.backoff().delay_after(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Canceled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        // `RetryPolicy` guarantees `limit >= 1`, so the loop always returns.
        Err(RetryError::NoValidResponse { attempts: limit })
    }
}

/// Retry `producer` up to `limit` times without delay until `validator` accepts a value.
///
/// Shorthand for [`Retry::run`] with a default context; `limit == 0` is treated as `1`.
pub async fn retry_limit<F, Fut, T, E, V>(producer: F, validator: V, limit: u32) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    V: FnMut(&T) -> bool,
{
    let policy = RetryPolicy::new(limit.max(1)).unwrap_or_default();
    Retry::new(policy).run(producer, validator).await
}
