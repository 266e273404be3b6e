//! Bounded-parallelism execution over collections.
//!
//! [`Bounded`] runs a worker over every item with at most `limit` workers in flight and
//! returns results aligned to input position, whatever the completion order.
//!
//! Workers are spawned onto the tokio runtime. When the run ends early (first failure,
//! `some` hit) the remaining in-flight workers are detached, not stopped: they run to
//! completion and their results are discarded. Cancelling the [`CoordContext`] token is the
//! only way to abort them.
mod filter;
pub use filter::{filter, filter_keyed, some};

use std::{collections::HashMap, future::Future};

use futures::stream::{FuturesUnordered, StreamExt};
use pledge_model::ConcurrencyLimit;
use tokio::{task::AbortHandle, time::Instant};
use tracing::{debug, instrument, trace};

use crate::{
    context::CoordContext,
    error::LimitError,
    metrics::{
        EVENT_ABANDONED, EVENT_ABORTED, EVENT_DISPATCH_HALTED, PRIMITIVE_LIMIT, TaskOutcome,
        elapsed_ms,
    },
};

/// What the dispatch loop does after a worker result was visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Halt,
}

/// Bounded executor: a concurrency ceiling plus the context it reports to.
#[derive(Debug, Clone, Default)]
pub struct Bounded {
    limit: ConcurrencyLimit,
    ctx: CoordContext,
}

impl Bounded {
    pub fn new(limit: ConcurrencyLimit) -> Self {
        Self {
            limit,
            ctx: CoordContext::default(),
        }
    }

    /// Attach a coordination context (metrics, cancellation).
    pub fn with_context(mut self, ctx: CoordContext) -> Self {
        self.ctx = ctx;
        self
    }

    #[inline]
    pub fn limit(&self) -> ConcurrencyLimit {
        self.limit
    }

    /// Map every item through `worker`, keeping at most `limit` workers in flight.
    ///
    /// Output is positional. The first worker failure observed fails the whole run with that
    /// failure; workers already dispatched keep running in the background.
    pub async fn run<I, F, Fut, R, E>(&self, items: I, worker: F) -> Result<Vec<R>, LimitError<E>>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        let items: Vec<I::Item> = items.into_iter().collect();
        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();

        self.drive(items, worker, |index, value| {
            slots[index] = Some(value);
            Flow::Continue
        })
        .await?;

        Ok(slots.into_iter().flatten().collect())
    }

    /// Dispatch loop shared by every variant.
    ///
    /// `worker` is invoked synchronously at dispatch time, in input order; `visit` sees each
    /// successful result as it is observed and may halt further dispatch.
    /// The number of unjoined workers is the permit count: a permit is taken before a worker
    /// is spawned and handed back when its join handle resolves.
    #[instrument(level = "debug", name = "bounded", skip_all, fields(limit = %self.limit, items = items.len()))]
    pub(crate) async fn drive<T, F, Fut, R, E, V>(
        &self,
        items: Vec<T>,
        mut worker: F,
        mut visit: V,
    ) -> Result<Flow, LimitError<E>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        V: FnMut(usize, R) -> Flow,
    {
        let ceiling = self.limit.resolve(items.len());
        let metrics = self.ctx.metrics();
        let cancel = self.ctx.cancel();

        let mut queue = items.into_iter().enumerate().peekable();
        let mut in_flight = FuturesUnordered::new();
        let mut aborts: HashMap<usize, AbortHandle> = HashMap::new();

        loop {
            while in_flight.len() < ceiling {
                let Some((index, item)) = queue.next() else {
                    break;
                };
                let handle = tokio::spawn(worker(item));
                aborts.insert(index, handle.abort_handle());
                metrics.record_task_started(PRIMITIVE_LIMIT);

                let started = Instant::now();
                in_flight.push(async move { (index, started, handle.await) });
                trace!(index, in_flight = in_flight.len(), "worker dispatched");
            }

            if in_flight.is_empty() {
                return Ok(Flow::Continue);
            }

            let (index, started, joined) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(in_flight = aborts.len(), "canceled, aborting in-flight workers");
                    for (_, handle) in aborts.drain() {
                        handle.abort();
                    }
                    metrics.record_event(PRIMITIVE_LIMIT, EVENT_ABORTED);
                    return Err(LimitError::Canceled);
                }
                Some(done) = in_flight.next() => done,
            };
            aborts.remove(&index);
            let duration_ms = elapsed_ms(started);

            match joined {
                Ok(Ok(value)) => {
                    metrics.record_task_completed(PRIMITIVE_LIMIT, TaskOutcome::Success, duration_ms);
                    if visit(index, value) == Flow::Halt {
                        let pending = queue.peek().is_some();
                        debug!(index, pending, left_running = in_flight.len(), "dispatch halted");
                        if pending {
                            metrics.record_event(PRIMITIVE_LIMIT, EVENT_DISPATCH_HALTED);
                        }
                        abandon(metrics, in_flight.len());
                        return Ok(Flow::Halt);
                    }
                }
                Ok(Err(err)) => {
                    metrics.record_task_completed(PRIMITIVE_LIMIT, TaskOutcome::Failure, duration_ms);
                    debug!(index, left_running = in_flight.len(), "worker failed, run rejected");
                    abandon(metrics, in_flight.len());
                    return Err(LimitError::Worker(err));
                }
                Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
                Err(_) => {
                    // Aborted from outside, e.g. runtime shutdown.
                    metrics.record_task_completed(PRIMITIVE_LIMIT, TaskOutcome::Canceled, duration_ms);
                    return Err(LimitError::Canceled);
                }
            }
        }
    }
}

fn abandon(metrics: &crate::metrics::MetricsHandle, left_running: usize) {
    for _ in 0..left_running {
        metrics.record_event(PRIMITIVE_LIMIT, EVENT_ABANDONED);
    }
}

/// Map `items` through `worker` with at most `limit` workers in flight.
///
/// Shorthand for [`Bounded::run`] with a default context.
pub async fn run<I, F, Fut, R, E>(
    items: I,
    limit: ConcurrencyLimit,
    worker: F,
) -> Result<Vec<R>, LimitError<E>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    Bounded::new(limit).run(items, worker).await
}
