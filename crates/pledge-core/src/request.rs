//! Generation-based staleness detection.
//!
//! Every [`RequestSerializer::run`] takes the next generation number at call time. When the
//! task settles, its outcome is reported as current only if no higher generation has been
//! issued in the meantime; otherwise it is [`RequestOutcome::Outdated`], regardless of which
//! task settled first.
use std::{
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use futures::FutureExt;
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tracing::{debug, trace};

use crate::{
    context::CoordContext,
    metrics::{PRIMITIVE_REQUEST, TaskOutcome, elapsed_ms},
};

/// Tagged result of a serialized request. Never a failure by itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome<T, E> {
    /// The task succeeded and no newer request had been issued when it settled.
    Success(T),
    /// The task failed and no newer request had been issued when it settled.
    Error(E),
    /// A newer request was issued before this one settled; the result was discarded.
    Outdated,
}

impl<T, E> RequestOutcome<T, E> {
    /// Status label: `success`, `error` or `outdated`.
    pub fn status(&self) -> &'static str {
        match self {
            RequestOutcome::Success(_) => "success",
            RequestOutcome::Error(_) => "error",
            RequestOutcome::Outdated => "outdated",
        }
    }

    #[inline]
    pub fn is_outdated(&self) -> bool {
        matches!(self, RequestOutcome::Outdated)
    }

    /// The task's own result, or `None` if it was superseded.
    pub fn current(self) -> Option<Result<T, E>> {
        match self {
            RequestOutcome::Success(value) => Some(Ok(value)),
            RequestOutcome::Error(err) => Some(Err(err)),
            RequestOutcome::Outdated => None,
        }
    }
}

#[derive(Clone)]
struct Settled<T, E> {
    generation: u64,
    /// `None` when the task panicked.
    result: Option<Result<T, E>>,
}

struct Inner<T, E> {
    latest: AtomicU64,
    settled: watch::Sender<Option<Settled<T, E>>>,
}

impl<T, E> Inner<T, E>
where
    T: Clone,
    E: Clone,
{
    fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Classify a settled task and, when it is current, publish it to latest-result waiters.
    fn settle(&self, generation: u64, result: Result<T, E>) -> RequestOutcome<T, E> {
        let latest = self.latest();
        if generation < latest {
            debug!(generation, latest, "request outdated");
            return RequestOutcome::Outdated;
        }

        self.publish(generation, Some(result.clone()));

        match result {
            Ok(value) => RequestOutcome::Success(value),
            Err(err) => RequestOutcome::Error(err),
        }
    }

    /// Record that the task of `generation` panicked, so latest-result waiters do not hang.
    fn abandon(&self, generation: u64) {
        if generation >= self.latest() {
            self.publish(generation, None);
        }
    }

    fn publish(&self, generation: u64, result: Option<Result<T, E>>) {
        self.settled.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|s| s.generation > generation) {
                return false;
            }
            *slot = Some(Settled { generation, result });
            true
        });
    }
}

/// Issues generation-tagged requests and classifies their outcomes.
///
/// Cloning yields another handle to the same generation counter.
pub struct RequestSerializer<T, E> {
    inner: Arc<Inner<T, E>>,
    ctx: CoordContext,
}

impl<T, E> Clone for RequestSerializer<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ctx: self.ctx.clone(),
        }
    }
}

impl<T, E> Default for RequestSerializer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> RequestSerializer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (settled, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                latest: AtomicU64::new(0),
                settled,
            }),
            ctx: CoordContext::default(),
        }
    }

    /// Attach a coordination context (metrics).
    pub fn with_context(mut self, ctx: CoordContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Highest generation issued so far (`0` before the first run).
    pub fn latest_generation(&self) -> u64 {
        self.inner.latest()
    }

    /// Issue a request.
    ///
    /// The generation is taken synchronously, before this returns, so issuance order is call
    /// order. The task is spawned: it runs to completion even if the returned handle is
    /// dropped, and its outcome still feeds [`RequestSerializer::wait_for_latest_result`].
    pub fn run<F>(&self, task: F) -> RequestHandle<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let generation = self.inner.latest.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(generation, "request issued");

        let inner = Arc::clone(&self.inner);
        let metrics = self.ctx.metrics().clone();
        metrics.record_task_started(PRIMITIVE_REQUEST);
        let started = Instant::now();

        let handle = tokio::spawn(async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    inner.abandon(generation);
                    metrics.record_task_completed(PRIMITIVE_REQUEST, TaskOutcome::Failure, elapsed_ms(started));
                    std::panic::resume_unwind(payload);
                }
            };
            let outcome = inner.settle(generation, result);

            let label = match &outcome {
                RequestOutcome::Success(_) => TaskOutcome::Success,
                RequestOutcome::Error(_) => TaskOutcome::Failure,
                RequestOutcome::Outdated => TaskOutcome::Outdated,
            };
            metrics.record_task_completed(PRIMITIVE_REQUEST, label, elapsed_ms(started));
            outcome
        });

        RequestHandle { generation, handle }
    }

    /// Result of whichever request is the most recent at the time it settles.
    ///
    /// May be called before any request is issued. If a newer request is issued while
    /// waiting, the wait is redirected to it, repeating until a request settles as current.
    /// A current failure is returned as `Err`.
    ///
    /// # Panics
    ///
    /// Panics if the most recent request panicked; its payload stays with its [`RequestHandle`].
    pub async fn wait_for_latest_result(&self) -> Result<T, E> {
        let mut rx = self.inner.settled.subscribe();
        loop {
            {
                let slot = rx.borrow_and_update();
                if let Some(settled) = slot.as_ref() {
                    if settled.generation == self.inner.latest() {
                        match &settled.result {
                            Some(result) => return result.clone(),
                            None => panic!("request {} panicked", settled.generation),
                        }
                    }
                }
            }
            if rx.changed().await.is_err() {
                // The sender lives in `inner`, which outlives this borrow of `self`.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Handle to one issued request; resolves to its [`RequestOutcome`].
///
/// Dropping the handle detaches the request, it is not cancelled.
pub struct RequestHandle<T, E> {
    generation: u64,
    handle: JoinHandle<RequestOutcome<T, E>>,
}

impl<T, E> RequestHandle<T, E> {
    /// Generation number assigned to this request.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<T, E> Future for RequestHandle<T, E> {
    type Output = RequestOutcome<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(err)) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            // Task torn down by runtime shutdown; its result can never become current.
            Poll::Ready(Err(_)) => Poll::Ready(RequestOutcome::Outdated),
        }
    }
}
