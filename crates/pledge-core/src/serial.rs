//! Leading + at-most-one-trailing coalescing of an async factory.
//!
//! [`SerializedCall`] wraps a zero-argument async factory. At any time it holds at most one
//! *pending* slot (an executing invocation) and one *next* slot (an invocation queued to run
//! after the pending one settles). Callers arriving while both exist share the next slot.
//!
//! Slots are spawned onto the runtime, so an invocation runs to completion even when every
//! caller bound to it drops its handle. Slot transitions happen under a per-instance mutex
//! that is never held across an await.
use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard},
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, trace};

use crate::{
    context::CoordContext,
    error::CallError,
    metrics::{EVENT_COALESCED, EVENT_SCHEDULED, PRIMITIVE_SERIAL, TaskOutcome, elapsed_ms},
};

/// Handle to a slot's single eventual outcome; cloned into every caller bound to the slot.
pub type SlotFuture<T, E> = Shared<BoxFuture<'static, Result<T, CallError<E>>>>;

type Factory<T, E> = dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync;

struct Slot<T, E> {
    id: u64,
    outcome: SlotFuture<T, E>,
}

impl<T, E> Clone for Slot<T, E>
where
    T: Clone,
    E: Clone,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            outcome: self.outcome.clone(),
        }
    }
}

struct Slots<T, E> {
    seq: u64,
    pending: Option<Slot<T, E>>,
    next: Option<Slot<T, E>>,
}

/// Coalescing wrapper around an async factory.
///
/// Cloning yields another handle to the same coordinator (shared slots).
pub struct SerializedCall<T, E> {
    factory: Arc<Factory<T, E>>,
    slots: Arc<Mutex<Slots<T, E>>>,
    ctx: CoordContext,
}

impl<T, E> Clone for SerializedCall<T, E> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            slots: Arc::clone(&self.slots),
            ctx: self.ctx.clone(),
        }
    }
}

impl<T, E> SerializedCall<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            factory: Arc::new(move || factory().boxed()),
            slots: Arc::new(Mutex::new(Slots {
                seq: 0,
                pending: None,
                next: None,
            })),
            ctx: CoordContext::default(),
        }
    }

    /// Attach a coordination context (metrics).
    ///
    /// The cancellation token is not consulted: slots are shared by many callers, so none of
    /// them may abort the invocation for the others.
    pub fn with_context(mut self, ctx: CoordContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Request an invocation.
    ///
    /// - nothing pending: the factory is invoked right away and the returned handle is bound
    ///   to that invocation;
    /// - pending but nothing queued: a queued invocation is created that starts once the
    ///   pending one settles;
    /// - pending and queued: the handle is bound to the already queued invocation.
    ///
    /// The factory is never invoked with the slot lock held, so it may call back into `call`.
    pub fn call(&self) -> SlotFuture<T, E> {
        let mut slots = lock(&self.slots);

        let Some(pending) = slots.pending.clone() else {
            let (slot, tx) = reserve(&mut slots);
            slots.pending = Some(slot.clone());
            drop(slots);

            trace!(slot = slot.id, "no pending call, starting immediately");
            // Armed before the factory runs: a panic in its synchronous part still frees the slot.
            let guard = self.settle_guard(slot.id);
            let work = (self.factory)();
            self.drive(slot.id, tx, guard, Start::Now(work));
            return slot.outcome;
        };

        if let Some(next) = &slots.next {
            trace!(slot = next.id, "joining queued call");
            self.ctx.metrics().record_event(PRIMITIVE_SERIAL, EVENT_COALESCED);
            return next.outcome.clone();
        }

        let (slot, tx) = reserve(&mut slots);
        slots.next = Some(slot.clone());
        drop(slots);

        trace!(slot = slot.id, after = pending.id, "queued behind pending call");
        self.ctx.metrics().record_event(PRIMITIVE_SERIAL, EVENT_SCHEDULED);
        let guard = self.settle_guard(slot.id);
        self.drive(slot.id, tx, guard, Start::After(pending.outcome));
        slot.outcome
    }

    /// `true` while an invocation is executing (or promoted and about to execute).
    pub fn is_pending(&self) -> bool {
        lock(&self.slots).pending.is_some()
    }

    /// `true` while an invocation is queued behind the pending one.
    pub fn has_next(&self) -> bool {
        lock(&self.slots).next.is_some()
    }

    fn settle_guard(&self, id: u64) -> SettleGuard<T, E> {
        SettleGuard {
            id,
            slots: Arc::clone(&self.slots),
        }
    }

    /// Spawn the task that drives slot `id` and reports its outcome through `tx`.
    ///
    /// A queued slot invokes the factory once `after` has settled, whatever its outcome.
    fn drive(
        &self,
        id: u64,
        tx: oneshot::Sender<Result<T, CallError<E>>>,
        guard: SettleGuard<T, E>,
        start: Start<T, E>,
    ) {
        let factory = Arc::clone(&self.factory);
        let metrics = self.ctx.metrics().clone();

        tokio::spawn(async move {
            let work = match start {
                Start::Now(work) => work,
                Start::After(previous) => {
                    let _ = previous.await;
                    trace!(slot = id, "previous call settled, starting queued call");
                    factory()
                }
            };

            metrics.record_task_started(PRIMITIVE_SERIAL);
            let started = Instant::now();
            let result = AssertUnwindSafe(work).catch_unwind().await;

            drop(guard);

            let (outcome, label) = match result {
                Ok(Ok(value)) => (Ok(value), TaskOutcome::Success),
                Ok(Err(err)) => (Err(CallError::Failed(err)), TaskOutcome::Failure),
                Err(_) => (Err(CallError::Panicked), TaskOutcome::Failure),
            };
            metrics.record_task_completed(PRIMITIVE_SERIAL, label, elapsed_ms(started));
            debug!(slot = id, outcome = label.as_label(), "serialized call settled");
            let _ = tx.send(outcome);
        });
    }
}

/// How a slot's invocation begins.
enum Start<T, E> {
    /// Factory already invoked by the leading caller.
    Now(BoxFuture<'static, Result<T, E>>),
    /// Invoke the factory after this slot settles.
    After(SlotFuture<T, E>),
}

/// Allocate the next slot id and the shared outcome its callers will await.
///
/// A sender dropped without reporting (the driving task never ran or was torn down)
/// settles the outcome as [`CallError::Panicked`].
fn reserve<T, E>(slots: &mut Slots<T, E>) -> (Slot<T, E>, oneshot::Sender<Result<T, CallError<E>>>)
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    slots.seq += 1;
    let (tx, rx) = oneshot::channel::<Result<T, CallError<E>>>();
    let outcome = async move { rx.await.unwrap_or(Err(CallError::Panicked)) }
        .boxed()
        .shared();
    (
        Slot {
            id: slots.seq,
            outcome,
        },
        tx,
    )
}

/// Releases the pending position of slot `id` when dropped.
///
/// Runs on the normal path and when the slot task is torn down, so a failed or panicked
/// invocation never leaves the coordinator stuck.
struct SettleGuard<T, E> {
    id: u64,
    slots: Arc<Mutex<Slots<T, E>>>,
}

impl<T, E> Drop for SettleGuard<T, E> {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        if slots.pending.as_ref().map(|s| s.id) == Some(self.id) {
            // Promote the queued slot in the same critical section so no caller can observe
            // "nothing pending" while a queued invocation is about to start.
            slots.pending = slots.next.take();
        }
    }
}

fn lock<T, E>(slots: &Mutex<Slots<T, E>>) -> MutexGuard<'_, Slots<T, E>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            OnceLock,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;
    use crate::metrics::recorder::RecordingMetrics;

    fn counting_call(delay_ms: u64) -> (SerializedCall<usize, String>, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let call = SerializedCall::new(move || {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(n)
            }
        });
        (call, counter)
    }

    #[tokio::test(start_paused = true)]
    async fn returns_the_same_result_when_called_after_scheduled() {
        let (call, invocations) = counting_call(10);

        let first = call.call();
        let second = call.call();
        let third = call.call();

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert!(call.is_pending());
        assert!(call.has_next());

        let results = futures::future::join_all([first, second, third]).await;
        let results: Vec<usize> = results.into_iter().map(Result::unwrap).collect();

        assert_eq!(results, vec![1, 2, 2]);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
        assert!(!call.is_pending());
        assert!(!call.has_next());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_poison_later_calls() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let call = SerializedCall::new(move || {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 4 {
                    return Err("ERROR".to_string());
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(n)
            }
        });

        let r1 = call.call().await;
        let r2 = call.call().await;
        let r3 = call.call().await;
        let r4 = call.call().await;
        let r5 = call.call().await;

        assert_eq!(r4, Err(CallError::Failed("ERROR".to_string())));
        assert_eq!(
            [r1, r2, r3, r5].map(Result::unwrap),
            [1, 2, 3, 5],
            "every serial call runs exactly once"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_failing_slot_reaches_every_bound_caller() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let call: SerializedCall<usize, String> = SerializedCall::new(move || {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if n == 2 { Err(format!("failed #{n}")) } else { Ok(n) }
            }
        });

        let first = call.call();
        let second = call.call();
        let third = call.call();

        assert_eq!(first.await, Ok(1));
        let expected = Err(CallError::Failed("failed #2".to_string()));
        assert_eq!(second.await, expected);
        assert_eq!(third.await, expected);

        assert_eq!(call.call().await, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn slot_runs_even_if_nobody_awaits_it() {
        let (call, invocations) = counting_call(10);

        drop(call.call());
        drop(call.call());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
        assert!(!call.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn call_after_settlement_starts_fresh() {
        let (call, invocations) = counting_call(10);

        assert_eq!(call.call().await, Ok(1));
        assert_eq!(call.call().await, Ok(2));
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_factory_reports_to_callers_and_releases_the_slot() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let call: SerializedCall<usize, String> = SerializedCall::new(move || {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 1 {
                    panic!("factory blew up");
                }
                Ok(n)
            }
        });

        assert_eq!(call.call().await, Err(CallError::Panicked));
        assert!(!call.is_pending());
        assert_eq!(call.call().await, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_slots() {
        let (call, invocations) = counting_call(10);
        let other = call.clone();

        let a = call.call();
        let b = other.call();
        let c = other.call();

        assert_eq!((a.await, b.await, c.await), (Ok(1), Ok(2), Ok(2)));
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn records_scheduling_decisions() {
        let recorder = Arc::new(RecordingMetrics::default());
        let (call, _) = counting_call(10);
        let call = call.with_context(CoordContext::default().with_metrics(recorder.clone()));

        let handles = [call.call(), call.call(), call.call(), call.call()];
        futures::future::join_all(handles).await;

        assert_eq!(recorder.count("serial:scheduled"), 1);
        assert_eq!(recorder.count("serial:coalesced"), 2);
        assert_eq!(recorder.count("serial:started"), 2);
        assert_eq!(recorder.count("serial:success"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn factory_may_call_back_into_the_coordinator() {
        let me: Arc<OnceLock<SerializedCall<usize, String>>> = Arc::new(OnceLock::new());
        let inner: Arc<Mutex<Option<SlotFuture<usize, String>>>> = Arc::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let call = {
            let me = me.clone();
            let inner = inner.clone();
            let seen = counter.clone();
            SerializedCall::new(move || {
                let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 {
                    if let Some(me) = me.get() {
                        *inner.lock().unwrap() = Some(me.call());
                    }
                }
                async move { Ok(n) }
            })
        };
        assert!(me.set(call.clone()).is_ok());

        let outer = tokio::time::timeout(Duration::from_secs(1), call.call())
            .await
            .expect("leading call settles");
        assert_eq!(outer, Ok(1));

        let queued = inner.lock().unwrap().take().expect("factory queued a call");
        assert_eq!(queued.await, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(!call.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn synchronous_factory_panic_releases_the_slot() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let call: SerializedCall<usize, String> = SerializedCall::new(move || {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                panic!("factory blew up before returning a future");
            }
            async move { Ok(n) }
        });

        let first = std::panic::catch_unwind(AssertUnwindSafe(|| call.call()));
        assert!(first.is_err());
        assert!(!call.is_pending());
        assert_eq!(call.call().await, Ok(2));
    }
}
