//! Racing a task against a deadline.
//!
//! The raced task is spawned; when the deadline wins, the task is detached and keeps running
//! to completion. Whichever side settles first drops the other, so the timer never fires
//! after settlement.
use std::{future::Future, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, trace};

use crate::{
    context::CoordContext,
    error::{RaceError, TimedOut},
    metrics::{EVENT_ABANDONED, EVENT_ABORTED, PRIMITIVE_TIMEOUT, TaskOutcome, elapsed_ms},
};

/// Timeout race: a duration plus the context it reports to.
#[derive(Debug, Clone)]
pub struct TimeoutRace {
    duration: Duration,
    ctx: CoordContext,
}

impl TimeoutRace {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ctx: CoordContext::default(),
        }
    }

    /// Race for `ms` milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Attach a coordination context (metrics, cancellation).
    pub fn with_context(mut self, ctx: CoordContext) -> Self {
        self.ctx = ctx;
        self
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Settle as `task` does if it settles within the duration, otherwise fail with
    /// [`RaceError::TimedOut`] carrying the configured duration.
    pub async fn run<F>(&self, task: F) -> Result<F::Output, RaceError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let deadline = Instant::now() + self.duration;
        race(tokio::spawn(task), deadline, duration_ms(self.duration), &self.ctx).await
    }

    /// Like [`run`](Self::run) for fallible tasks: a task error comes back as
    /// [`RaceError::Task`] instead of inside `Ok`.
    pub async fn try_run<F, T, E>(&self, task: F) -> Result<T, RaceError<E>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let deadline = Instant::now() + self.duration;
        race(tokio::spawn(task), deadline, duration_ms(self.duration), &self.ctx)
            .await
            .and_then(|out| out.map_err(RaceError::Task))
    }
}

async fn race<T, E>(
    mut handle: JoinHandle<T>,
    deadline: Instant,
    duration_ms: u64,
    ctx: &CoordContext,
) -> Result<T, RaceError<E>> {
    let metrics = ctx.metrics();
    metrics.record_task_started(PRIMITIVE_TIMEOUT);
    let started = Instant::now();

    tokio::select! {
        biased;
        joined = &mut handle => {
            let outcome = match &joined {
                Ok(_) => TaskOutcome::Success,
                Err(_) => TaskOutcome::Canceled,
            };
            metrics.record_task_completed(PRIMITIVE_TIMEOUT, outcome, elapsed_ms(started));
            match joined {
                Ok(value) => Ok(value),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => Err(RaceError::Canceled),
            }
        }
        _ = sleep_until(deadline) => {
            debug!(duration_ms, "deadline reached, task left running");
            metrics.record_task_completed(PRIMITIVE_TIMEOUT, TaskOutcome::Timeout, elapsed_ms(started));
            metrics.record_event(PRIMITIVE_TIMEOUT, EVENT_ABANDONED);
            Err(TimedOut::new(duration_ms).into())
        }
        _ = ctx.cancel().cancelled() => {
            trace!("race canceled, aborting task");
            handle.abort();
            metrics.record_task_completed(PRIMITIVE_TIMEOUT, TaskOutcome::Canceled, elapsed_ms(started));
            metrics.record_event(PRIMITIVE_TIMEOUT, EVENT_ABORTED);
            Err(RaceError::Canceled)
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Race `task` against `duration`. Shorthand for [`TimeoutRace::run`] with a default context.
pub async fn with_timeout<F>(task: F, duration: Duration) -> Result<F::Output, RaceError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    TimeoutRace::new(duration).run(task).await
}

/// Race a fallible `task` against `duration`. Shorthand for [`TimeoutRace::try_run`].
pub async fn try_with_timeout<F, T, E>(task: F, duration: Duration) -> Result<T, RaceError<E>>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    TimeoutRace::new(duration).try_run(task).await
}

/// Race `task` against an absolute deadline.
///
/// A deadline already in the past yields `TimedOut { duration_ms: 0 }` unless the task is
/// immediately ready.
pub async fn with_deadline<F>(task: F, deadline: Instant) -> Result<F::Output, RaceError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let remaining = deadline.saturating_duration_since(Instant::now());
    race(
        tokio::spawn(task),
        deadline,
        duration_ms(remaining),
        &CoordContext::default(),
    )
    .await
}

/// Await `task`, calling `on_slow` if it has not settled after `wait`.
///
/// Unlike [`with_timeout`] the task is never failed; the caller always receives its output.
/// `on_settled` runs after the task settles, and only if `on_slow` was called, so it can undo
/// whatever `on_slow` did (e.g. hide a "still working" indicator).
pub async fn trigger_after_wait<F, S, C>(task: F, wait: Duration, on_slow: S, on_settled: C) -> F::Output
where
    F: Future,
    S: FnOnce(),
    C: FnOnce(),
{
    tokio::pin!(task);
    let timer = tokio::time::sleep(wait);

    tokio::select! {
        biased;
        out = &mut task => return out,
        _ = timer => {}
    }

    trace!(wait_ms = duration_ms(wait), "task is slow");
    on_slow();
    let out = task.await;
    on_settled();
    out
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::metrics::recorder::RecordingMetrics;

    #[tokio::test]
    async fn resolves_normally_within_the_timeout() {
        let out = with_timeout(async { "foo" }, Duration::from_millis(1_000)).await;
        assert_eq!(out, Ok("foo"));
    }

    #[tokio::test]
    async fn task_failure_passes_through() {
        let out = with_timeout(async { Err::<(), _>("foo") }, Duration::from_millis(1_000)).await;
        assert_eq!(out, Ok(Err("foo")));
    }

    #[tokio::test]
    async fn fallible_task_failure_is_reported_as_a_task_error() {
        let out = try_with_timeout(async { Err::<(), _>("foo") }, Duration::from_millis(1_000)).await;
        assert_eq!(out, Err(RaceError::Task("foo")));
    }

    #[tokio::test]
    async fn fallible_task_success_is_unwrapped() {
        let out = try_with_timeout(async { Ok::<_, &str>(7) }, Duration::from_millis(1_000)).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn fallible_task_still_times_out() {
        let out = try_with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(2_000)).await;
                Ok::<_, &str>(())
            },
            Duration::from_millis(1_000),
        )
        .await;
        assert_eq!(out, Err(RaceError::TimedOut(TimedOut::new(1_000))));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_the_task_takes_too_long() {
        let started = Instant::now();
        let task = async {
            tokio::time::sleep(Duration::from_millis(2_000)).await;
            "late"
        };

        let out = with_timeout(task, Duration::from_millis(1_000)).await;

        assert_eq!(out, Err(RaceError::TimedOut(TimedOut::new(1_000))));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1_000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2_000), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_task_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let out = with_timeout(
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                flag.store(true, Ordering::SeqCst);
            },
            Duration::from_millis(100),
        )
        .await;
        assert!(out.unwrap_err().is_timeout());
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_context_aborts_the_task() {
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let race = TimeoutRace::from_millis(1_000)
            .with_context(CoordContext::default().with_cancel(token.clone()));
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let out = race
            .run(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                flag.store(true, Ordering::SeqCst);
            })
            .await;

        assert_eq!(out, Err(RaceError::Canceled));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn settles_exactly_once_per_path() {
        let recorder = Arc::new(RecordingMetrics::default());
        let race = TimeoutRace::from_millis(50)
            .with_context(CoordContext::default().with_metrics(recorder.clone()));

        race.run(async {}).await.unwrap();
        race.run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap_err();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            recorder.lines(),
            vec![
                "timeout:started",
                "timeout:success",
                "timeout:started",
                "timeout:timeout",
                "timeout:abandoned",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_in_the_past_times_out_with_zero() {
        let deadline = Instant::now();
        tokio::time::advance(Duration::from_millis(10)).await;

        let out = with_deadline(
            tokio::time::sleep(Duration::from_millis(10)),
            deadline,
        )
        .await;
        assert_eq!(out, Err(RaceError::TimedOut(TimedOut::new(0))));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_in_the_future_lets_the_task_win() {
        let deadline = Instant::now() + Duration::from_millis(100);
        let out = with_deadline(async { 5 }, deadline).await;
        assert_eq!(out, Ok(5));
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_after_wait_skips_callbacks_for_fast_tasks() {
        let slow = AtomicUsize::new(0);
        let settled = AtomicUsize::new(0);

        let out = trigger_after_wait(
            async { 1 },
            Duration::from_millis(100),
            || {
                slow.fetch_add(1, Ordering::SeqCst);
            },
            || {
                settled.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

        assert_eq!(out, 1);
        assert_eq!(slow.load(Ordering::SeqCst), 0);
        assert_eq!(settled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_after_wait_fires_for_slow_tasks_and_still_returns_the_output() {
        let slow = AtomicUsize::new(0);
        let settled = AtomicUsize::new(0);

        let out = trigger_after_wait(
            async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "done"
            },
            Duration::from_millis(100),
            || {
                slow.fetch_add(1, Ordering::SeqCst);
            },
            || {
                settled.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

        assert_eq!(out, "done");
        assert_eq!(slow.load(Ordering::SeqCst), 1);
        assert_eq!(settled.load(Ordering::SeqCst), 1);
    }
}
