use std::{convert::Infallible, sync::Arc, time::Duration};

use pledge_core::{
    CoordContext, LimitError, RaceError,
    adapt::async_find_map,
    limit::Bounded,
    race::TimeoutRace,
    retry::Retry,
};
use pledge_model::{ConcurrencyLimit, RetryPolicy};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::provider::{Hint, ProviderError, ProviderHandle};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("no provider is ready")]
    NoProvider,

    #[error("lookup canceled")]
    Canceled,
}

impl From<LimitError<Infallible>> for LookupError {
    fn from(err: LimitError<Infallible>) -> Self {
        match err {
            LimitError::Worker(never) => match never {},
            LimitError::Canceled => LookupError::Canceled,
        }
    }
}

/// Fan-out of one cursor position over every ready provider.
///
/// Providers are queried with at most `limit` in flight; each query is retried per `retry`
/// and every attempt is raced against `timeout`. The answer of the highest-priority provider
/// that has one wins.
pub struct Lookup {
    providers: Vec<ProviderHandle>,
    limit: ConcurrencyLimit,
    timeout: Duration,
    retry: RetryPolicy,
    ctx: CoordContext,
}

impl Lookup {
    pub fn new(
        providers: Vec<ProviderHandle>,
        limit: ConcurrencyLimit,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            providers,
            limit,
            timeout,
            retry,
            ctx: CoordContext::default(),
        }
    }

    pub fn with_context(mut self, ctx: CoordContext) -> Self {
        self.ctx = ctx;
        self
    }

    fn executor(&self) -> Bounded {
        Bounded::new(self.limit).with_context(self.ctx.clone())
    }

    /// `true` if at least one provider is ready.
    pub async fn any_ready(&self) -> Result<bool, LookupError> {
        let ready = self
            .executor()
            .some(self.providers.clone(), |p| async move {
                Ok::<_, Infallible>(p.ready().await)
            })
            .await?;
        Ok(ready)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, position: u32) -> Result<Option<Hint>, LookupError> {
        let ready = self
            .executor()
            .filter(self.providers.clone(), |p| async move {
                Ok::<_, Infallible>(p.ready().await)
            })
            .await?;
        if ready.is_empty() {
            return Err(LookupError::NoProvider);
        }

        let race = TimeoutRace::new(self.timeout).with_context(self.ctx.clone());
        let retry = Retry::new(self.retry.clone()).with_context(self.ctx.clone());

        let answers = self
            .executor()
            .run(ready, move |provider| {
                let race = race.clone();
                let retry = retry.clone();
                async move { Ok::<_, Infallible>(query(provider, position, race, retry).await) }
            })
            .await?;

        let hint = async_find_map(answers, |answer| async move { answer }).await;
        debug!(found = hint.is_some(), "lookup settled");
        Ok(hint)
    }
}

async fn query(provider: ProviderHandle, position: u32, race: TimeoutRace, retry: Retry) -> Option<Hint> {
    let name = provider.name().to_string();

    let answer = retry
        .run(
            || {
                let provider = Arc::clone(&provider);
                let race = race.clone();
                let name = name.clone();
                async move {
                    race.try_run(async move { provider.lookup(position).await })
                        .await
                        .map_err(|err| match err {
                            RaceError::Task(err) => err,
                            err => ProviderError::Abandoned {
                                provider: name,
                                reason: err.to_string(),
                            },
                        })
                }
            },
            |hint: &Option<Hint>| hint.as_ref().is_none_or(|h| h.position == position),
        )
        .await;

    match answer {
        Ok(hint) => hint,
        Err(err) => {
            warn!(provider = %name, error = %err, "provider gave up");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderSpec, SimulatedProvider};

    fn lookup(providers: Vec<ProviderHandle>, timeout_ms: u64, retries: u32) -> Lookup {
        Lookup::new(
            providers,
            ConcurrencyLimit::Unbounded,
            Duration::from_millis(timeout_ms),
            RetryPolicy::new(retries).unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn priority_wins_over_speed() {
        let slow = SimulatedProvider::handle(ProviderSpec::new("slow", 100));
        let fast = SimulatedProvider::handle(ProviderSpec::new("fast", 10));

        let hint = lookup(vec![slow, fast], 500, 1).resolve(7).await.unwrap().unwrap();
        assert_eq!(hint.provider, "slow");
        assert_eq!(hint.position, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_provider_falls_through_to_the_next() {
        let stuck = SimulatedProvider::handle(ProviderSpec::new("stuck", 5_000));
        let fast = SimulatedProvider::handle(ProviderSpec::new("fast", 10));

        let hint = lookup(vec![stuck, fast], 200, 1).resolve(3).await.unwrap().unwrap();
        assert_eq!(hint.provider, "fast");
    }

    #[tokio::test(start_paused = true)]
    async fn failing_provider_is_retried() {
        let flaky = Arc::new(SimulatedProvider::new(ProviderSpec::new("flaky", 10).failing_every(1)));
        let handle: ProviderHandle = flaky.clone();

        let hint = lookup(vec![handle], 200, 3).resolve(1).await.unwrap();
        assert_eq!(hint, None);
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_answers_are_skipped() {
        let gaps = SimulatedProvider::handle(ProviderSpec::new("gaps", 10).empty_every(2));
        let full = SimulatedProvider::handle(ProviderSpec::new("full", 10));

        let hint = lookup(vec![gaps, full], 200, 1).resolve(4).await.unwrap().unwrap();
        assert_eq!(hint.provider, "full");
    }

    #[tokio::test]
    async fn no_ready_provider_is_an_error() {
        let off = SimulatedProvider::handle(ProviderSpec::new("off", 0).disabled());
        let lookup = lookup(vec![off], 100, 1);

        assert_eq!(lookup.any_ready().await, Ok(false));
        assert_eq!(lookup.resolve(1).await, Err(LookupError::NoProvider));
    }
}
