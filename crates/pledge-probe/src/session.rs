use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, ensure};
use pledge_core::{
    CoordContext,
    adapt::{denodeify, sleep},
    race::{trigger_after_wait, with_deadline},
    request::{RequestOutcome, RequestSerializer},
    serial::SerializedCall,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::ProbeConfig,
    lookup::{Lookup, LookupError},
    provider::{Hint, ProviderHandle, SimulatedProvider, SymbolIndex},
};

#[derive(Debug, Default)]
pub struct Summary {
    pub issued: u64,
    pub current: usize,
    pub outdated: usize,
    pub failed: usize,
    /// Answer for the final cursor position.
    pub hint: Option<Hint>,
    pub index_version: u64,
}

/// Cursor position after `step` moves.
pub fn position(step: u32) -> u32 {
    3 + step * 7
}

/// Simulate an editing session: every cursor move issues a lookup and asks for an index
/// rebuild. Lookups answered after the cursor moved on are discarded; rebuild requests made
/// while one is running collapse into a single follow-up rebuild.
pub async fn run(cfg: &ProbeConfig, ctx: CoordContext) -> anyhow::Result<Summary> {
    let providers: Vec<ProviderHandle> = cfg
        .providers
        .iter()
        .cloned()
        .map(SimulatedProvider::handle)
        .collect();
    let lookup = Arc::new(
        Lookup::new(
            providers,
            cfg.limit,
            Duration::from_millis(cfg.timeout_ms),
            cfg.retry.clone(),
        )
        .with_context(ctx.clone()),
    );
    ensure!(lookup.any_ready().await?, "no provider is ready");

    let index = Arc::new(SymbolIndex::new(cfg.move_interval_ms * 2));
    let rebuild = denodeify(SymbolIndex::rebuild);
    let reindex = {
        let index = Arc::clone(&index);
        SerializedCall::new(move || rebuild(index.as_ref(), ())).with_context(ctx.clone())
    };

    let requests = RequestSerializer::<Option<Hint>, LookupError>::new().with_context(ctx);
    let mut issued = Vec::with_capacity(cfg.moves as usize);

    for step in 0..cfg.moves {
        let position = position(step);
        let lookup = Arc::clone(&lookup);
        let handle = requests.run(async move { lookup.resolve(position).await });
        debug!(generation = handle.generation(), position, "cursor moved");

        drop(reindex.call());
        issued.push(handle);
        sleep(cfg.move_interval_ms).await;
    }

    let latest = trigger_after_wait(
        requests.wait_for_latest_result(),
        Duration::from_millis(cfg.timeout_ms / 2),
        || info!("latest lookup still running"),
        || debug!("latest lookup arrived"),
    )
    .await;

    let mut summary = Summary {
        issued: requests.latest_generation(),
        ..Default::default()
    };
    for handle in issued {
        let generation = handle.generation();
        match handle.await {
            RequestOutcome::Success(_) => summary.current += 1,
            RequestOutcome::Outdated => summary.outdated += 1,
            RequestOutcome::Error(err) => {
                warn!(generation, error = %err, "lookup failed");
                summary.failed += 1;
            }
        }
    }
    summary.hint = latest?;

    let deadline = Instant::now() + Duration::from_millis(cfg.timeout_ms * 4);
    summary.index_version = with_deadline(reindex.call(), deadline)
        .await?
        .map_err(|err| anyhow!("index rebuild failed: {err}"))?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use pledge_model::{ConcurrencyLimit, RetryPolicy};

    use super::*;
    use crate::provider::ProviderSpec;

    fn config(latency_ms: u64, move_interval_ms: u64, moves: u32) -> ProbeConfig {
        ProbeConfig {
            providers: vec![ProviderSpec::new("only", latency_ms)],
            limit: ConcurrencyLimit::Unbounded,
            timeout_ms: 1_000,
            retry: RetryPolicy::new(1).unwrap(),
            moves,
            move_interval_ms,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fast_lookups_are_all_current() {
        let summary = run(&config(10, 60, 4), CoordContext::default()).await.unwrap();

        assert_eq!(summary.issued, 4);
        assert_eq!(summary.current, 4);
        assert_eq!(summary.outdated, 0);
        assert_eq!(summary.hint.unwrap().position, position(3));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookups_overtaken_by_cursor_moves_are_outdated() {
        let summary = run(&config(200, 20, 4), CoordContext::default()).await.unwrap();

        assert_eq!(summary.issued, 4);
        assert_eq!(summary.current, 1);
        assert_eq!(summary.outdated, 3);
        assert_eq!(summary.hint.unwrap().position, position(3));
    }

    #[tokio::test(start_paused = true)]
    async fn rebuild_requests_are_coalesced() {
        let summary = run(&config(10, 5, 6), CoordContext::default()).await.unwrap();

        assert!(summary.index_version >= 2);
        assert!(summary.index_version < 6, "{}", summary.index_version);
    }

    #[tokio::test]
    async fn disabled_providers_stop_the_session() {
        let cfg = ProbeConfig {
            providers: vec![ProviderSpec::new("off", 0).disabled()],
            ..Default::default()
        };
        let err = run(&cfg, CoordContext::default()).await.unwrap_err();
        assert!(err.to_string().contains("no provider"), "{err}");
    }
}
