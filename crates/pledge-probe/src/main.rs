mod config;
mod lookup;
mod provider;
mod session;

use std::sync::Arc;

use tracing::{info, warn};

use config::ProbeConfig;
use pledge_core::{CoordContext, adapt::lastly};
use pledge_observe::init_logger;
use pledge_prometheus::PrometheusMetrics;

fn main() -> anyhow::Result<()> {
    // Logger first, while the process is single-threaded, so local timestamps can be resolved.
    let cfg = ProbeConfig::load()?;
    init_logger(&cfg.logger)?;
    info!(
        providers = cfg.providers.len(),
        moves = cfg.moves,
        limit = %cfg.limit,
        "probe starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cfg))
}

async fn run(cfg: ProbeConfig) -> anyhow::Result<()> {
    let metrics = PrometheusMetrics::new()?;
    let ctx = CoordContext::default().with_metrics(Arc::new(metrics.clone()));

    let summary = lastly(session::run(&cfg, ctx), || async {
        match metrics.encode_text() {
            Ok(text) => println!("{text}"),
            Err(err) => warn!(error = %err, "metrics exposition failed"),
        }
    })
    .await?;

    info!(
        issued = summary.issued,
        current = summary.current,
        outdated = summary.outdated,
        failed = summary.failed,
        index_version = summary.index_version,
        "session finished"
    );
    match &summary.hint {
        Some(hint) => info!(%hint, "latest hint"),
        None => info!("no hint for the final position"),
    }
    Ok(())
}
