use std::{fs, path::Path};

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};

use pledge_model::{ConcurrencyLimit, RetryPolicy, TimeoutMs};
use pledge_observe::LogConfig;

use crate::provider::ProviderSpec;

/// Names the JSON file the probe reads its configuration from.
pub const CONFIG_ENV: &str = "PLEDGE_PROBE_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProbeConfig {
    pub logger: LogConfig,
    /// Providers in priority order: the first one with an answer wins.
    pub providers: Vec<ProviderSpec>,
    /// Providers queried at once per cursor move.
    pub limit: ConcurrencyLimit,
    /// Per-attempt deadline of a single provider lookup.
    pub timeout_ms: TimeoutMs,
    pub retry: RetryPolicy,
    /// Number of simulated cursor moves.
    pub moves: u32,
    pub move_interval_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            logger: LogConfig::default(),
            providers: vec![
                ProviderSpec::new("semantic", 120).failing_every(3),
                ProviderSpec::new("syntax", 40).empty_every(2),
                ProviderSpec::new("remote", 900),
            ],
            limit: ConcurrencyLimit::Unbounded,
            timeout_ms: 500,
            retry: RetryPolicy::new(2).unwrap_or_default(),
            moves: 6,
            move_interval_ms: 60,
        }
    }
}

impl ProbeConfig {
    /// Config from the file named by [`CONFIG_ENV`], or the defaults when it is unset.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading probe config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing probe config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        ensure!(!cfg.providers.is_empty(), "at least one provider is required");
        ensure!(cfg.timeout_ms > 0, "timeoutMs must be positive");
        Ok(cfg)
    }
}
