use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use pledge_core::adapt::{NodeCallback, sleep};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Answer for one cursor position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub provider: String,
    pub position: u32,
    pub text: String,
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}@{}] {}", self.provider, self.position, self.text)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider {provider} unavailable (call {call})")]
    Unavailable { provider: String, call: u32 },

    #[error("provider {provider}: {reason}")]
    Abandoned { provider: String, reason: String },
}

/// Source of hints, queried once per cursor move.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Whether the provider accepts queries right now.
    async fn ready(&self) -> bool;

    /// `Ok(None)` means the provider has nothing for `position`.
    async fn lookup(&self, position: u32) -> Result<Option<Hint>, ProviderError>;
}

pub type ProviderHandle = Arc<dyn Provider>;

/// Behavior of a simulated provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    pub name: String,
    pub latency_ms: u64,
    /// Every n-th call fails; `0` never fails.
    #[serde(default)]
    pub fail_every: u32,
    /// Positions divisible by n yield no hint; `0` always answers.
    #[serde(default)]
    pub empty_every: u32,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            name: name.into(),
            latency_ms,
            fail_every: 0,
            empty_every: 0,
            enabled: true,
        }
    }

    pub fn failing_every(mut self, n: u32) -> Self {
        self.fail_every = n;
        self
    }

    pub fn empty_every(mut self, n: u32) -> Self {
        self.empty_every = n;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Provider answering after a fixed latency, with scripted failures and gaps.
pub struct SimulatedProvider {
    spec: ProviderSpec,
    calls: AtomicU32,
}

impl SimulatedProvider {
    pub fn new(spec: ProviderSpec) -> Self {
        Self {
            spec,
            calls: AtomicU32::new(0),
        }
    }

    pub fn handle(spec: ProviderSpec) -> ProviderHandle {
        Arc::new(Self::new(spec))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn ready(&self) -> bool {
        self.spec.enabled
    }

    async fn lookup(&self, position: u32) -> Result<Option<Hint>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        sleep(self.spec.latency_ms).await;

        if self.spec.fail_every > 0 && call % self.spec.fail_every == 0 {
            trace!(provider = %self.spec.name, call, "simulated failure");
            return Err(ProviderError::Unavailable {
                provider: self.spec.name.clone(),
                call,
            });
        }
        if self.spec.empty_every > 0 && position % self.spec.empty_every == 0 {
            return Ok(None);
        }
        Ok(Some(Hint {
            provider: self.spec.name.clone(),
            position,
            text: format!("symbol #{position} as seen by {}", self.spec.name),
        }))
    }
}

/// Symbol index rebuilt in the background and reporting through a completion callback.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    version: AtomicU64,
    rebuild_ms: u64,
}

impl SymbolIndex {
    pub fn new(rebuild_ms: u64) -> Self {
        Self {
            version: AtomicU64::new(0),
            rebuild_ms,
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Start a rebuild; `done` receives the new version once it finishes.
    pub fn rebuild(&self, (): (), done: NodeCallback<u64, String>) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let rebuild_ms = self.rebuild_ms;
        tokio::spawn(async move {
            sleep(rebuild_ms).await;
            done.call(None, Some(version));
        });
    }
}
