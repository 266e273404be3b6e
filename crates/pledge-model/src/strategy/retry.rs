use serde::{Deserialize, Serialize};

#[cfg(feature = "schema")]
use schemars::JsonSchema;

use super::BackoffStrategy;
use crate::error::{ModelError, ModelResult};

/// Bounded retry-with-validation policy.
///
/// `limit` is the total number of producer invocations allowed (the first attempt included),
/// so `limit == 1` means "no retries". `backoff` controls the pause between attempts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase", try_from = "RawRetryPolicy")]
pub struct RetryPolicy {
    limit: u32,
    backoff: BackoffStrategy,
}

impl RetryPolicy {
    /// Policy with `limit` attempts and no delay between them.
    pub fn new(limit: u32) -> ModelResult<Self> {
        Self::with_backoff(limit, BackoffStrategy::immediate())
    }

    pub fn with_backoff(limit: u32, backoff: BackoffStrategy) -> ModelResult<Self> {
        if limit == 0 {
            return Err(ModelError::InvalidRetry("limit must be at least 1".into()));
        }
        backoff.validate()?;
        Ok(Self { limit, backoff })
    }

    /// Maximum number of producer invocations.
    #[inline]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[inline]
    pub fn backoff(&self) -> &BackoffStrategy {
        &self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: 1,
            backoff: BackoffStrategy::immediate(),
        }
    }
}

#[derive(Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
struct RawRetryPolicy {
    limit: u32,
    #[serde(default)]
    backoff: BackoffStrategy,
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = ModelError;
    fn try_from(raw: RawRetryPolicy) -> ModelResult<Self> {
        Self::with_backoff(raw.limit, raw.backoff)
    }
}
