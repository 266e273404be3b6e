use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "schema")]
use schemars::JsonSchema;

use crate::error::{ModelError, ModelResult};

/// Delay schedule between retry attempts.
///
/// The delay before attempt `n + 1` (after attempt `n` was not accepted) is
/// `min(max_ms, first_ms * factor^(n - 1))`. The all-zero default retries immediately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffStrategy {
    pub first_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl BackoffStrategy {
    /// No delay between attempts.
    pub const fn immediate() -> Self {
        Self {
            first_ms: 0,
            max_ms: 0,
            factor: 1.0,
        }
    }

    /// Fixed delay between attempts.
    pub const fn fixed(delay_ms: u64) -> Self {
        Self {
            first_ms: delay_ms,
            max_ms: delay_ms,
            factor: 1.0,
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(ModelError::InvalidBackoff(format!(
                "factor must be a finite number >= 1.0, got {}",
                self.factor
            )));
        }
        if self.max_ms < self.first_ms {
            return Err(ModelError::InvalidBackoff(format!(
                "maxMs ({}) is lower than firstMs ({})",
                self.max_ms, self.first_ms
            )));
        }
        Ok(())
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.first_ms == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.first_ms as f64 * self.factor.powi(exp);
        let capped = if raw.is_finite() {
            raw.min(self.max_ms as f64)
        } else {
            self.max_ms as f64
        };
        Duration::from_millis(capped as u64)
    }
}
