use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::logger::LoggerError;

/// Environment variable that overrides the configured filter when set to a valid expression.
pub const FILTER_ENV: &str = "PLEDGE_LOG";

/// Validated `EnvFilter` directive string, e.g. `"info"` or `"pledge_core=trace,info"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogFilter(String);

impl LogFilter {
    pub fn new(directives: impl Into<String>) -> Result<Self, LoggerError> {
        let directives = directives.into();
        match EnvFilter::try_new(&directives) {
            Ok(_) => Ok(Self(directives)),
            Err(e) => Err(LoggerError::InvalidFilter(format!("{directives}: {e}"))),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The filter to install: `PLEDGE_LOG` when it holds a valid expression, `self` otherwise.
    pub fn resolve(&self) -> EnvFilter {
        std::env::var(FILTER_ENV)
            .ok()
            .and_then(|raw| EnvFilter::try_new(raw).ok())
            .unwrap_or_else(|| self.to_env_filter())
    }

    pub fn to_env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.as_str()).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

impl Default for LogFilter {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl FromStr for LogFilter {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LogFilter {
    type Error = LoggerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<LogFilter> for String {
    fn from(f: LogFilter) -> Self {
        f.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_levels_and_per_target_directives() {
        for ok in ["info", "trace", "pledge_core=trace,info", "pledge_core::retry=debug"] {
            assert!(ok.parse::<LogFilter>().is_ok(), "{ok} must parse");
        }
    }

    #[test]
    fn rejects_unknown_levels() {
        for bad in ["pledge_core=loud", "a=trace,b=wat"] {
            let err = bad.parse::<LogFilter>().unwrap_err();
            assert!(matches!(err, LoggerError::InvalidFilter(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn default_is_info() {
        assert_eq!(LogFilter::default().as_str(), "info");
    }

    #[test]
    fn deserialization_validates() {
        let ok: LogFilter = serde_json::from_str(r#""pledge_core=debug""#).unwrap();
        assert_eq!(ok.as_str(), "pledge_core=debug");
        assert!(serde_json::from_str::<LogFilter>(r#""x=nope""#).is_err());
    }
}
