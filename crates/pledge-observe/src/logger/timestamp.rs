use std::{fmt::{self, Write as _}, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

use crate::logger::LoggerError;

/// How event timestamps are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timestamps {
    /// RFC3339 in UTC (default).
    #[default]
    Utc,
    /// RFC3339 in the local offset detected when the logger is installed.
    Local,
    /// No timestamps; useful when the collector stamps lines itself.
    Off,
}

impl Timestamps {
    /// Timer for this mode, or `None` for [`Timestamps::Off`].
    ///
    /// Local offset detection can fail once threads are running (it is unsound on most
    /// Unix platforms), in which case UTC is used.
    pub fn timer(self) -> Option<Rfc3339Timer> {
        match self {
            Timestamps::Utc => Some(Rfc3339Timer::utc()),
            Timestamps::Local => Some(Rfc3339Timer::new(
                UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
            )),
            Timestamps::Off => None,
        }
    }
}

impl FromStr for Timestamps {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            "off" | "none" => Ok(Self::Off),
            _ => Err(LoggerError::InvalidTimestamps(s.to_string())),
        }
    }
}

/// RFC3339 timer with a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct Rfc3339Timer {
    offset: UtcOffset,
}

impl Rfc3339Timer {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(UtcOffset::UTC)
    }
}

impl FormatTime for Rfc3339Timer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        match now.format(&Rfc3339) {
            Ok(ts) => w.write_str(&ts),
            Err(_) => w.write_str("<invalid-time>"),
        }
    }
}
