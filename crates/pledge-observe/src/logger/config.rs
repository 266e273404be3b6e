use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::logger::{LogFilter, LogFormat, Timestamps};

/// Logger configuration, usually embedded in a larger JSON config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    pub format: LogFormat,
    pub filter: LogFilter,
    pub timestamps: Timestamps,
    /// Include the event target (module path).
    pub targets: bool,
    /// Emit an event when an instrumented span closes, with its busy/idle time.
    pub span_close: bool,
    /// Requested color; only honored for text formats writing to a terminal.
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: LogFilter::default(),
            timestamps: Timestamps::default(),
            targets: true,
            span_close: false,
            color: true,
        }
    }
}

impl LogConfig {
    /// Whether ANSI colors end up in the output. Checked at install time, since stdout may be
    /// redirected after the config was parsed.
    pub fn use_color(&self) -> bool {
        self.color && self.format.supports_color() && std::io::stdout().is_terminal()
    }
}
