mod config;
mod error;
mod filter;
mod format;
mod timestamp;

pub use config::LogConfig;
pub use error::{LoggerError, LoggerResult};
pub use filter::{FILTER_ENV, LogFilter};
pub use format::LogFormat;
pub use timestamp::{Rfc3339Timer, Timestamps};

use tracing::Subscriber;
use tracing_subscriber::{
    Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global tracing subscriber described by `cfg`.
///
/// `PLEDGE_LOG`, when set to a valid filter expression, overrides `cfg.filter`.
///
/// # Examples
/// ```rust
/// use pledge_observe::{LogConfig, init_logger};
///
/// init_logger(&LogConfig::default()).expect("logger");
/// tracing::info!("ready");
/// ```
pub fn init_logger(cfg: &LogConfig) -> LoggerResult<()> {
    subscriber(cfg)
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)
}

/// Build the subscriber for `cfg` without installing it.
pub fn subscriber(cfg: &LogConfig) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(fmt_layer(cfg))
        .with(cfg.filter.resolve())
}

fn fmt_layer(cfg: &LogConfig) -> BoxedLayer {
    let color = cfg.use_color();
    let span_events = if cfg.span_close {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_target(cfg.targets)
        .with_span_events(span_events);

    match (cfg.format, cfg.timestamps.timer()) {
        (LogFormat::Text, Some(timer)) => base.with_ansi(color).with_timer(timer).boxed(),
        (LogFormat::Text, None) => base.with_ansi(color).without_time().boxed(),
        (LogFormat::Compact, Some(timer)) => base.compact().with_ansi(color).with_timer(timer).boxed(),
        (LogFormat::Compact, None) => base.compact().with_ansi(color).without_time().boxed(),
        (LogFormat::Json, Some(timer)) => base.json().with_ansi(false).with_timer(timer).boxed(),
        (LogFormat::Json, None) => base.json().with_ansi(false).without_time().boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_format_and_timestamp_mode_builds() {
        for format in [LogFormat::Text, LogFormat::Compact, LogFormat::Json] {
            for timestamps in [Timestamps::Utc, Timestamps::Local, Timestamps::Off] {
                let cfg = LogConfig {
                    format,
                    timestamps,
                    span_close: true,
                    ..Default::default()
                };
                tracing::subscriber::with_default(subscriber(&cfg), || {
                    tracing::info!(%format, "subscriber built");
                });
            }
        }
    }
}
