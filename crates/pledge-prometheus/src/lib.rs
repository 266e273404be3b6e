//! Prometheus backend for the coordination primitives.
//!
//! [`PrometheusMetrics`] implements [`pledge_core::metrics::MetricsBackend`]; inject it through
//! [`pledge_core::CoordContext::with_metrics`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use pledge_core::CoordContext;
//! use pledge_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let ctx = CoordContext::default().with_metrics(Arc::new(metrics.clone()));
//!
//! // ... run primitives with `ctx` ...
//!
//! let exposition = metrics.encode_text()?;
//! # let _ = (ctx, exposition);
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `pledge_tasks_started_total{primitive}` - Counter
//! - `pledge_tasks_completed_total{primitive, outcome}` - Counter
//! - `pledge_task_duration_seconds{primitive}` - Histogram
//! - `pledge_events_total{primitive, event}` - Counter
//!
//! No HTTP endpoint is provided; serve [`PrometheusMetrics::encode_text`] from whatever server
//! the application already runs.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
