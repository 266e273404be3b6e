use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use pledge_core::metrics::{MetricsBackend, TaskOutcome};

const NAMESPACE: &str = "pledge";

/// Prometheus metrics backend.
///
/// ## Label cardinality
/// All labels are bounded:
/// - `primitive`: "limit", "serial", "request", "retry", "timeout"
/// - `outcome`: "success", "failure", "canceled", "timeout", "outdated", "rejected"
/// - `event`: "coalesced", "scheduled", "retry", "dispatch_halted", "abandoned", "aborted"
#[derive(Clone)]
pub struct PrometheusMetrics {
    tasks_started: CounterVec,
    tasks_completed: CounterVec,
    task_duration: HistogramVec,
    events: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Register the metric families in `registry`.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let tasks_started = CounterVec::new(
            Opts::new("tasks_started_total", "Units of work started by a primitive").namespace(NAMESPACE),
            &["primitive"],
        )?;
        registry.register(Box::new(tasks_started.clone()))?;

        let tasks_completed = CounterVec::new(
            Opts::new("tasks_completed_total", "Units of work settled, by outcome").namespace(NAMESPACE),
            &["primitive", "outcome"],
        )?;
        registry.register(Box::new(tasks_completed.clone()))?;

        let task_duration = HistogramVec::new(
            HistogramOpts::new("task_duration_seconds", "Time from start to settlement in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["primitive"],
        )?;
        registry.register(Box::new(task_duration.clone()))?;

        let events = CounterVec::new(
            Opts::new("events_total", "Coordination events (coalescing, retries, abandonment)").namespace(NAMESPACE),
            &["primitive", "event"],
        )?;
        registry.register(Box::new(events.clone()))?;

        Ok(Self {
            tasks_started,
            tasks_completed,
            task_duration,
            events,
            registry,
        })
    }

    /// Backend with its own fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render every registered family in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_task_started(&self, primitive: &str) {
        self.tasks_started.with_label_values(&[primitive]).inc();
    }

    fn record_task_completed(&self, primitive: &str, outcome: TaskOutcome, duration_ms: u64) {
        self.tasks_completed
            .with_label_values(&[primitive, outcome.as_label()])
            .inc();
        self.task_duration
            .with_label_values(&[primitive])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_event(&self, primitive: &str, event: &str) {
        self.events.with_label_values(&[primitive, event]).inc();
    }
}

#[cfg(test)]
mod tests {
    use pledge_core::metrics::{EVENT_COALESCED, EVENT_RETRY, PRIMITIVE_RETRY, PRIMITIVE_SERIAL};

    use super::*;

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families
            .iter()
            .find(|f| f.name() == name)
            .unwrap_or_else(|| panic!("{name} not found"))
    }

    #[test]
    fn started_counter_is_labelled_by_primitive() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_task_started(PRIMITIVE_RETRY);
        metrics.record_task_started(PRIMITIVE_RETRY);
        metrics.record_task_started(PRIMITIVE_SERIAL);

        let families = metrics.gather();
        assert_eq!(family(&families, "pledge_tasks_started_total").get_metric().len(), 2);
    }

    #[test]
    fn completion_feeds_counter_and_histogram() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_task_completed(PRIMITIVE_RETRY, TaskOutcome::Success, 150);
        metrics.record_task_completed(PRIMITIVE_RETRY, TaskOutcome::Rejected, 50);

        let families = metrics.gather();
        assert_eq!(family(&families, "pledge_tasks_completed_total").get_metric().len(), 2);
        assert_eq!(family(&families, "pledge_task_duration_seconds").get_metric().len(), 1);
    }

    #[test]
    fn events_are_counted_per_primitive_and_event() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_event(PRIMITIVE_SERIAL, EVENT_COALESCED);
        metrics.record_event(PRIMITIVE_SERIAL, EVENT_COALESCED);
        metrics.record_event(PRIMITIVE_RETRY, EVENT_RETRY);

        let families = metrics.gather();
        let events = family(&families, "pledge_events_total");
        assert_eq!(events.get_metric().len(), 2);
    }

    #[test]
    fn text_exposition_mentions_recorded_series() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_task_completed(PRIMITIVE_SERIAL, TaskOutcome::Outdated, 3);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("pledge_tasks_completed_total"), "{text}");
        assert!(text.contains(r#"outcome="outdated""#), "{text}");
    }

    #[test]
    fn registering_twice_in_one_registry_fails() {
        let registry = Arc::new(Registry::new());
        let _first = PrometheusMetrics::new_with_registry(registry.clone()).unwrap();
        assert!(PrometheusMetrics::new_with_registry(registry).is_err());
    }
}
