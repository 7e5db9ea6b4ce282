// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::events::{Collection, EventKind, Transition};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Domain events published per collection and transition
// - Change feed stream faults and watcher terminations
// - Event bus handler failures
// - Entity store operations (throughput, latency, misses)
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the bridge.
pub struct Metrics {
    registry: Registry,

    // Watcher metrics
    pub events_published: IntCounterVec,
    pub stream_faults: IntCounterVec,
    pub watcher_terminations: IntCounterVec,

    // Event bus metrics
    pub handler_errors: IntCounterVec,

    // Entity store metrics
    pub store_operations: IntCounterVec,
    pub store_misses: IntCounterVec,
    pub store_operation_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Watcher metrics
        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Domain events published on the bus"),
            &["collection", "transition"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let stream_faults = IntCounterVec::new(
            Opts::new("stream_faults_total", "Malformed change records skipped"),
            &["collection"],
        )?;
        registry.register(Box::new(stream_faults.clone()))?;

        let watcher_terminations = IntCounterVec::new(
            Opts::new("watcher_terminations_total", "Change feed watchers terminated unexpectedly"),
            &["collection"],
        )?;
        registry.register(Box::new(watcher_terminations.clone()))?;

        // Event bus metrics
        let handler_errors = IntCounterVec::new(
            Opts::new("handler_errors_total", "Event handlers that returned an error"),
            &["event_kind"],
        )?;
        registry.register(Box::new(handler_errors.clone()))?;

        // Entity store metrics
        let store_operations = IntCounterVec::new(
            Opts::new("store_operations_total", "Entity store operations executed"),
            &["collection", "operation"],
        )?;
        registry.register(Box::new(store_operations.clone()))?;

        let store_misses = IntCounterVec::new(
            Opts::new("store_misses_total", "Store operations addressing an absent key"),
            &["collection", "operation"],
        )?;
        registry.register(Box::new(store_misses.clone()))?;

        let store_operation_duration = HistogramVec::new(
            HistogramOpts::new("store_operation_duration_seconds", "Entity store operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(store_operation_duration.clone()))?;

        Ok(Self {
            registry,
            events_published,
            stream_faults,
            watcher_terminations,
            handler_errors,
            store_operations,
            store_misses,
            store_operation_duration,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one published domain event.
    pub fn record_event_published(&self, collection: Collection, transition: Transition) {
        self.events_published
            .with_label_values(&[collection.table_name(), transition.as_str()])
            .inc();
    }

    /// Record one malformed change record that was skipped.
    pub fn record_stream_fault(&self, collection: Collection) {
        self.stream_faults
            .with_label_values(&[collection.table_name()])
            .inc();
    }

    /// Record one unexpected watcher termination.
    pub fn record_watcher_termination(&self, collection: Collection) {
        self.watcher_terminations
            .with_label_values(&[collection.table_name()])
            .inc();
    }

    /// Record one failed event handler invocation.
    pub fn record_handler_error(&self, kind: EventKind) {
        self.handler_errors.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record one entity store operation and its duration.
    pub fn record_store_operation(&self, collection: Collection, operation: &str, duration_secs: f64) {
        self.store_operations
            .with_label_values(&[collection.table_name(), operation])
            .inc();
        self.store_operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Record an update/delete that addressed an absent key.
    pub fn record_store_miss(&self, collection: Collection, operation: &str) {
        self.store_misses
            .with_label_values(&[collection.table_name(), operation])
            .inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.registry.gather().len() > 0);
    }

    #[test]
    fn test_record_event_published() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event_published(Collection::Stages, Transition::Added);

        let gathered = metrics.registry.gather();
        let published = gathered
            .iter()
            .find(|m| m.name() == "events_published_total")
            .unwrap();
        assert_eq!(published.metric[0].counter.value, Some(1.0));
    }

    #[test]
    fn test_record_store_operation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_store_operation(Collection::Users, "create", 0.002);
        metrics.record_store_operation(Collection::Users, "read", 0.001);

        let gathered = metrics.registry.gather();
        let operations = gathered
            .iter()
            .find(|m| m.name() == "store_operations_total")
            .unwrap();
        assert_eq!(operations.metric.len(), 2); // Two different operation labels
    }

    #[test]
    fn test_record_stream_fault_and_termination() {
        let metrics = Metrics::new().unwrap();
        metrics.record_stream_fault(Collection::Devices);
        metrics.record_stream_fault(Collection::Devices);
        metrics.record_watcher_termination(Collection::Devices);

        let gathered = metrics.registry.gather();
        let faults = gathered
            .iter()
            .find(|m| m.name() == "stream_faults_total")
            .unwrap();
        assert_eq!(faults.metric[0].counter.value, Some(2.0));
    }
}
