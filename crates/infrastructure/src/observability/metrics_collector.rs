//! Metrics collector for the harvester coordinator
//!
//! Thin wrapper over the `metrics` facade. Without an installed recorder
//! every handle is a no-op, so services can always hold one.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::warn;

pub struct MetricsCollector {
    // Batcher metrics
    events_absorbed_total: Counter,
    flush_cycles_total: Counter,
    flush_failures_total: Counter,
    events_dropped_total: Counter,
    flush_duration: Histogram,

    // Issuance metrics
    identifiers_generated_total: Counter,
    tasks_issued_total: Counter,

    // Result cache metrics
    result_rows_flushed_total: Counter,
    result_rows_discarded_total: Counter,

    // Worker metrics
    workers_evicted_total: Counter,
    active_workers: Gauge,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            events_absorbed_total: counter!("harvester_batch_events_absorbed_total"),
            flush_cycles_total: counter!("harvester_batch_flush_cycles_total"),
            flush_failures_total: counter!("harvester_batch_flush_failures_total"),
            events_dropped_total: counter!("harvester_batch_events_dropped_total"),
            flush_duration: histogram!("harvester_batch_flush_duration_seconds"),
            identifiers_generated_total: counter!("harvester_identifiers_generated_total"),
            tasks_issued_total: counter!("harvester_tasks_issued_total"),
            result_rows_flushed_total: counter!("harvester_result_rows_flushed_total"),
            result_rows_discarded_total: counter!("harvester_result_rows_discarded_total"),
            workers_evicted_total: counter!("harvester_workers_evicted_total"),
            active_workers: gauge!("harvester_active_workers"),
        }
    }

    // Batcher metrics

    pub fn record_events_absorbed(&self, count: u64) {
        self.events_absorbed_total.increment(count);
    }

    /// Record a completed flush cycle
    pub fn record_flush_cycle(&self, duration_seconds: f64) {
        self.flush_cycles_total.increment(1);
        self.flush_duration.record(duration_seconds);
    }

    /// Record a failed flush operation and the events it dropped
    pub fn record_flush_failure(&self, operation: &str, dropped_events: u64) {
        self.flush_failures_total.increment(1);
        self.events_dropped_total.increment(dropped_events);

        warn!(
            operation = operation,
            dropped_events = dropped_events,
            "Batch flush operation failed"
        );
    }

    // Issuance metrics

    pub fn record_identifiers_generated(&self, count: u64) {
        self.identifiers_generated_total.increment(count);
    }

    pub fn record_tasks_issued(&self, count: u64) {
        self.tasks_issued_total.increment(count);
    }

    // Result cache metrics

    pub fn record_result_rows_flushed(&self, count: u64) {
        self.result_rows_flushed_total.increment(count);
    }

    pub fn record_result_rows_discarded(&self, count: u64) {
        self.result_rows_discarded_total.increment(count);
    }

    // Worker metrics

    pub fn record_workers_evicted(&self, count: u64) {
        self.workers_evicted_total.increment(count);
    }

    pub fn update_active_workers(&self, count: f64) {
        self.active_workers.set(count);
    }
}
