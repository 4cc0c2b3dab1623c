//! Prometheus metrics for the intent engine
//!
//! Covers controller traffic, flow rule lifecycle, reconciliation results,
//! the capability cache and store latency. Everything registers into one
//! process registry rendered by [`gather_metrics`].

use lazy_static::lazy_static;
use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Once;
use tracing::info;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Controller metrics
    pub static ref CONTROLLER_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("nbi_controller_requests_total", "RESTCONF requests sent to the controller"),
        &["method", "outcome"]
    ).expect("controller request counter");

    pub static ref CONTROLLER_REQUEST_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("nbi_controller_request_seconds", "RESTCONF request latency")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["method"]
    ).expect("controller latency histogram");

    // Flow metrics
    pub static ref FLOW_STATUS_TRANSITIONS: CounterVec = CounterVec::new(
        Opts::new("nbi_flow_transitions_total", "Flow rule status transitions"),
        &["from_status", "to_status"]
    ).expect("flow transition counter");

    /// Reconciliation findings: zombie, unmanaged, stale_pending
    pub static ref FLOW_SYNC_RESULTS: CounterVec = CounterVec::new(
        Opts::new("nbi_flow_sync_results_total", "Flow reconciliation findings"),
        &["kind"]
    ).expect("flow sync counter");

    // Capability metrics
    pub static ref CAPABILITY_CACHE_NODES: Gauge = Gauge::new(
        "nbi_capability_cache_nodes",
        "Nodes currently held in the capability cache"
    ).expect("capability cache gauge");

    // Store metrics
    pub static ref STORE_OP_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("nbi_store_operation_seconds", "Store operation duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["operation"]
    ).expect("store latency histogram");

    pub static ref STORE_OP_ERRORS: CounterVec = CounterVec::new(
        Opts::new("nbi_store_errors_total", "Store operation errors"),
        &["operation"]
    ).expect("store error counter");
}

static INIT: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    INIT.call_once(|| {
        info!("Registering intent engine metrics");

        REGISTRY.register(Box::new(CONTROLLER_REQUESTS_TOTAL.clone())).ok();
        REGISTRY.register(Box::new(CONTROLLER_REQUEST_SECONDS.clone())).ok();

        REGISTRY.register(Box::new(FLOW_STATUS_TRANSITIONS.clone())).ok();
        REGISTRY.register(Box::new(FLOW_SYNC_RESULTS.clone())).ok();

        REGISTRY.register(Box::new(CAPABILITY_CACHE_NODES.clone())).ok();

        REGISTRY.register(Box::new(STORE_OP_DURATION.clone())).ok();
        REGISTRY.register(Box::new(STORE_OP_ERRORS.clone())).ok();
    });
}

/// Records store latency when dropped
pub struct OperationTimer {
    operation: &'static str,
    start: std::time::Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        STORE_OP_DURATION
            .with_label_values(&[self.operation])
            .observe(self.start.elapsed().as_secs_f64());
    }
}

/// `outcome` is `ok`, `http_<status>`, `timeout` or `transport`
pub fn record_controller_request(method: &str, outcome: &str, seconds: f64) {
    CONTROLLER_REQUESTS_TOTAL
        .with_label_values(&[method, outcome])
        .inc();
    CONTROLLER_REQUEST_SECONDS
        .with_label_values(&[method])
        .observe(seconds);
}

pub fn record_flow_transition(from: &str, to: &str) {
    FLOW_STATUS_TRANSITIONS.with_label_values(&[from, to]).inc();
}

pub fn record_sync_result(kind: &str, count: usize) {
    if count > 0 {
        FLOW_SYNC_RESULTS
            .with_label_values(&[kind])
            .inc_by(count as f64);
    }
}

pub fn set_capability_cache_size(nodes: usize) {
    CAPABILITY_CACHE_NODES.set(nodes as f64);
}

pub fn record_store_error(operation: &str) {
    STORE_OP_ERRORS.with_label_values(&[operation]).inc();
}

/// Metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
