//! Prometheus metrics for the semantic layer
//!
//! Covers analysis throughput and latency, cache effectiveness, Redis
//! command latency, hierarchy builds and cardinality estimation fallbacks.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};

lazy_static! {
    // === Analysis ===

    /// Analysis requests by outcome
    pub static ref ANALYSIS_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "olap_analysis_requests_total",
        "Total analysis requests by outcome",
        &["outcome"]
    ).unwrap();

    /// Analysis execution duration
    pub static ref ANALYSIS_DURATION: HistogramVec = register_histogram_vec!(
        "olap_analysis_duration_seconds",
        "Analysis execution latency in seconds",
        &["status"],
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]
    ).unwrap();

    /// Jobs currently executing on this node
    pub static ref JOBS_IN_FLIGHT: Gauge = register_gauge!(
        "olap_jobs_in_flight",
        "Number of analysis jobs executing on this node"
    ).unwrap();

    // === Cache ===

    /// Cache lookups by layer and result
    pub static ref CACHE_LOOKUPS_TOTAL: CounterVec = register_counter_vec!(
        "olap_cache_lookups_total",
        "Total result cache lookups by layer and result",
        &["layer", "result"]
    ).unwrap();

    // === Redis ===

    /// Redis command latency by operation and result
    pub static ref REDIS_COMMAND_DURATION: HistogramVec = register_histogram_vec!(
        "olap_redis_command_duration_seconds",
        "Distributed cache command latency in seconds",
        &["op", "result"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ).unwrap();

    // === Hierarchy ===

    /// Hierarchy builds by status
    pub static ref HIERARCHY_BUILDS_TOTAL: CounterVec = register_counter_vec!(
        "olap_hierarchy_builds_total",
        "Total domain hierarchy builds by status",
        &["status"]
    ).unwrap();

    /// Cardinality estimates that degraded to unknown
    pub static ref ESTIMATION_FALLBACKS: Counter = register_counter!(
        "olap_estimation_fallbacks_total",
        "Total cardinality estimates that failed and returned -1"
    ).unwrap();
}

/// Initialize metrics system
pub fn init() {
    JOBS_IN_FLIGHT.set(0.0);
    lazy_static::initialize(&ANALYSIS_REQUESTS_TOTAL);
    lazy_static::initialize(&CACHE_LOOKUPS_TOTAL);
    lazy_static::initialize(&HIERARCHY_BUILDS_TOTAL);
    lazy_static::initialize(&ESTIMATION_FALLBACKS);

    tracing::info!("Metrics system initialized");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record the outcome of an analysis request
#[inline]
pub fn record_request(outcome: &str) {
    ANALYSIS_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a finished analysis execution
#[inline]
pub fn record_execution(duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };
    ANALYSIS_DURATION
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Record a cache lookup
#[inline]
pub fn record_cache_lookup(layer: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS_TOTAL.with_label_values(&[layer, result]).inc();
}

/// Record one attempt of a Redis command
#[inline]
pub fn record_redis_command(op: &str, result: &str, duration_secs: f64) {
    REDIS_COMMAND_DURATION
        .with_label_values(&[op, result])
        .observe(duration_secs);
}

/// Record a hierarchy build
#[inline]
pub fn record_hierarchy_build(status: &str) {
    HIERARCHY_BUILDS_TOTAL.with_label_values(&[status]).inc();
}
