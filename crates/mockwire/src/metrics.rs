//! Prometheus metrics for the dispatch engine.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Dispatch outcomes
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mockwire_requests_total",
        "Total number of requests dispatched",
        &["outcome"]  // outcome: matched|partial|fallback|no_match
    )
    .expect("mockwire_requests_total registers once");

    /// Scenario state transitions
    pub static ref SCENARIO_TRANSITIONS_TOTAL: CounterVec = register_counter_vec!(
        "mockwire_scenario_transitions_total",
        "Total number of scenario state transitions",
        &["scenario"]
    )
    .expect("mockwire_scenario_transitions_total registers once");

    /// Matcher errors surfaced during dispatch
    pub static ref MATCHER_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "mockwire_matcher_errors_total",
        "Total number of matcher errors raised while scoring",
        &["matcher"]
    )
    .expect("mockwire_matcher_errors_total registers once");

    /// Registered mappings
    pub static ref MAPPINGS: IntGauge = register_int_gauge!(
        "mockwire_mappings",
        "Number of registered mappings"
    )
    .expect("mockwire_mappings registers once");

    /// Time spent selecting a mapping
    pub static ref DISPATCH_DURATION_MS: HistogramVec = register_histogram_vec!(
        "mockwire_dispatch_duration_ms",
        "Histogram of mapping selection time in milliseconds",
        &["outcome"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0]
    )
    .expect("mockwire_dispatch_duration_ms registers once");
}

/// Collect and return all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_dispatch(outcome: &str, duration_ms: f64) {
    REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
    DISPATCH_DURATION_MS
        .with_label_values(&[outcome])
        .observe(duration_ms);
}

pub fn record_transition(scenario: &str) {
    SCENARIO_TRANSITIONS_TOTAL
        .with_label_values(&[scenario])
        .inc();
}

pub fn record_matcher_error(matcher: &str) {
    MATCHER_ERRORS_TOTAL.with_label_values(&[matcher]).inc();
}

pub fn set_mappings(count: usize) {
    MAPPINGS.set(count as i64);
}
