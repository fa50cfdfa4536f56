//! Prometheus metrics for monitoring the proxy.
//!
//! Tracks inbound requests, per-key upstream attempts and pool exhaustion.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, Gauge, GaugeVec,
    HistogramVec, IntCounterVec,
};
use std::sync::OnceLock;

/// Outcome label values for `upstream_attempts`.
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_RATE_LIMITED: &str = "rate_limited";
pub const OUTCOME_TRANSPORT_ERROR: &str = "transport_error";
pub const OUTCOME_UPSTREAM_ERROR: &str = "upstream_error";

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of proxied requests by method, provider, and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds, including every retry
    pub request_duration: HistogramVec,

    /// Number of currently active requests by provider
    pub active_requests: GaugeVec,

    /// Upstream attempts by provider and outcome
    pub upstream_attempts: IntCounterVec,

    /// Number of times a provider ran out of usable keys
    pub key_pool_exhausted: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// This should be called once at application startup. Subsequent calls
/// return the same instance.
///
/// # Examples
///
/// ```no_run
/// use llm_key_rotator::core::metrics::init_metrics;
///
/// let metrics = init_metrics();
/// metrics.request_count.with_label_values(&["POST", "groq", "200"]).inc();
/// ```
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "llm_key_rotator_requests_total",
            "Total number of proxied requests",
            &["method", "provider", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "llm_key_rotator_request_duration_seconds",
            "Request duration in seconds",
            &["provider"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "llm_key_rotator_active_requests",
            "Number of active requests",
            &["provider"]
        )
        .expect("Failed to register active_requests metric");

        let upstream_attempts = register_int_counter_vec!(
            "llm_key_rotator_upstream_attempts_total",
            "Upstream attempts by outcome",
            &["provider", "outcome"]
        )
        .expect("Failed to register upstream_attempts metric");

        let key_pool_exhausted = register_int_counter_vec!(
            "llm_key_rotator_key_pool_exhausted_total",
            "Times every key of a provider was rate limited or failing",
            &["provider"]
        )
        .expect("Failed to register key_pool_exhausted metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            upstream_attempts,
            key_pool_exhausted,
        }
    })
}

/// Get the global metrics instance.
///
/// # Panics
///
/// Panics if metrics have not been initialized via [`init_metrics`].
pub fn get_metrics() -> &'static Metrics {
    METRICS.get().expect("Metrics not initialized")
}

/// Record one upstream attempt; a no-op until metrics are initialized.
pub fn record_attempt(provider: &str, outcome: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .upstream_attempts
            .with_label_values(&[provider, outcome])
            .inc();
    }
}

pub fn record_exhausted(provider: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .key_pool_exhausted
            .with_label_values(&[provider])
            .inc();
    }
}

/// Holds one `active_requests` slot for a provider until dropped.
///
/// The gauge comes back down even when the handler future is dropped
/// mid-flight by a client disconnect.
pub struct ActiveRequestGuard(Gauge);

impl ActiveRequestGuard {
    pub fn new(provider: &str) -> Self {
        let gauge = get_metrics()
            .active_requests
            .with_label_values(&[provider]);
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}
