//! Prometheus Metrics Definitions
//!
//! Defines all repolens metrics and exposes a /metrics endpoint for
//! Prometheus scraping.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};
use repolens_storage::{Gateway, GatewayStats};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Analyses can take tens of seconds, so the upper buckets reach a minute.
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<RepolensMetrics>> = Lazy::new(RepolensMetrics::new);

/// Container for all repolens metrics.
#[derive(Clone)]
pub struct RepolensMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Gateway outcome counter - labels: outcome
    pub gateway_outcomes_total: CounterVec,

    /// Analyses currently running
    pub analyses_in_flight: IntGauge,

    /// Requests that joined an analysis already in flight, since startup
    pub coalesced_requests: IntGauge,

    /// Store writes that failed and were absorbed, since startup
    pub store_write_failures: IntGauge,
}

fn registration_error(name: &str, err: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, err))
}

impl RepolensMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "repolens_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "repolens_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            gateway_outcomes_total: register_counter_vec!(
                "repolens_gateway_outcomes_total",
                "Analysis requests by outcome",
                &["outcome"]
            )
            .map_err(|e| registration_error("gateway_outcomes_total", e))?,

            analyses_in_flight: register_int_gauge!(
                "repolens_analyses_in_flight",
                "Analyses currently running"
            )
            .map_err(|e| registration_error("analyses_in_flight", e))?,

            coalesced_requests: register_int_gauge!(
                "repolens_coalesced_requests",
                "Requests that joined an in-flight analysis since startup"
            )
            .map_err(|e| registration_error("coalesced_requests", e))?,

            store_write_failures: register_int_gauge!(
                "repolens_store_write_failures",
                "Store writes that failed and were absorbed since startup"
            )
            .map_err(|e| registration_error("store_write_failures", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record the outcome of one analysis request.
    pub fn record_outcome(&self, outcome: &str) {
        self.gateway_outcomes_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Mirror the gateway's counters into gauges.
    pub fn observe_gateway(&self, stats: GatewayStats) {
        self.analyses_in_flight.set(stats.in_flight as i64);
        self.coalesced_requests.set(stats.coalesced as i64);
        self.store_write_failures.set(stats.store_write_failures as i64);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.observe_gateway(gateway.stats());
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
