//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): requests by method, status, outcome
//! - `dispatch_request_duration_seconds` (histogram): latency distribution
//! - `multipart_uploads_total` (counter): classifier outcomes
//!
//! Recording is a no-op until a recorder is installed, so tests and embedders
//! that never call `init_metrics` pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// How a dispatch concluded, used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    NotFound,
    InvalidUrl,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Handled => "handled",
            Outcome::NotFound => "not_found",
            Outcome::InvalidUrl => "invalid_url",
            Outcome::Failed => "failed",
        }
    }
}

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, outcome: Outcome, start: Instant) {
    let status = status.to_string();
    counter!(
        "dispatch_requests_total",
        "method" => method.to_string(),
        "status" => status.clone(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!(
        "dispatch_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status,
        "outcome" => outcome.as_str()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_upload(outcome: &'static str) {
    counter!("multipart_uploads_total", "outcome" => outcome).increment(1);
}
