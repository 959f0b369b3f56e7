//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests by outcome, latency, backend health)
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `flowgate_requests_total` (counter): dispatched connections by outcome
//! - `flowgate_request_duration_seconds` (histogram): end-to-end dispatch latency
//! - `flowgate_active_connections` (gauge): current client connection count
//! - `flowgate_backend_failures_total` (counter): failures reported per backend
//! - `flowgate_backend_available` (gauge): 1=available, 0=cooling down
//!
//! Without an installed recorder every call below is a no-op, so the
//! dispatcher and tracker can record unconditionally.

use std::net::SocketAddr;
use std::time::Instant;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from inside the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("flowgate_requests_total", "Client connections dispatched, by outcome");
    describe_histogram!("flowgate_request_duration_seconds", "Dispatch latency in seconds");
    describe_gauge!("flowgate_active_connections", "Open client connections");
    describe_counter!("flowgate_backend_failures_total", "Failures reported per backend");
    describe_gauge!("flowgate_backend_available", "1 when the backend is selectable");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one finished dispatch.
pub fn record_request(outcome: &'static str, start: Instant) {
    counter!("flowgate_requests_total", "outcome" => outcome).increment(1);
    histogram!("flowgate_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_active_connections(count: u64) {
    gauge!("flowgate_active_connections").set(count as f64);
}

pub fn record_backend_failure(backend: &str) {
    counter!("flowgate_backend_failures_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_backend_available(backend: &str, available: bool) {
    gauge!("flowgate_backend_available", "backend" => backend.to_string())
        .set(if available { 1.0 } else { 0.0 });
}
