//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define monitor metrics (probes, latency, connectivity, trips)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-endpoint and aggregate metrics
//!
//! # Metrics
//! - `endpoint_probes_total` (counter): probes by endpoint, outcome
//! - `endpoint_probe_duration_seconds` (histogram): successful probe latency
//! - `endpoint_connected` (gauge): 1=connected, 0=disconnected
//! - `endpoint_circuit_trips_total` (counter): trips by endpoint
//! - `endpoint_monitor_paused` (gauge): 1 while monitoring is paused
//! - `endpoints_monitored` (gauge): registered endpoints
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The exporter is optional and owns its own HTTP listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_probe(endpoint: &str, success: bool, elapsed_ms: u64) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(
        "endpoint_probes_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    if success {
        metrics::histogram!("endpoint_probe_duration_seconds", "endpoint" => endpoint.to_string())
            .record(elapsed_ms as f64 / 1000.0);
    }

    metrics::gauge!("endpoint_connected", "endpoint" => endpoint.to_string())
        .set(if success { 1.0 } else { 0.0 });
}

pub fn record_circuit_trip(endpoint: &str) {
    metrics::counter!("endpoint_circuit_trips_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Zero the connectivity gauge of an endpoint that is no longer monitored.
pub fn clear_endpoint(endpoint: &str) {
    metrics::gauge!("endpoint_connected", "endpoint" => endpoint.to_string()).set(0.0);
}

pub fn set_paused(paused: bool) {
    metrics::gauge!("endpoint_monitor_paused").set(if paused { 1.0 } else { 0.0 });
}

pub fn set_monitored_endpoints(count: usize) {
    metrics::gauge!("endpoints_monitored").set(count as f64);
}
