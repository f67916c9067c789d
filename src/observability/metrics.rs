//! Metrics collection and exposition.
//!
//! # Metrics
//! - `smart_client_requests_total` (counter): requests by host and outcome
//! - `smart_client_host_healthy` (gauge): 1=eligible, 0=not
//! - `smart_client_probe_failures_total` (counter): failed probes by host
//! - `smart_client_topology_refresh_total` (counter): refreshes by vdc and outcome
//! - `smart_client_evictions_total` (counter): hosts taken out of rotation

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(host: &str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    metrics::counter!(
        "smart_client_requests_total",
        "host" => host.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_host_health(host: &str, healthy: bool) {
    metrics::gauge!("smart_client_host_healthy", "host" => host.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_probe_failure(host: &str) {
    metrics::counter!("smart_client_probe_failures_total", "host" => host.to_string()).increment(1);
}

pub fn record_topology_refresh(vdc: &str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    metrics::counter!(
        "smart_client_topology_refresh_total",
        "vdc" => vdc.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_eviction(host: &str) {
    metrics::counter!("smart_client_evictions_total", "host" => host.to_string()).increment(1);
}
