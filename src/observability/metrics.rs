//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, short-circuits, reloads)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_short_circuits_total` (counter): terminal responses by stage
//! - `gateway_upstream_errors_total` (counter): downstream failures by kind
//! - `gateway_route_reloads_total` (counter): reload outcomes
//! - `gateway_route_table_generation` (gauge): active table generation
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed proxied request.
pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a stage producing a terminal response.
pub fn record_short_circuit(stage: &'static str, status: u16) {
    counter!(
        "gateway_short_circuits_total",
        "stage" => stage,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_upstream_error(route: &str, kind: &'static str) {
    counter!(
        "gateway_upstream_errors_total",
        "route" => route.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_route_reload(success: bool) {
    let outcome = if success { "applied" } else { "rejected" };
    counter!("gateway_route_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_route_table(generation: u64, routes: usize) {
    gauge!("gateway_route_table_generation").set(generation as f64);
    gauge!("gateway_route_table_routes").set(routes as f64);
}
