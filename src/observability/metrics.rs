//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (requests, connections, frames, broadcasts)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `connections_accepted_total` (counter): accepted TCP connections
//! - `http_requests_total` (counter): HTTP responses by method, status
//! - `http_request_duration_seconds` (histogram): time from parse to write
//! - `ws_connections_active` (gauge): registered WebSocket connections
//! - `ws_frames_received_total` (counter): decoded client frames by opcode
//! - `ws_broadcasts_total` (counter): broadcasts by scope
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - Labels for method, status code, opcode and scope

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
///
/// Must be called from within the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_accepted() {
    ::metrics::counter!("connections_accepted_total").increment(1);
}

pub fn record_request(method: &str, status: u16, start_time: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    ::metrics::counter!("http_requests_total", "method" => method.clone(), "status" => status.clone())
        .increment(1);
    ::metrics::histogram!("http_request_duration_seconds", "method" => method, "status" => status)
        .record(start_time.elapsed().as_secs_f64());
}

pub fn set_ws_connections(count: usize) {
    ::metrics::gauge!("ws_connections_active").set(count as f64);
}

pub fn record_ws_frame(opcode: &'static str) {
    ::metrics::counter!("ws_frames_received_total", "opcode" => opcode).increment(1);
}

pub fn record_broadcast(scope: &'static str) {
    ::metrics::counter!("ws_broadcasts_total", "scope" => scope).increment(1);
}
