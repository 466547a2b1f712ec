//! Metrics collection and exposition.
//!
//! # Metrics
//! - `waypoint_listeners_started_total` (counter): listeners brought up, by endpoint
//! - `waypoint_listener_close_errors_total` (counter): failed closes, by endpoint
//! - `waypoint_accept_loop_failures_total` (counter): abnormal accept loop exits
//! - `waypoint_connections_total` (counter): accepted connections, by endpoint
//! - `waypoint_active_connections` (gauge): open connections, by endpoint
//! - `waypoint_jumps_total` (counter): directory jumps, by target endpoint

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_listener_started(endpoint: &str) {
    counter!("waypoint_listeners_started_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_close_error(endpoint: &str) {
    counter!("waypoint_listener_close_errors_total", "endpoint" => endpoint.to_string())
        .increment(1);
}

pub fn record_accept_loop_failure(endpoint: &str) {
    counter!("waypoint_accept_loop_failures_total", "endpoint" => endpoint.to_string())
        .increment(1);
}

pub fn record_connection_opened(endpoint: &str) {
    counter!("waypoint_connections_total", "endpoint" => endpoint.to_string()).increment(1);
    gauge!("waypoint_active_connections", "endpoint" => endpoint.to_string()).increment(1.0);
}

pub fn record_connection_closed(endpoint: &str) {
    gauge!("waypoint_active_connections", "endpoint" => endpoint.to_string()).decrement(1.0);
}

pub fn record_jump(target: &str) {
    counter!("waypoint_jumps_total", "target" => target.to_string()).increment(1);
}
