//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, service, status
//! - `gateway_request_duration_seconds` (histogram): latency by service
//! - `gateway_rate_limited_total` (counter): admissions rejected
//! - `gateway_service_healthy` (gauge): 1=healthy, 0=unhealthy, per service
//! - `gateway_active_tunnels` (gauge): open WebSocket tunnels
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests never need to call [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_service_health(service: &str, healthy: bool) {
    gauge!("gateway_service_healthy", "service" => service.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn tunnel_opened() {
    gauge!("gateway_active_tunnels").increment(1.0);
}

pub fn tunnel_closed() {
    gauge!("gateway_active_tunnels").decrement(1.0);
}
