//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by method, status
//! - `edge_request_duration_seconds` (histogram): latency distribution
//! - `edge_rate_limited_total` (counter): requests rejected with 429
//! - `edge_rate_limit_clients` (gauge): clients tracked by the limiter
//! - `edge_panics_total` (counter): handler panics caught by recovery
//! - `edge_active_connections` (gauge): current connection count
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "edge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("edge_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("edge_rate_limited_total").increment(1);
}

pub fn record_client_tracked() {
    gauge!("edge_rate_limit_clients").increment(1.0);
}

pub fn record_panic() {
    counter!("edge_panics_total").increment(1);
}

pub fn connection_opened() {
    gauge!("edge_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("edge_active_connections").decrement(1.0);
}
