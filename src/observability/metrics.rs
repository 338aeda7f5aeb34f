//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (requests, latency, route misses, aborted streams)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): total requests by method, status
//! - `switchyard_request_duration_seconds` (histogram): latency distribution
//! - `switchyard_route_misses_total` (counter): requests no route accepted
//! - `switchyard_stream_aborts_total` (counter): transfers cut short by the peer
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Recording is a no-op until an exporter is installed

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "switchyard_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "switchyard_request_duration_seconds";
pub const ROUTE_MISSES_TOTAL: &str = "switchyard_route_misses_total";
pub const STREAM_ABORTS_TOTAL: &str = "switchyard_stream_aborts_total";

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

/// Count a finished request and record its latency.
pub fn record_request(method: &str, status: u16, started: Instant) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

pub fn record_route_miss() {
    metrics::counter!(ROUTE_MISSES_TOTAL).increment(1);
}

pub fn record_stream_abort() {
    metrics::counter!(STREAM_ABORTS_TOTAL).increment(1);
}
