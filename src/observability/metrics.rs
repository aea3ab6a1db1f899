//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_requests_total` (counter): requests by `outcome`
//!   (`handled`, `not_found`, `fault`, `error`)
//! - `router_resolution_depth` (histogram): resolution steps per request
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - The Prometheus exporter is optional and serves its own listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "router_requests_total";
pub const RESOLUTION_DEPTH: &str = "router_resolution_depth";

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    ::metrics::describe_counter!(REQUESTS_TOTAL, "Requests served, by routing outcome");
    ::metrics::describe_histogram!(RESOLUTION_DEPTH, "Resolution steps taken per request");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_outcome(outcome: &'static str) {
    ::metrics::counter!(REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_depth(depth: usize) {
    ::metrics::histogram!(RESOLUTION_DEPTH).record(depth as f64);
}
