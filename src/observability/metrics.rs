//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, module
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_registry_lookups_total` (counter): by outcome hit/miss/stale/error
//! - `gateway_pool_dials_total` (counter): by outcome ok/error
//! - `gateway_pool_connections` (gauge): pooled channels
//! - `gateway_rate_limited_total` (counter)
//! - `gateway_upload_files_total`, `gateway_upload_bytes_total` (counters)
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so
//! tests never need a recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, module: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "module" => module.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "module" => module.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_registry_lookup(outcome: &'static str) {
    counter!("gateway_registry_lookups_total", "outcome" => outcome).increment(1);
}

pub fn record_pool_dial(outcome: &'static str) {
    counter!("gateway_pool_dials_total", "outcome" => outcome).increment(1);
}

pub fn record_pool_size(size: usize) {
    gauge!("gateway_pool_connections").set(size as f64);
}

pub fn record_rate_limited(reason: &'static str) {
    counter!("gateway_rate_limited_total", "reason" => reason).increment(1);
}

pub fn record_upload(files: usize, bytes: u64) {
    counter!("gateway_upload_files_total").increment(files as u64);
    counter!("gateway_upload_bytes_total").increment(bytes);
}
