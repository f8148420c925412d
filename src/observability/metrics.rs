//! Metrics collection and exposition.
//!
//! # Metrics
//! - `upstream_connect_attempts_total` (counter): connect attempts by pool
//! - `upstream_connect_failures_total` (counter): failed attempts by pool
//! - `upstream_hosts_marked_down_total` (counter): committer transitions by pool
//! - `upstream_hosts_revived_total` (counter): reconciler transitions by pool
//! - `upstream_background_errors_total` (counter): soft failures by kind
//! - `upstream_leader` (gauge): 1 while the worker reconciles, else 0

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connect_attempt(pool: &str) {
    counter!("upstream_connect_attempts_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_connect_failure(pool: &str) {
    counter!("upstream_connect_failures_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_host_down(pool: &str) {
    counter!("upstream_hosts_marked_down_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_host_revived(pool: &str) {
    counter!("upstream_hosts_revived_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_background_error(kind: &'static str) {
    counter!("upstream_background_errors_total", "kind" => kind).increment(1);
}

pub fn record_leadership(worker: &str, leader: bool) {
    gauge!("upstream_leader", "worker" => worker.to_string()).set(if leader { 1.0 } else { 0.0 });
}
