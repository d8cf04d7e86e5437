//! Metrics collection and exposition.
//!
//! # Metrics
//! - `stream_manager_accepted_total` (counter): connections admitted to the backlog
//! - `stream_manager_rejected_total` (counter): rejected connections by `reason`
//! - `stream_manager_evicted_total` (counter): idle streams evicted
//! - `stream_manager_orphaned_total` (counter): streams that outlived their socket
//! - `stream_manager_active_streams` (gauge): claimed streams holding a socket
//! - `stream_manager_pending_connections` (gauge): admitted, unclaimed connections
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   every call is a no-op
//! - The Prometheus exporter is only installed by the daemon

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

pub fn record_accepted() {
    metrics::counter!("stream_manager_accepted_total").increment(1);
}

pub fn record_rejected(reason: &'static str) {
    metrics::counter!("stream_manager_rejected_total", "reason" => reason).increment(1);
}

pub fn record_evicted() {
    metrics::counter!("stream_manager_evicted_total").increment(1);
}

pub fn record_orphaned() {
    metrics::counter!("stream_manager_orphaned_total").increment(1);
}

pub fn record_occupancy(active: usize, pending: usize) {
    metrics::gauge!("stream_manager_active_streams").set(active as f64);
    metrics::gauge!("stream_manager_pending_connections").set(pending as f64);
}

/// Install the Prometheus exporter with an HTTP scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}
