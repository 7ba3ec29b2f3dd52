//! Metrics collection and export for LinkPulse.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format. Hub-level metrics live in
//! [`linkpulse_core::telemetry`]; they are described here as well so the
//! exporter shows help text for them.

use linkpulse_core::telemetry::names as hub;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "linkpulse_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "linkpulse_connections_active";
    pub const EVENTS_TOTAL: &str = "linkpulse_events_total";
    pub const ERRORS_TOTAL: &str = "linkpulse_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of WebSocket connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open WebSocket connections"
    );
    metrics::describe_counter!(
        names::EVENTS_TOTAL,
        "Producer events received over HTTP, by kind and outcome"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    metrics::describe_counter!(hub::BROADCASTS_TOTAL, "Updates fanned out by the hub");
    metrics::describe_counter!(
        hub::BROADCASTS_DROPPED_TOTAL,
        "Updates dropped because the broadcast queue was full"
    );
    metrics::describe_counter!(hub::DELIVERIES_TOTAL, "Messages queued to subscribers");
    metrics::describe_counter!(
        hub::EVICTIONS_TOTAL,
        "Connections evicted after a failed or timed out send"
    );
    metrics::describe_gauge!(
        hub::CONNECTIONS_REGISTERED,
        "Connections registered with the hub"
    );
    metrics::describe_gauge!(hub::TOPICS_ACTIVE, "Topics with at least one subscriber");
    metrics::describe_counter!(
        hub::SNAPSHOT_FAILURES_TOTAL,
        "Analytics snapshot fetches that failed or timed out"
    );
    metrics::describe_counter!(
        hub::SUBSCRIBES_REJECTED_TOTAL,
        "Subscribes refused by a per-connection or topic limit"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a producer event.
pub fn record_event(kind: &'static str, outcome: &'static str) {
    counter!(names::EVENTS_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
