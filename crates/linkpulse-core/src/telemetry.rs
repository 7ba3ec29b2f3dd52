//! Hub-level metrics.
//!
//! Recorded through the `metrics` facade; the server installs the exporter.

use crate::update::UpdateKind;
use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const BROADCASTS_TOTAL: &str = "linkpulse_broadcasts_total";
    pub const BROADCASTS_DROPPED_TOTAL: &str = "linkpulse_broadcasts_dropped_total";
    pub const DELIVERIES_TOTAL: &str = "linkpulse_deliveries_total";
    pub const EVICTIONS_TOTAL: &str = "linkpulse_evictions_total";
    pub const CONNECTIONS_REGISTERED: &str = "linkpulse_connections_registered";
    pub const TOPICS_ACTIVE: &str = "linkpulse_topics_active";
    pub const SNAPSHOT_FAILURES_TOTAL: &str = "linkpulse_snapshot_failures_total";
    pub const SUBSCRIBES_REJECTED_TOTAL: &str = "linkpulse_subscribes_rejected_total";
}

/// Record a broadcast that reached `recipients` subscribers.
pub fn record_broadcast(kind: UpdateKind, recipients: usize) {
    counter!(names::BROADCASTS_TOTAL, "kind" => kind.as_str()).increment(1);
    counter!(names::DELIVERIES_TOTAL, "kind" => kind.as_str()).increment(recipients as u64);
}

/// Record a broadcast dropped because the hub queue was full.
pub fn record_dropped(kind: UpdateKind) {
    counter!(names::BROADCASTS_DROPPED_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Record a connection removed by the hub after a failed send.
pub fn record_eviction(reason: &'static str) {
    counter!(names::EVICTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Update the registry and topic gauges.
pub fn set_sizes(connections: usize, topics: usize) {
    gauge!(names::CONNECTIONS_REGISTERED).set(connections as f64);
    gauge!(names::TOPICS_ACTIVE).set(topics as f64);
}

/// Record a failed snapshot fetch.
pub fn record_snapshot_failure(stage: &'static str) {
    counter!(names::SNAPSHOT_FAILURES_TOTAL, "stage" => stage).increment(1);
}

/// Record a subscribe refused by a hub limit.
pub fn record_subscribe_rejected(limit: &'static str) {
    counter!(names::SUBSCRIBES_REJECTED_TOTAL, "limit" => limit).increment(1);
}
