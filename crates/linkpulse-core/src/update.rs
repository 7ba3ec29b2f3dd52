//! Updates fanned out by the hub.
//!
//! An [`Update`] is produced once (by a click recorder, conversion tracker or
//! the refresher), consumed once by the hub, and copied to every subscriber
//! of its topic as an encoded [`ServerMessage`].

use crate::analytics::AggregateAnalytics;
use chrono::{DateTime, Utc};
use linkpulse_protocol::{codec, MessageType, ProtocolError, ServerMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What an update reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// A click occurred.
    Click,
    /// A conversion occurred.
    Conversion,
    /// Periodic aggregate snapshot.
    AnalyticsSnapshot,
    /// Snapshot for a fresh subscriber.
    InitialSnapshot,
}

impl UpdateKind {
    /// The outbound message type for this kind.
    #[must_use]
    pub fn message_type(self) -> MessageType {
        match self {
            UpdateKind::Click => MessageType::Click,
            UpdateKind::Conversion => MessageType::Conversion,
            UpdateKind::AnalyticsSnapshot => MessageType::AnalyticsUpdate,
            UpdateKind::InitialSnapshot => MessageType::InitialAnalytics,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateKind::Click => "click",
            UpdateKind::Conversion => "conversion",
            UpdateKind::AnalyticsSnapshot => "analytics_snapshot",
            UpdateKind::InitialSnapshot => "initial_snapshot",
        }
    }
}

/// Payload of a click update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Visitor IP address.
    pub ip_address: String,
    /// Visitor user agent.
    pub user_agent: String,
    /// HTTP referrer, empty when direct.
    pub referrer: String,
}

/// An immutable event addressed to one topic.
#[derive(Debug, Clone)]
pub struct Update {
    /// Kind of event.
    pub kind: UpdateKind,
    /// Short code the event belongs to.
    pub topic: String,
    /// Event payload.
    pub payload: serde_json::Value,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Update {
    /// Create an update stamped with the current time.
    #[must_use]
    pub fn new(kind: UpdateKind, topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind,
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// A click on `topic`.
    #[must_use]
    pub fn click(topic: impl Into<String>, event: &ClickEvent) -> Self {
        Self::new(
            UpdateKind::Click,
            topic,
            serde_json::to_value(event).unwrap_or_default(),
        )
    }

    /// A conversion on `topic`.
    #[must_use]
    pub fn conversion(topic: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(UpdateKind::Conversion, topic, data)
    }

    /// A periodic snapshot for `topic`.
    #[must_use]
    pub fn analytics_snapshot(topic: impl Into<String>, snapshot: &AggregateAnalytics) -> Self {
        Self::new(
            UpdateKind::AnalyticsSnapshot,
            topic,
            serde_json::to_value(snapshot).unwrap_or_default(),
        )
    }

    /// The snapshot sent to a new subscriber of `topic`.
    #[must_use]
    pub fn initial_snapshot(topic: impl Into<String>, snapshot: &AggregateAnalytics) -> Self {
        Self::new(
            UpdateKind::InitialSnapshot,
            topic,
            serde_json::to_value(snapshot).unwrap_or_default(),
        )
    }

    /// Convert to the wire envelope.
    #[must_use]
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage {
            kind: self.kind.message_type(),
            short_code: self.topic.clone(),
            data: self.payload.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Encode once for sharing across all recipients.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Arc<str>, ProtocolError> {
        codec::encode(&self.to_message()).map(Arc::from)
    }
}
