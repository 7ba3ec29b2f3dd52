//! Message types for the LinkPulse protocol.
//!
//! Clients speak JSON text frames. Inbound messages are decoded once at the
//! boundary into the closed [`ClientMessage`] enum; outbound messages all
//! share the [`ServerMessage`] envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum short code length.
pub const MAX_SHORT_CODE_LENGTH: usize = 256;

/// Validate a short code used as a subscription topic.
///
/// # Errors
///
/// Returns an error message if the short code is invalid.
pub fn validate_short_code(code: &str) -> Result<(), &'static str> {
    if code.is_empty() {
        return Err("Short code cannot be empty");
    }
    if code.len() > MAX_SHORT_CODE_LENGTH {
        return Err("Short code too long");
    }
    if !code.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Short code contains invalid characters");
    }
    Ok(())
}

/// A message sent by a dashboard client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Start receiving updates for a short code.
    Subscribe {
        /// Short code to subscribe to.
        short_code: String,
    },

    /// Stop receiving updates for a short code.
    Unsubscribe {
        /// Short code to unsubscribe from.
        short_code: String,
    },

    /// Application-level keepalive. Answered with a `pong`.
    Ping {
        /// Echoed back in the pong, may be empty.
        short_code: String,
    },
}

impl ClientMessage {
    /// Create a Subscribe message.
    #[must_use]
    pub fn subscribe(short_code: impl Into<String>) -> Self {
        ClientMessage::Subscribe {
            short_code: short_code.into(),
        }
    }

    /// Create an Unsubscribe message.
    #[must_use]
    pub fn unsubscribe(short_code: impl Into<String>) -> Self {
        ClientMessage::Unsubscribe {
            short_code: short_code.into(),
        }
    }

    /// Get the short code carried by this message.
    #[must_use]
    pub fn short_code(&self) -> &str {
        match self {
            ClientMessage::Subscribe { short_code }
            | ClientMessage::Unsubscribe { short_code }
            | ClientMessage::Ping { short_code } => short_code,
        }
    }
}

/// The raw shape of an inbound JSON object, before the `type` is resolved.
#[derive(Debug, Deserialize)]
pub(crate) struct RawClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub short_code: String,
}

/// Outbound message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A click on the short link.
    Click,
    /// A conversion attributed to the short link.
    Conversion,
    /// Periodic aggregate snapshot.
    AnalyticsUpdate,
    /// Snapshot sent right after subscribing.
    InitialAnalytics,
    /// Server keepalive.
    Ping,
    /// Reply to a client ping.
    Pong,
}

impl MessageType {
    /// Wire name of this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Click => "click",
            MessageType::Conversion => "conversion",
            MessageType::AnalyticsUpdate => "analytics_update",
            MessageType::InitialAnalytics => "initial_analytics",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message sent to dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Short code the message is about.
    pub short_code: String,
    /// Type-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Creation time, serialized as RFC 3339.
    pub timestamp: DateTime<Utc>,
}

impl ServerMessage {
    /// Create a new message stamped with the current time.
    #[must_use]
    pub fn new(kind: MessageType, short_code: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind,
            short_code: short_code.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Create a pong in reply to a client ping.
    #[must_use]
    pub fn pong(short_code: impl Into<String>) -> Self {
        Self::new(MessageType::Pong, short_code, serde_json::Value::Null)
    }
}
