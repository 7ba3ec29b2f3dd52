//! Codec for encoding and decoding LinkPulse messages.
//!
//! Messages travel as JSON text frames, one message per frame.

use thiserror::Error;

use crate::messages::{validate_short_code, ClientMessage, RawClientMessage, ServerMessage};

/// Maximum inbound message size (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message exceeds maximum size.
    #[error("Message size {0} exceeds maximum {MAX_MESSAGE_SIZE}")]
    MessageTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The `type` field names no known message.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// Invalid message data.
    #[error("Invalid message: {0}")]
    Invalid(&'static str),
}

impl ProtocolError {
    /// Whether the peer should be disconnected for this error.
    ///
    /// Oversized messages are a protocol violation; everything else is
    /// skipped and the connection stays open.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::MessageTooLarge(_))
    }
}

/// Encode a server message to a JSON string.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(message: &ServerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a client message from a JSON string.
///
/// # Errors
///
/// Returns an error if the text is too large, not a JSON object, has an
/// unknown `type`, or a subscribe/unsubscribe lacks a valid `short_code`.
pub fn decode(text: &str) -> Result<ClientMessage, ProtocolError> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(text.len()));
    }

    let raw: RawClientMessage = serde_json::from_str(text)?;

    match raw.kind.as_str() {
        "subscribe" => {
            validate_short_code(&raw.short_code).map_err(ProtocolError::Invalid)?;
            Ok(ClientMessage::Subscribe {
                short_code: raw.short_code,
            })
        }
        "unsubscribe" => {
            validate_short_code(&raw.short_code).map_err(ProtocolError::Invalid)?;
            Ok(ClientMessage::Unsubscribe {
                short_code: raw.short_code,
            })
        }
        "ping" => Ok(ClientMessage::Ping {
            short_code: raw.short_code,
        }),
        _ => Err(ProtocolError::UnknownType(raw.kind)),
    }
}
