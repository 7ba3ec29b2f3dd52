//! # linkpulse-protocol
//!
//! Wire protocol definitions for the LinkPulse real-time analytics hub.
//!
//! Dashboard clients connect over WebSocket and exchange JSON text frames:
//!
//! - `subscribe` / `unsubscribe` - Topic (short code) membership
//! - `ping` - Application keepalive, answered with `pong`
//!
//! The server pushes `click`, `conversion`, `analytics_update`,
//! `initial_analytics`, `ping` and `pong` messages.
//!
//! ## Example
//!
//! ```rust
//! use linkpulse_protocol::{codec, ClientMessage};
//!
//! let msg = codec::decode(r#"{"type":"subscribe","short_code":"abc123"}"#).unwrap();
//! assert_eq!(msg, ClientMessage::subscribe("abc123"));
//! ```

pub mod codec;
pub mod messages;

pub use codec::{decode, encode, ProtocolError};
pub use messages::{validate_short_code, ClientMessage, MessageType, ServerMessage};
