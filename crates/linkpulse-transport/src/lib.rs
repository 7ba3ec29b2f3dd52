//! # linkpulse-transport
//!
//! Transport layer for the LinkPulse analytics hub.
//!
//! - [`ConnectionHandle`] - the hub's write-side view of a client: bounded
//!   outbound queue, write timeout and an idempotent close
//! - [`Connection`] - the read side, one decoded [`ClientMessage`] at a time
//! - **WebSocket** - reader and writer loops over an axum socket
//!
//! ```rust,ignore
//! use linkpulse_transport::{Connection, ConnectionHandle};
//!
//! async fn read_loop(mut conn: impl Connection) {
//!     while let Ok(message) = conn.receive().await {
//!         // Dispatch message
//!     }
//! }
//! ```
//!
//! [`ClientMessage`]: linkpulse_protocol::ClientMessage

pub mod handle;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use handle::{ConnectionHandle, Outbound};
pub use traits::{Connection, ConnectionId, SendError, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnection};
