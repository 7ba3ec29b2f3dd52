//! Transport abstraction traits for LinkPulse.
//!
//! The hub never touches sockets. It sees connections only through
//! [`ConnectionHandle`](crate::ConnectionHandle) for writing and the
//! [`Connection`] trait for reading.

use async_trait::async_trait;
use linkpulse_protocol::{ClientMessage, ProtocolError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}", n))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No frame arrived before the read deadline.
    #[error("Read deadline exceeded")]
    ReadTimeout,

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from [`ConnectionHandle::send`](crate::ConnectionHandle::send).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection has been closed.
    #[error("Connection closed")]
    Closed,

    /// The client did not accept the message within the write timeout.
    #[error("Write timed out")]
    Timeout,

    /// The message could not be encoded.
    #[error("Encoding failed")]
    Encode,
}

/// The receiving half of an active connection.
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next client message.
    ///
    /// Each successful frame, including protocol-level pongs, resets the read
    /// deadline. Malformed messages are skipped. Any error is terminal.
    async fn receive(&mut self) -> Result<ClientMessage, TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}
