//! Connection handles.
//!
//! A [`ConnectionHandle`] is the hub's view of one client: an identity, a
//! bounded outbound queue drained by the connection's writer task, and a
//! close signal shared by the connection's reader and writer.

use crate::traits::{ConnectionId, SendError};
use linkpulse_protocol::{codec, ServerMessage};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default write timeout for a single outbound message.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default outbound queue depth per connection.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// A frame queued for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Pre-encoded JSON text, shared across all recipients of a broadcast.
    Text(Arc<str>),
    /// Protocol-level ping.
    Ping,
}

/// Handle to one client connection.
///
/// Handles are cheap to clone and compare by connection ID.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Outbound>,
    write_timeout: Duration,
    token: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    ///
    /// The handle's close signal is a child of `parent`, so cancelling the
    /// parent closes every connection created from it.
    #[must_use]
    pub fn channel(
        id: ConnectionId,
        capacity: usize,
        write_timeout: Duration,
        parent: &CancellationToken,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id,
            outbound,
            write_timeout,
            token: parent.child_token(),
        };
        (handle, rx)
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue a frame for the client.
    ///
    /// Waits at most the write timeout for queue space. No retry is made.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the connection is closed and
    /// [`SendError::Timeout`] if the client is too slow.
    pub async fn send(&self, frame: Outbound) -> Result<(), SendError> {
        if self.token.is_cancelled() {
            return Err(SendError::Closed);
        }

        tokio::select! {
            _ = self.token.cancelled() => Err(SendError::Closed),
            result = tokio::time::timeout(self.write_timeout, self.outbound.send(frame)) => {
                match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(SendError::Closed),
                    Err(_) => Err(SendError::Timeout),
                }
            }
        }
    }

    /// Encode and queue a single message.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send), plus [`SendError::Encode`].
    pub async fn send_message(&self, message: &ServerMessage) -> Result<(), SendError> {
        let text = codec::encode(message).map_err(|_| SendError::Encode)?;
        self.send(Outbound::Text(text.into())).await
    }

    /// Queue a protocol-level ping.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn ping(&self) -> Result<(), SendError> {
        self.send(Outbound::Ping).await
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Check if the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        self.token.cancelled().await;
    }

    /// The close signal, for tasks that drive this connection.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
