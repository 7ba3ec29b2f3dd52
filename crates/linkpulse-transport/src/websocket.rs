//! WebSocket transport implementation.
//!
//! Drives the two halves of an axum [`WebSocket`]: the reader decodes client
//! messages under a read deadline, the writer drains a connection's outbound
//! queue under a write deadline.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use linkpulse_protocol::{codec, ClientMessage, ProtocolError};
use std::fmt::Display;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::handle::{Outbound, DEFAULT_WRITE_TIMEOUT};
use crate::traits::{Connection, TransportError};

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// How long to wait for any frame from the client before giving up.
    pub read_timeout: Duration,
    /// How long a single write may take.
    pub write_timeout: Duration,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(60),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_message_size: codec::MAX_MESSAGE_SIZE,
        }
    }
}

/// The receiving half of a WebSocket connection.
pub struct WebSocketConnection<S = SplitStream<WebSocket>> {
    stream: S,
    read_timeout: Duration,
    max_message_size: usize,
    remote_addr: Option<SocketAddr>,
}

impl<S> WebSocketConnection<S>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    /// Wrap the read half of a socket.
    #[must_use]
    pub fn new(stream: S, config: &WebSocketConfig) -> Self {
        Self {
            stream,
            read_timeout: config.read_timeout,
            max_message_size: config.max_message_size,
            remote_addr: None,
        }
    }

    /// Attach the peer address, for logging.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

#[async_trait]
impl<S> Connection for WebSocketConnection<S>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    async fn receive(&mut self) -> Result<ClientMessage, TransportError> {
        loop {
            // A fresh deadline per frame: any frame, pongs included, extends it.
            let next = tokio::time::timeout(self.read_timeout, self.stream.next())
                .await
                .map_err(|_| TransportError::ReadTimeout)?;

            match next {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > self.max_message_size {
                        warn!(
                            "Message too large: {} bytes (max: {})",
                            text.len(),
                            self.max_message_size
                        );
                        return Err(ProtocolError::MessageTooLarge(text.len()).into());
                    }

                    match codec::decode(&text) {
                        Ok(message) => return Ok(message),
                        Err(e) if e.is_fatal() => return Err(e.into()),
                        Err(e) => debug!(error = %e, "Ignoring client message"),
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(bytes = data.len(), "Ignoring binary frame");
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    trace!("Control frame received");
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }
}

/// Drain a connection's outbound queue into the socket.
///
/// Runs until the queue closes, the connection is closed, or a write fails
/// or exceeds `write_timeout`. On exit the connection is closed so the
/// reader observes it too.
pub async fn run_writer<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Outbound>,
    token: CancellationToken,
    write_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    loop {
        let frame = tokio::select! {
            biased;

            _ = token.cancelled() => break,

            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let message = match frame {
            Outbound::Text(text) => Message::Text(text.to_string()),
            Outbound::Ping => Message::Ping(Vec::new()),
        };

        match tokio::time::timeout(write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "WebSocket write failed");
                break;
            }
            Err(_) => {
                debug!("WebSocket write deadline exceeded");
                break;
            }
        }
    }

    token.cancel();
    let _ = tokio::time::timeout(write_timeout, sink.close()).await;
}
