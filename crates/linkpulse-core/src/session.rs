//! Per-connection read loop.
//!
//! Registers the connection, turns inbound client messages into hub commands,
//! and unregisters once the connection ends for any reason.

use crate::hub::HubHandle;
use linkpulse_protocol::{ClientMessage, ServerMessage};
use linkpulse_transport::{Connection, ConnectionHandle, TransportError};
use tracing::{debug, trace};

/// Drive one connection until it closes, errors or is evicted.
pub async fn run_session<C: Connection>(mut conn: C, handle: ConnectionHandle, hub: HubHandle) {
    let id = handle.id().clone();

    if let Err(e) = hub.register(handle.clone()).await {
        debug!(connection = %id, error = %e, "Hub unavailable, closing connection");
        handle.close();
        return;
    }
    debug!(connection = %id, remote = ?conn.remote_addr(), "Session started");

    loop {
        let message = tokio::select! {
            _ = handle.closed() => {
                debug!(connection = %id, "Connection closed by hub");
                break;
            }
            message = conn.receive() => message,
        };

        match message {
            Ok(ClientMessage::Subscribe { short_code }) => {
                trace!(connection = %id, short_code = %short_code, "Subscribe");
                if hub.subscribe(id.clone(), short_code).await.is_err() {
                    break;
                }
            }
            Ok(ClientMessage::Unsubscribe { short_code }) => {
                trace!(connection = %id, short_code = %short_code, "Unsubscribe");
                if hub.unsubscribe(id.clone(), short_code).await.is_err() {
                    break;
                }
            }
            Ok(ClientMessage::Ping { short_code }) => {
                if handle.send_message(&ServerMessage::pong(short_code)).await.is_err() {
                    break;
                }
            }
            Err(TransportError::ConnectionClosed) => {
                debug!(connection = %id, "Client disconnected");
                break;
            }
            Err(e) => {
                debug!(connection = %id, error = %e, "Connection error");
                break;
            }
        }
    }

    let _ = hub.unregister(id.clone()).await;
    handle.close();
    debug!(connection = %id, "Session ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Hub, HubConfig};
    use crate::testing::{eventually, next_message, ScriptedConnection, StaticAnalytics};
    use linkpulse_protocol::MessageType;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn start() -> (HubHandle, CancellationToken) {
        let token = CancellationToken::new();
        let (hub, handle) = Hub::new(
            HubConfig::default(),
            Arc::new(StaticAnalytics::default()),
            token.clone(),
        );
        tokio::spawn(hub.run());
        (handle, token)
    }

    #[tokio::test]
    async fn test_session_subscribes_and_receives() {
        let (hub, token) = start();
        let (conn, inbound) = ScriptedConnection::new();
        let (handle, mut rx) =
            ConnectionHandle::channel("s1".into(), 16, Duration::from_secs(1), &token);
        tokio::spawn(run_session(conn, handle, hub.clone()));

        inbound.send(ClientMessage::subscribe("abc123")).await.unwrap();
        assert_eq!(next_message(&mut rx).await.kind, MessageType::InitialAnalytics);

        hub.broadcast_click("abc123", "198.51.100.4", "Mozilla/5.0", "https://example.com")
            .unwrap();
        let click = next_message(&mut rx).await;
        assert_eq!(click.kind, MessageType::Click);
        assert_eq!(click.data["referrer"], "https://example.com");

        token.cancel();
    }

    #[tokio::test]
    async fn test_session_answers_ping() {
        let (hub, token) = start();
        let (conn, inbound) = ScriptedConnection::new();
        let (handle, mut rx) =
            ConnectionHandle::channel("s1".into(), 16, Duration::from_secs(1), &token);
        tokio::spawn(run_session(conn, handle, hub));

        inbound
            .send(ClientMessage::Ping {
                short_code: "abc123".into(),
            })
            .await
            .unwrap();

        let pong = next_message(&mut rx).await;
        assert_eq!(pong.kind, MessageType::Pong);
        assert_eq!(pong.short_code, "abc123");

        token.cancel();
    }

    #[tokio::test]
    async fn test_session_unregisters_on_disconnect() {
        let (hub, token) = start();
        let (conn, inbound) = ScriptedConnection::new();
        let (handle, _rx) =
            ConnectionHandle::channel("s1".into(), 16, Duration::from_secs(1), &token);
        let session = tokio::spawn(run_session(conn, handle.clone(), hub.clone()));

        inbound.send(ClientMessage::subscribe("abc123")).await.unwrap();
        eventually(|| async { hub.active_subscription_counts().await.unwrap().len() == 1 }).await;

        drop(inbound);
        session.await.unwrap();

        assert_eq!(hub.active_connection_count().await.unwrap(), 0);
        assert!(hub.active_subscription_counts().await.unwrap().is_empty());
        assert!(handle.is_closed());

        token.cancel();
    }

    #[tokio::test]
    async fn test_session_ends_when_evicted() {
        let (hub, token) = start();
        let (conn, _inbound) = ScriptedConnection::new();
        let (handle, _rx) =
            ConnectionHandle::channel("s1".into(), 16, Duration::from_secs(1), &token);
        let session = tokio::spawn(run_session(conn, handle.clone(), hub.clone()));

        eventually(|| async { hub.active_connection_count().await.unwrap() == 1 }).await;
        hub.unregister(handle.id().clone()).await.unwrap();

        session.await.unwrap();
        assert_eq!(hub.active_connection_count().await.unwrap(), 0);

        token.cancel();
    }

    #[tokio::test]
    async fn test_session_without_hub_closes() {
        let (hub, token) = start();
        token.cancel();
        eventually(|| async { hub.active_connection_count().await.is_err() }).await;

        let (conn, _inbound) = ScriptedConnection::new();
        let (handle, _rx) =
            ConnectionHandle::channel("s1".into(), 16, Duration::from_secs(1), &CancellationToken::new());
        run_session(conn, handle.clone(), hub).await;

        assert!(handle.is_closed());
    }
}
