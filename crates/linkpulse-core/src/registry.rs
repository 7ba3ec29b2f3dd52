//! Connection registry.
//!
//! The authoritative set of live connections, used for keepalive sweeps and
//! shutdown. Owned by the hub's control loop.

use futures_util::future::join_all;
use linkpulse_transport::{ConnectionHandle, ConnectionId, Outbound, SendError};
use std::collections::HashMap;

/// All currently registered connections.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    ///
    /// Closed handles are refused. Returns `true` if the handle was added.
    pub fn insert(&mut self, handle: ConnectionHandle) -> bool {
        if handle.is_closed() {
            return false;
        }
        self.connections.insert(handle.id().clone(), handle);
        true
    }

    /// Remove a connection, returning its handle if it was registered.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionHandle> {
        self.connections.remove(id)
    }

    /// Get a connection's handle.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionHandle> {
        self.connections.get(id)
    }

    /// Get the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Clone out every handle.
    #[must_use]
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections.values().cloned().collect()
    }

    /// Remove and return every handle.
    pub fn drain(&mut self) -> impl Iterator<Item = ConnectionHandle> + '_ {
        self.connections.drain().map(|(_, handle)| handle)
    }
}

/// Send `frame` to every handle concurrently.
///
/// Each send is bounded by its handle's write timeout, so the whole call is
/// bounded by the slowest timeout rather than their sum. Returns the
/// connections whose send failed.
pub async fn deliver(
    handles: &[ConnectionHandle],
    frame: &Outbound,
) -> Vec<(ConnectionId, SendError)> {
    let sends = handles.iter().map(|handle| async move {
        handle
            .send(frame.clone())
            .await
            .err()
            .map(|e| (handle.id().clone(), e))
    });

    join_all(sends).await.into_iter().flatten().collect()
}
