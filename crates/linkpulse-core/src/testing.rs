//! Shared test fixtures.

use crate::analytics::{AggregateAnalytics, AnalyticsError, AnalyticsSource};
use crate::hub::HubHandle;
use async_trait::async_trait;
use linkpulse_protocol::{ClientMessage, ServerMessage};
use linkpulse_transport::{Connection, ConnectionHandle, Outbound, TransportError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Analytics source answering from a fixed table.
#[derive(Default)]
pub struct StaticAnalytics {
    clicks: HashMap<String, u64>,
}

impl StaticAnalytics {
    pub fn with_clicks(short_code: &str, clicks: u64) -> Self {
        let mut source = Self::default();
        source.clicks.insert(short_code.to_string(), clicks);
        source
    }
}

#[async_trait]
impl AnalyticsSource for StaticAnalytics {
    async fn snapshot(
        &self,
        short_code: &str,
        window_days: u32,
    ) -> Result<AggregateAnalytics, AnalyticsError> {
        let mut snapshot = AggregateAnalytics::empty(short_code, window_days);
        snapshot.total_clicks = self.clicks.get(short_code).copied().unwrap_or(0);
        Ok(snapshot)
    }
}

/// Analytics source whose store is always down.
pub struct FailingAnalytics;

#[async_trait]
impl AnalyticsSource for FailingAnalytics {
    async fn snapshot(&self, _: &str, _: u32) -> Result<AggregateAnalytics, AnalyticsError> {
        Err(AnalyticsError::Unavailable("connection refused".into()))
    }
}

/// Analytics source counting the fetches it serves.
#[derive(Default)]
pub struct CountingAnalytics {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AnalyticsSource for CountingAnalytics {
    async fn snapshot(
        &self,
        short_code: &str,
        window_days: u32,
    ) -> Result<AggregateAnalytics, AnalyticsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AggregateAnalytics::empty(short_code, window_days))
    }
}

/// Analytics source whose fetches never complete.
///
/// `started` counts fetches begun, `dropped` counts fetches whose future was
/// dropped before finishing.
#[derive(Default)]
pub struct StalledAnalytics {
    pub started: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicUsize>,
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalyticsSource for StalledAnalytics {
    async fn snapshot(&self, _: &str, _: u32) -> Result<AggregateAnalytics, AnalyticsError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _guard = DropCounter(Arc::clone(&self.dropped));
        std::future::pending().await
    }
}

/// A connection fed from a channel; dropping the sender ends it.
pub struct ScriptedConnection {
    inbound: mpsc::Receiver<ClientMessage>,
}

impl ScriptedConnection {
    pub fn new() -> (Self, mpsc::Sender<ClientMessage>) {
        let (tx, inbound) = mpsc::channel(16);
        (Self { inbound }, tx)
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn receive(&mut self) -> Result<ClientMessage, TransportError> {
        self.inbound
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)
    }
}

/// Register a fresh connection with the hub.
pub async fn connect(
    hub: &HubHandle,
    id: &str,
    token: &CancellationToken,
) -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
    let (handle, rx) = ConnectionHandle::channel(id.into(), 16, Duration::from_secs(1), token);
    hub.register(handle.clone()).await.unwrap();
    (handle, rx)
}

/// Receive the next JSON message, skipping keepalive pings.
pub async fn next_message(rx: &mut mpsc::Receiver<Outbound>) -> ServerMessage {
    loop {
        match rx.recv().await {
            Some(Outbound::Text(text)) => return serde_json::from_str(&text).unwrap(),
            Some(Outbound::Ping) => continue,
            None => panic!("Connection queue closed"),
        }
    }
}

/// Poll `check` until it holds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Condition not met in time");
}
