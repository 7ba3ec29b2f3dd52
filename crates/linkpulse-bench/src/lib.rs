//! Shared fixtures for the LinkPulse benchmarks.

use async_trait::async_trait;
use linkpulse_core::{AggregateAnalytics, AnalyticsError, AnalyticsSource, HubHandle};
use linkpulse_transport::{ConnectionHandle, ConnectionId, Outbound};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Analytics source with no data, so snapshots cost next to nothing.
pub struct ZeroAnalytics;

#[async_trait]
impl AnalyticsSource for ZeroAnalytics {
    async fn snapshot(
        &self,
        short_code: &str,
        window_days: u32,
    ) -> Result<AggregateAnalytics, AnalyticsError> {
        Ok(AggregateAnalytics::empty(short_code, window_days))
    }
}

/// Register `count` connections subscribed to `topic`, each drained by a
/// task that counts the text frames it receives.
///
/// Stops early if the hub goes away. Returns once every connection that did
/// subscribe has its initial snapshot, with the counter reset.
pub async fn subscribe_drained(
    hub: &HubHandle,
    count: usize,
    topic: &str,
    token: &CancellationToken,
) -> Arc<AtomicU64> {
    let received = Arc::new(AtomicU64::new(0));
    let mut subscribed = 0u64;

    for i in 0..count {
        let (handle, rx) = ConnectionHandle::channel(
            ConnectionId::new(format!("bench-{}", i)),
            1024,
            Duration::from_secs(1),
            token,
        );
        if hub.register(handle).await.is_err() {
            break;
        }
        if hub.subscribe(ConnectionId::new(format!("bench-{}", i)), topic).await.is_err() {
            break;
        }
        tokio::spawn(drain(rx, Arc::clone(&received)));
        subscribed += 1;
    }

    wait_for(&received, subscribed).await;
    received.store(0, Ordering::SeqCst);
    received
}

/// Wait until `counter` reaches `target`.
pub async fn wait_for(counter: &AtomicU64, target: u64) {
    while counter.load(Ordering::Acquire) < target {
        tokio::task::yield_now().await;
    }
}

async fn drain(mut rx: mpsc::Receiver<Outbound>, received: Arc<AtomicU64>) {
    while let Some(frame) = rx.recv().await {
        if let Outbound::Text(_) = frame {
            received.fetch_add(1, Ordering::AcqRel);
        }
    }
}
