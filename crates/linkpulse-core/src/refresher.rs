//! Periodic analytics refresher.
//!
//! Keeps dashboards moving when no clicks arrive: every period, each topic
//! with at least one subscriber gets a fresh `analytics_update`.

use crate::analytics::AnalyticsSource;
use crate::hub::HubHandle;
use crate::telemetry;
use crate::update::Update;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default refresh period.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Pulls snapshots for every active topic and submits them as broadcasts.
pub struct Refresher {
    analytics: Arc<dyn AnalyticsSource>,
    interval: Duration,
    window_days: u32,
    fetch_timeout: Duration,
}

impl Refresher {
    /// Create a refresher.
    #[must_use]
    pub fn new(
        analytics: Arc<dyn AnalyticsSource>,
        interval: Duration,
        window_days: u32,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            analytics,
            interval,
            window_days,
            fetch_timeout,
        }
    }

    /// Refresh on every tick until `token` is cancelled.
    pub async fn run(self, hub: HubHandle, token: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.refresh_all(&hub, &token).await;
                }
            }
        }

        debug!("Refresher stopped");
    }

    /// Start one independent fetch per active topic.
    ///
    /// Returns the number of topics refreshed. Does not wait for the fetches;
    /// those still running when `token` is cancelled are abandoned.
    pub async fn refresh_all(&self, hub: &HubHandle, token: &CancellationToken) -> usize {
        let topics = match hub.active_topics().await {
            Ok(topics) => topics,
            Err(e) => {
                debug!(error = %e, "Skipping refresh");
                return 0;
            }
        };

        let count = topics.len();
        for topic in topics {
            let hub = hub.clone();
            let analytics = Arc::clone(&self.analytics);
            let window_days = self.window_days;
            let fetch_timeout = self.fetch_timeout;
            let token = token.clone();

            tokio::spawn(async move {
                let fetch = tokio::time::timeout(fetch_timeout, analytics.snapshot(&topic, window_days));
                let result = tokio::select! {
                    _ = token.cancelled() => return,
                    result = fetch => result,
                };
                match result {
                    Ok(Ok(snapshot)) => {
                        // A full queue is logged by the hub handle.
                        let _ = hub.broadcast(Update::analytics_snapshot(&topic, &snapshot));
                    }
                    Ok(Err(e)) => {
                        warn!(topic = %topic, error = %e, "Analytics refresh failed");
                        telemetry::record_snapshot_failure("refresh");
                    }
                    Err(_) => {
                        warn!(topic = %topic, "Analytics refresh timed out");
                        telemetry::record_snapshot_failure("refresh");
                    }
                }
            });
        }

        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Hub, HubConfig};
    use crate::testing::{
        connect, eventually, next_message, FailingAnalytics, StalledAnalytics, StaticAnalytics,
    };
    use linkpulse_protocol::MessageType;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test(start_paused = true)]
    async fn test_refresher_broadcasts_active_topics() {
        let token = CancellationToken::new();
        let analytics = Arc::new(StaticAnalytics::with_clicks("abc123", 42));
        let (hub, handle) = Hub::new(HubConfig::default(), analytics.clone(), token.clone());
        tokio::spawn(hub.run());

        let (c1, mut rx1) = connect(&handle, "c1", &token).await;
        handle.subscribe(c1.id().clone(), "abc123").await.unwrap();
        assert_eq!(next_message(&mut rx1).await.kind, MessageType::InitialAnalytics);

        let refresher = Refresher::new(
            analytics,
            Duration::from_secs(30),
            7,
            Duration::from_secs(5),
        );
        tokio::spawn(refresher.run(handle.clone(), token.clone()));

        let update = next_message(&mut rx1).await;
        assert_eq!(update.kind, MessageType::AnalyticsUpdate);
        assert_eq!(update.short_code, "abc123");
        assert_eq!(update.data["total_clicks"], 42);

        token.cancel();
    }

    #[tokio::test]
    async fn test_refresh_skips_idle_hub() {
        let token = CancellationToken::new();
        let analytics = Arc::new(StaticAnalytics::default());
        let (hub, handle) = Hub::new(HubConfig::default(), analytics.clone(), token.clone());
        tokio::spawn(hub.run());

        let refresher = Refresher::new(analytics, Duration::from_secs(30), 7, Duration::from_secs(5));
        assert_eq!(refresher.refresh_all(&handle, &token).await, 0);

        token.cancel();
    }

    #[tokio::test]
    async fn test_refresh_failure_sends_nothing() {
        let token = CancellationToken::new();
        let (hub, handle) = Hub::new(HubConfig::default(), Arc::new(FailingAnalytics), token.clone());
        tokio::spawn(hub.run());

        let (c1, mut rx1) = connect(&handle, "c1", &token).await;
        handle.subscribe(c1.id().clone(), "abc123").await.unwrap();

        let refresher = Refresher::new(
            Arc::new(FailingAnalytics),
            Duration::from_secs(30),
            7,
            Duration::from_secs(5),
        );
        assert_eq!(refresher.refresh_all(&handle, &token).await, 1);

        // Flush: a marker broadcast queued after any refresh would land after it.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        handle.broadcast_click("abc123", "203.0.113.7", "curl/8.0", "").unwrap();
        assert_eq!(next_message(&mut rx1).await.kind, MessageType::Click);
        assert!(matches!(rx1.try_recv(), Err(TryRecvError::Empty)));

        token.cancel();
    }

    #[tokio::test]
    async fn test_cancel_abandons_refresh_fetches() {
        let token = CancellationToken::new();
        let (hub, handle) = Hub::new(
            HubConfig::default(),
            Arc::new(StaticAnalytics::default()),
            token.clone(),
        );
        tokio::spawn(hub.run());

        let (c1, mut rx1) = connect(&handle, "c1", &token).await;
        handle.subscribe(c1.id().clone(), "abc123").await.unwrap();
        next_message(&mut rx1).await;

        let stalled = Arc::new(StalledAnalytics::default());
        let started = Arc::clone(&stalled.started);
        let dropped = Arc::clone(&stalled.dropped);
        let refresher = Refresher::new(stalled, Duration::from_secs(30), 7, Duration::from_secs(60));
        assert_eq!(refresher.refresh_all(&handle, &token).await, 1);

        eventually(|| {
            let started = Arc::clone(&started);
            async move { started.load(Ordering::SeqCst) == 1 }
        })
        .await;
        assert_eq!(dropped.load(Ordering::SeqCst), 0);

        token.cancel();
        eventually(|| {
            let dropped = Arc::clone(&dropped);
            async move { dropped.load(Ordering::SeqCst) == 1 }
        })
        .await;
    }
}
