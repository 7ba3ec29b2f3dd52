//! The broadcast hub.
//!
//! A single control loop owns the [`Registry`] and [`SubscriptionIndex`].
//! Everything else talks to it through a [`HubHandle`], which only ever sends
//! messages: the maps never leave the loop, not even for reading.
//!
//! Delivery is best-effort. A connection that unsubscribes while a broadcast
//! for that topic is already queued may or may not receive it, and a fresh
//! subscriber's initial snapshot may arrive after live updates for the topic.

use crate::analytics::{AnalyticsSource, DEFAULT_WINDOW_DAYS};
use crate::index::SubscriptionIndex;
use crate::keepalive::{self, DEFAULT_PING_INTERVAL};
use crate::refresher::{Refresher, DEFAULT_REFRESH_INTERVAL};
use crate::registry::{deliver, Registry};
use crate::telemetry;
use crate::update::{ClickEvent, Update};
use linkpulse_transport::{ConnectionHandle, ConnectionId, Outbound};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// The broadcast queue was full and the update was dropped.
    #[error("Broadcast queue full, dropped update for {0}")]
    QueueFull(String),

    /// The hub has stopped.
    #[error("Hub is not running")]
    Closed,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Depth of the broadcast queue. Broadcasts beyond it are dropped.
    pub broadcast_capacity: usize,
    /// Depth of the register/subscribe/query queue.
    pub control_capacity: usize,
    /// Keepalive period.
    pub ping_interval: Duration,
    /// Refresher period.
    pub refresh_interval: Duration,
    /// Window requested from the analytics source.
    pub snapshot_window_days: u32,
    /// Upper bound on a single snapshot fetch.
    pub snapshot_timeout: Duration,
    /// Topics a single connection may hold at once.
    pub max_subscriptions_per_connection: usize,
    /// Topics with subscribers the hub will track at once.
    pub max_topics: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
            control_capacity: 256,
            ping_interval: DEFAULT_PING_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            snapshot_window_days: DEFAULT_WINDOW_DAYS,
            snapshot_timeout: Duration::from_secs(10),
            max_subscriptions_per_connection: 100,
            max_topics: 10_000,
        }
    }
}

/// Requests serialized through the control loop.
enum Command {
    Register(ConnectionHandle),
    Unregister(ConnectionId),
    Subscribe { id: ConnectionId, topic: String },
    Unsubscribe { id: ConnectionId, topic: String },
    ConnectionCount(oneshot::Sender<usize>),
    SubscriptionCounts(oneshot::Sender<HashMap<String, usize>>),
    Topics(oneshot::Sender<Vec<String>>),
}

/// Cloneable entry point into a running hub.
#[derive(Clone)]
pub struct HubHandle {
    control: mpsc::Sender<Command>,
    broadcasts: mpsc::Sender<Update>,
}

impl HubHandle {
    /// Register a connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn register(&self, handle: ConnectionHandle) -> Result<(), HubError> {
        self.command(Command::Register(handle)).await
    }

    /// Unregister a connection and drop all its subscriptions. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.command(Command::Unregister(id)).await
    }

    /// Subscribe a registered connection to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn subscribe(&self, id: ConnectionId, topic: impl Into<String>) -> Result<(), HubError> {
        self.command(Command::Subscribe {
            id,
            topic: topic.into(),
        })
        .await
    }

    /// Unsubscribe a connection from a topic.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn unsubscribe(
        &self,
        id: ConnectionId,
        topic: impl Into<String>,
    ) -> Result<(), HubError> {
        self.command(Command::Unsubscribe {
            id,
            topic: topic.into(),
        })
        .await
    }

    /// Queue an update for fan-out without waiting.
    ///
    /// When the queue is full the update is dropped, never the queued ones.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::QueueFull`] if the update was dropped and
    /// [`HubError::Closed`] if the hub has stopped.
    pub fn broadcast(&self, update: Update) -> Result<(), HubError> {
        match self.broadcasts.try_send(update) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(update)) => {
                warn!(topic = %update.topic, kind = update.kind.as_str(), "Broadcast queue full, dropping update");
                telemetry::record_dropped(update.kind);
                Err(HubError::QueueFull(update.topic))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(HubError::Closed),
        }
    }

    /// Broadcast a click on `short_code`.
    ///
    /// # Errors
    ///
    /// See [`broadcast`](Self::broadcast).
    pub fn broadcast_click(
        &self,
        short_code: &str,
        ip_address: &str,
        user_agent: &str,
        referrer: &str,
    ) -> Result<(), HubError> {
        let event = ClickEvent {
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            referrer: referrer.to_string(),
        };
        self.broadcast(Update::click(short_code, &event))
    }

    /// Broadcast a conversion on `short_code`.
    ///
    /// # Errors
    ///
    /// See [`broadcast`](Self::broadcast).
    pub fn broadcast_conversion(
        &self,
        short_code: &str,
        conversion_data: serde_json::Value,
    ) -> Result<(), HubError> {
        self.broadcast(Update::conversion(short_code, conversion_data))
    }

    /// Number of registered connections.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn active_connection_count(&self) -> Result<usize, HubError> {
        self.query(Command::ConnectionCount).await
    }

    /// Subscriber count per topic.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn active_subscription_counts(&self) -> Result<HashMap<String, usize>, HubError> {
        self.query(Command::SubscriptionCounts).await
    }

    /// Point-in-time list of topics with at least one subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn active_topics(&self) -> Result<Vec<String>, HubError> {
        self.query(Command::Topics).await
    }

    async fn command(&self, command: Command) -> Result<(), HubError> {
        self.control.send(command).await.map_err(|_| HubError::Closed)
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, HubError> {
        let (tx, rx) = oneshot::channel();
        self.command(make(tx)).await?;
        rx.await.map_err(|_| HubError::Closed)
    }
}

/// The hub's control loop and the state only it may touch.
pub struct Hub {
    registry: Registry,
    index: SubscriptionIndex,
    control: mpsc::Receiver<Command>,
    broadcasts: mpsc::Receiver<Update>,
    evictions: mpsc::UnboundedReceiver<ConnectionId>,
    evict_tx: mpsc::UnboundedSender<ConnectionId>,
    analytics: Arc<dyn AnalyticsSource>,
    config: HubConfig,
    token: CancellationToken,
}

impl Hub {
    /// Create a hub and its handle. The hub does nothing until [`run`](Self::run).
    #[must_use]
    pub fn new(
        config: HubConfig,
        analytics: Arc<dyn AnalyticsSource>,
        token: CancellationToken,
    ) -> (Self, HubHandle) {
        let (control_tx, control) = mpsc::channel(config.control_capacity.max(1));
        let (broadcast_tx, broadcasts) = mpsc::channel(config.broadcast_capacity.max(1));
        let (evict_tx, evictions) = mpsc::unbounded_channel();

        let hub = Self {
            registry: Registry::new(),
            index: SubscriptionIndex::new(),
            control,
            broadcasts,
            evictions,
            evict_tx,
            analytics,
            config,
            token,
        };
        let handle = HubHandle {
            control: control_tx,
            broadcasts: broadcast_tx,
        };
        (hub, handle)
    }

    /// Run the control loop until the token is cancelled, then close every
    /// registered connection.
    pub async fn run(mut self) {
        info!("Creating hub with config: {:?}", self.config);
        let mut keepalive = keepalive::ticker(self.config.ping_interval);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,

                Some(id) = self.evictions.recv() => {
                    if self.unregister(&id) {
                        telemetry::record_eviction("send_failed");
                    }
                }

                Some(command) = self.control.recv() => self.handle_command(command),

                Some(update) = self.broadcasts.recv() => self.broadcast(update).await,

                _ = keepalive.tick() => self.keepalive().await,
            }
        }

        self.shutdown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register(handle) => self.register(handle),
            Command::Unregister(id) => {
                self.unregister(&id);
            }
            Command::Subscribe { id, topic } => self.subscribe(id, topic),
            Command::Unsubscribe { id, topic } => {
                self.index.unsubscribe(&id, &topic);
                self.record_sizes();
            }
            Command::ConnectionCount(reply) => {
                let _ = reply.send(self.registry.len());
            }
            Command::SubscriptionCounts(reply) => {
                let _ = reply.send(self.index.counts());
            }
            Command::Topics(reply) => {
                let _ = reply.send(self.index.topics());
            }
        }
    }

    fn register(&mut self, handle: ConnectionHandle) {
        let id = handle.id().clone();
        if self.registry.insert(handle) {
            debug!(connection = %id, connections = self.registry.len(), "Registered");
            self.record_sizes();
        } else {
            debug!(connection = %id, "Refusing closed connection");
        }
    }

    /// Returns `true` if the connection was registered.
    fn unregister(&mut self, id: &ConnectionId) -> bool {
        let Some(handle) = self.registry.remove(id) else {
            return false;
        };
        let removed = self.index.unregister_all(id);
        handle.close();
        debug!(
            connection = %id,
            subscriptions = removed,
            connections = self.registry.len(),
            "Unregistered"
        );
        self.record_sizes();
        true
    }

    fn subscribe(&mut self, id: ConnectionId, topic: String) {
        let Some(handle) = self.registry.get(&id).cloned() else {
            debug!(connection = %id, topic = %topic, "Subscribe from unregistered connection");
            return;
        };
        if self.index.is_subscribed(&id, &topic) {
            trace!(connection = %id, topic = %topic, "Already subscribed");
            return;
        }

        let held = self.index.subscription_count(&id);
        if held >= self.config.max_subscriptions_per_connection {
            warn!(
                connection = %id,
                topic = %topic,
                subscriptions = held,
                "Subscription limit reached, ignoring subscribe"
            );
            telemetry::record_subscribe_rejected("max_subscriptions");
            return;
        }
        if self.index.subscribers(&topic).is_none()
            && self.index.topic_count() >= self.config.max_topics
        {
            warn!(
                connection = %id,
                topic = %topic,
                topics = self.index.topic_count(),
                "Topic limit reached, ignoring subscribe"
            );
            telemetry::record_subscribe_rejected("max_topics");
            return;
        }

        self.index.subscribe(&id, &topic);
        self.record_sizes();
        self.send_initial_snapshot(handle, topic);
    }

    /// Fetch a snapshot off the loop and send it to one connection.
    fn send_initial_snapshot(&self, handle: ConnectionHandle, topic: String) {
        let analytics = Arc::clone(&self.analytics);
        let evict_tx = self.evict_tx.clone();
        let window_days = self.config.snapshot_window_days;
        let fetch_timeout = self.config.snapshot_timeout;
        let token = self.token.clone();

        tokio::spawn(async move {
            let fetch = tokio::time::timeout(fetch_timeout, analytics.snapshot(&topic, window_days));
            let result = tokio::select! {
                _ = token.cancelled() => {
                    trace!(topic = %topic, "Initial snapshot abandoned on shutdown");
                    return;
                }
                result = fetch => result,
            };
            let snapshot = match result {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(e)) => {
                    warn!(topic = %topic, error = %e, "Initial snapshot fetch failed");
                    telemetry::record_snapshot_failure("initial");
                    return;
                }
                Err(_) => {
                    warn!(topic = %topic, "Initial snapshot fetch timed out");
                    telemetry::record_snapshot_failure("initial");
                    return;
                }
            };

            let text = match Update::initial_snapshot(&topic, &snapshot).encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Failed to encode initial snapshot");
                    return;
                }
            };

            if let Err(e) = handle.send(Outbound::Text(text)).await {
                debug!(connection = %handle.id(), error = %e, "Initial snapshot not delivered");
                let _ = evict_tx.send(handle.id().clone());
            }
        });
    }

    async fn broadcast(&mut self, update: Update) {
        let handles: Vec<ConnectionHandle> = match self.index.subscribers(&update.topic) {
            Some(subscribers) => subscribers
                .iter()
                .filter_map(|id| self.registry.get(id).cloned())
                .collect(),
            None => Vec::new(),
        };

        if handles.is_empty() {
            trace!(topic = %update.topic, "No subscribers for update");
            return;
        }

        let text = match update.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(topic = %update.topic, error = %e, "Failed to encode update");
                return;
            }
        };

        let failed = deliver(&handles, &Outbound::Text(text)).await;
        telemetry::record_broadcast(update.kind, handles.len() - failed.len());
        trace!(
            topic = %update.topic,
            kind = update.kind.as_str(),
            recipients = handles.len() - failed.len(),
            "Broadcast update"
        );

        // Unregistration is queued, never done while walking the subscriber set.
        for (id, e) in failed {
            debug!(connection = %id, topic = %update.topic, error = %e, "Dropping subscriber");
            let _ = self.evict_tx.send(id);
        }
    }

    async fn keepalive(&mut self) {
        let failed = keepalive::sweep(&self.registry).await;
        trace!(connections = self.registry.len(), failed = failed.len(), "Keepalive sweep");

        for (id, e) in failed {
            debug!(connection = %id, error = %e, "Keepalive ping failed");
            let _ = self.evict_tx.send(id);
        }
    }

    fn shutdown(&mut self) {
        let count = self.registry.len();
        for handle in self.registry.drain() {
            handle.close();
        }
        self.index.clear();
        self.record_sizes();
        info!(connections = count, "Hub stopped");
    }

    fn record_sizes(&self) {
        telemetry::set_sizes(self.registry.len(), self.index.topic_count());
    }
}

/// Start a hub and its refresher.
///
/// Both stop when `token` is cancelled; await the returned task to know the
/// hub has closed all connections.
pub fn spawn(
    config: HubConfig,
    analytics: Arc<dyn AnalyticsSource>,
    token: CancellationToken,
) -> (HubHandle, JoinHandle<()>) {
    let refresher = Refresher::new(
        Arc::clone(&analytics),
        config.refresh_interval,
        config.snapshot_window_days,
        config.snapshot_timeout,
    );
    let (hub, handle) = Hub::new(config, analytics, token.clone());

    let hub_task = tokio::spawn(hub.run());
    tokio::spawn(refresher.run(handle.clone(), token));

    (handle, hub_task)
}
