//! Keepalive sweeps.
//!
//! The hub pings every registered connection on a fixed period. A ping that
//! cannot be queued within the write timeout evicts the connection; a client
//! that stops answering is caught by its own read deadline, which is set
//! longer than the ping period.

use crate::registry::{deliver, Registry};
use linkpulse_transport::{ConnectionId, Outbound, SendError};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Default ping period.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(54);

/// Default read deadline. Must exceed the ping period.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Build the keepalive ticker. The first tick fires one full period from now.
#[must_use]
pub fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Ping every registered connection, returning the ones that failed.
pub async fn sweep(registry: &Registry) -> Vec<(ConnectionId, SendError)> {
    if registry.is_empty() {
        return Vec::new();
    }
    deliver(&registry.handles(), &Outbound::Ping).await
}
