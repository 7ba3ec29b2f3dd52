//! # linkpulse-core
//!
//! Broadcast hub for the LinkPulse realtime analytics feed.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Hub** - Single control loop owning every connection and subscription
//! - **Index** - Topic to subscriber mapping with its reverse side
//! - **Session** - Per-connection read loop feeding the hub
//! - **Refresher** - Periodic snapshots for topics with subscribers
//! - **Update** - Typed events and their wire encoding
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ subscribe ┌─────────────┐   fan-out   ┌─────────────┐
//! │   Session   │──────────▶│     Hub     │────────────▶│ Connection  │
//! └─────────────┘           └─────────────┘             │   handles   │
//!                             ▲    ▲    │               └─────────────┘
//!            broadcast_click  │    │    │ snapshot
//!      ┌─────────────┐        │    │    ▼
//!      │  Producers  │────────┘    │  ┌─────────────┐
//!      └─────────────┘             │  │  Analytics  │
//!                     ┌────────────┴┐ │   source    │
//!                     │  Refresher  │─▶─────────────┘
//!                     └─────────────┘
//! ```

pub mod analytics;
pub mod hub;
pub mod index;
pub mod keepalive;
pub mod refresher;
pub mod registry;
pub mod session;
pub mod telemetry;
pub mod update;

#[cfg(test)]
mod testing;

pub use analytics::{
    AggregateAnalytics, AnalyticsError, AnalyticsSource, DailyClicks, ReferrerStats,
};
pub use hub::{spawn, Hub, HubConfig, HubError, HubHandle};
pub use index::SubscriptionIndex;
pub use refresher::Refresher;
pub use registry::Registry;
pub use session::run_session;
pub use update::{ClickEvent, Update, UpdateKind};
