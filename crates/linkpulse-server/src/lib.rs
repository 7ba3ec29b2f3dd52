//! # LinkPulse Server
//!
//! Realtime analytics broadcast server: a WebSocket feed of clicks,
//! conversions and aggregate snapshots per short code, plus the HTTP
//! endpoints producers post events to.

pub mod analytics;
pub mod config;
pub mod handlers;
pub mod metrics;

pub use analytics::MemoryAnalytics;
pub use config::Config;
pub use handlers::{router, run_server, serve, AppState};
