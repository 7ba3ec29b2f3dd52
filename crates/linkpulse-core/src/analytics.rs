//! The analytics collaborator.
//!
//! The hub does not aggregate anything itself. It asks an
//! [`AnalyticsSource`] for a snapshot when a client subscribes and on every
//! refresh cycle.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default aggregation window for snapshots.
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Analytics errors.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The backing store could not be reached.
    #[error("Analytics store unavailable: {0}")]
    Unavailable(String),

    /// The requested window is not supported.
    #[error("Invalid window: {0} days")]
    InvalidWindow(u32),
}

/// Referrer breakdown entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferrerStats {
    pub referrer: String,
    pub count: u64,
    pub percentage: f64,
}

/// Clicks on one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyClicks {
    pub date: NaiveDate,
    pub clicks: u64,
}

/// Aggregated analytics for one short code over a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateAnalytics {
    /// Short code the snapshot describes.
    pub short_code: String,
    /// Window length in days.
    pub window_days: u32,
    /// Clicks in the window.
    pub total_clicks: u64,
    /// Distinct visitor IPs in the window.
    pub unique_visitors: u64,
    /// Conversions in the window.
    pub conversions: u64,
    /// `conversions / total_clicks`, 0 when there are no clicks.
    pub conversion_rate: f64,
    /// Sum of reported conversion values.
    pub conversion_value: f64,
    /// Most frequent referrers, highest first.
    pub top_referrers: Vec<ReferrerStats>,
    /// Per-day click counts, oldest first.
    pub clicks_by_day: Vec<DailyClicks>,
}

impl AggregateAnalytics {
    /// A zero-value snapshot, for short codes with no recorded activity.
    #[must_use]
    pub fn empty(short_code: impl Into<String>, window_days: u32) -> Self {
        Self {
            short_code: short_code.into(),
            window_days,
            ..Self::default()
        }
    }

    /// Whether the snapshot records no activity at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_clicks == 0 && self.conversions == 0
    }
}

/// Source of aggregate analytics snapshots.
///
/// Implementations must return [`AggregateAnalytics::empty`] rather than an
/// error for short codes without data; errors mean the store itself failed.
#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    /// Fetch a snapshot for `short_code` covering the last `window_days`.
    async fn snapshot(
        &self,
        short_code: &str,
        window_days: u32,
    ) -> Result<AggregateAnalytics, AnalyticsError>;
}
