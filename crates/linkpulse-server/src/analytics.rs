//! In-process analytics store.
//!
//! Aggregates the clicks and conversions posted to the ingestion endpoints
//! into per-day buckets, and answers the hub's snapshot requests from them.
//! Buckets older than the longest window are discarded as new days arrive,
//! and [`run_pruner`] drops codes that have gone quiet.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use dashmap::DashMap;
use linkpulse_core::{
    AggregateAnalytics, AnalyticsError, AnalyticsSource, ClickEvent, DailyClicks, ReferrerStats,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Longest window a snapshot may cover.
pub const MAX_WINDOW_DAYS: u32 = 365;

/// Referrers listed in a snapshot.
const TOP_REFERRERS: usize = 10;

const DIRECT: &str = "direct";

/// How often [`run_pruner`] sweeps the store.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

type DayBuckets = BTreeMap<NaiveDate, DayBucket>;

#[derive(Debug, Default)]
struct DayBucket {
    clicks: u64,
    visitors: HashSet<String>,
    conversions: u64,
    conversion_value: f64,
    referrers: HashMap<String, u64>,
}

/// Analytics kept in memory, bucketed by short code and UTC day.
#[derive(Debug, Default)]
pub struct MemoryAnalytics {
    links: DashMap<String, DayBuckets>,
}

impl MemoryAnalytics {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a click on `short_code`.
    pub fn record_click(&self, short_code: &str, event: &ClickEvent, at: DateTime<Utc>) {
        let mut days = self.links.entry(short_code.to_string()).or_default();
        let bucket = days.entry(at.date_naive()).or_default();

        bucket.clicks += 1;
        if !event.ip_address.is_empty() {
            bucket.visitors.insert(event.ip_address.clone());
        }
        let referrer = if event.referrer.is_empty() {
            DIRECT
        } else {
            event.referrer.as_str()
        };
        *bucket.referrers.entry(referrer.to_string()).or_insert(0) += 1;

        trim_to_newest(&mut days);
    }

    /// Record a conversion on `short_code` worth `value`.
    pub fn record_conversion(&self, short_code: &str, value: f64, at: DateTime<Utc>) {
        let mut days = self.links.entry(short_code.to_string()).or_default();
        let bucket = days.entry(at.date_naive()).or_default();

        bucket.conversions += 1;
        if value.is_finite() {
            bucket.conversion_value += value;
        }

        trim_to_newest(&mut days);
    }

    /// Drop buckets no window ending on `today` can reach, and codes left
    /// with none. Returns the number of codes dropped.
    pub fn prune(&self, today: NaiveDate) -> usize {
        let before = self.links.len();
        self.links.retain(|_, days| {
            retain_window(days, today);
            !days.is_empty()
        });
        before.saturating_sub(self.links.len())
    }

    /// Aggregate the `window_days` days ending on `today`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidWindow`] for a zero or oversized window.
    pub fn snapshot_on(
        &self,
        short_code: &str,
        window_days: u32,
        today: NaiveDate,
    ) -> Result<AggregateAnalytics, AnalyticsError> {
        if window_days == 0 || window_days > MAX_WINDOW_DAYS {
            return Err(AnalyticsError::InvalidWindow(window_days));
        }

        let mut snapshot = AggregateAnalytics::empty(short_code, window_days);
        let Some(days) = self.links.get(short_code) else {
            return Ok(snapshot);
        };

        let first = today
            .checked_sub_days(Days::new(u64::from(window_days - 1)))
            .unwrap_or(NaiveDate::MIN);

        let mut visitors: HashSet<&str> = HashSet::new();
        let mut referrers: HashMap<&str, u64> = HashMap::new();
        for date in first.iter_days().take(window_days as usize) {
            let clicks = match days.get(&date) {
                Some(bucket) => {
                    snapshot.conversions += bucket.conversions;
                    snapshot.conversion_value += bucket.conversion_value;
                    visitors.extend(bucket.visitors.iter().map(String::as_str));
                    for (referrer, count) in &bucket.referrers {
                        *referrers.entry(referrer.as_str()).or_insert(0) += count;
                    }
                    bucket.clicks
                }
                None => 0,
            };
            snapshot.total_clicks += clicks;
            snapshot.clicks_by_day.push(DailyClicks { date, clicks });
        }

        snapshot.unique_visitors = visitors.len() as u64;
        if snapshot.total_clicks > 0 {
            snapshot.conversion_rate = snapshot.conversions as f64 / snapshot.total_clicks as f64;
        }

        let mut ranked: Vec<(&str, u64)> = referrers.into_iter().collect();
        ranked.sort_by(|a, b| (b.1, a.0).cmp(&(a.1, b.0)));
        snapshot.top_referrers = ranked
            .into_iter()
            .take(TOP_REFERRERS)
            .map(|(referrer, count)| ReferrerStats {
                referrer: referrer.to_string(),
                count,
                percentage: count as f64 * 100.0 / snapshot.total_clicks.max(1) as f64,
            })
            .collect();

        Ok(snapshot)
    }

    #[cfg(test)]
    fn link_count(&self) -> usize {
        self.links.len()
    }

    #[cfg(test)]
    fn bucket_count(&self, short_code: &str) -> usize {
        self.links.get(short_code).map_or(0, |days| days.len())
    }
}

/// Keep only the days inside the longest window ending on `today`.
fn retain_window(days: &mut DayBuckets, today: NaiveDate) {
    let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(MAX_WINDOW_DAYS - 1))) else {
        return;
    };
    if days.first_key_value().is_some_and(|(first, _)| *first < cutoff) {
        *days = days.split_off(&cutoff);
    }
}

/// Trim relative to the newest recorded day.
fn trim_to_newest(days: &mut DayBuckets) {
    if let Some(newest) = days.last_key_value().map(|(date, _)| *date) {
        retain_window(days, newest);
    }
}

/// Prune `store` every `period` until `token` is cancelled.
pub async fn run_pruner(store: Arc<MemoryAnalytics>, period: Duration, token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let dropped = store.prune(Utc::now().date_naive());
                debug!(dropped, remaining = store.links.len(), "Pruned analytics store");
            }
        }
    }

    debug!("Analytics pruner stopped");
}

#[async_trait]
impl AnalyticsSource for MemoryAnalytics {
    async fn snapshot(
        &self,
        short_code: &str,
        window_days: u32,
    ) -> Result<AggregateAnalytics, AnalyticsError> {
        self.snapshot_on(short_code, window_days, Utc::now().date_naive())
    }
}
