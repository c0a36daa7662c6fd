//! Cycle and lifetime statistics, snapshotted on demand for the `/state`
//! endpoint and pushed to the `metrics` registry for `/metrics`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::cache::Cache;
use crate::error::CacheError;

#[derive(Debug, Clone, Default)]
pub struct CycleCounters {
    pub added: u64,
    pub filtered: u64,
    pub skipped: u64,
    pub failed: u64,
    pub exists: u64,
}

impl CycleCounters {
    fn add(&mut self, other: &CycleCounters) {
        self.added += other.added;
        self.filtered += other.filtered;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.exists += other.exists;
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub status_counts: HashMap<String, i64>,
    pub filter_category_counts: HashMap<String, i64>,
    pub retry_count_counts: HashMap<i64, i64>,
    pub total_count: i64,
    pub max_upstream_id: i64,
    pub last_cycle: CycleCounters,
    pub lifetime: CycleCounters,
    pub last_duration: Option<Duration>,
    pub last_run_successful: Option<bool>,
}

/// Shared, mutable statistics surface. The orchestrator updates it at
/// cycle boundaries; the HTTP surface reads a point-in-time snapshot.
pub struct Stats {
    inner: RwLock<StatsSnapshot>,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            inner: RwLock::new(StatsSnapshot::default()),
        }
    }
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes the cache-derived fields of the snapshot.
    pub async fn refresh(&self, cache: &Cache) -> Result<(), CacheError> {
        let status_counts = cache.count_by_status().await?;
        let filter_category_counts = cache.count_by_filter_category().await?;
        let retry_count_counts = cache.count_by_retry_count().await?;
        let total_count = cache.total_count().await?;
        let max_upstream_id = cache.max_upstream_id().await?;

        for (status, count) in &status_counts {
            metrics::gauge!("showsync_shows_by_status", "status" => status.clone()).set(*count as f64);
        }
        metrics::gauge!("showsync_shows_total").set(total_count as f64);
        metrics::gauge!("showsync_max_upstream_id").set(max_upstream_id as f64);

        let mut snapshot = self.inner.write().await;
        snapshot.status_counts = status_counts;
        snapshot.filter_category_counts = filter_category_counts;
        snapshot.retry_count_counts = retry_count_counts;
        snapshot.total_count = total_count;
        snapshot.max_upstream_id = max_upstream_id;

        Ok(())
    }

    /// Records the outcome of one completed cycle, folding its counters
    /// into the lifetime totals.
    pub async fn record_cycle(&self, counters: CycleCounters, duration: Duration, successful: bool) {
        metrics::counter!("showsync_cycle_shows_added_total").increment(counters.added);
        metrics::counter!("showsync_cycle_shows_filtered_total").increment(counters.filtered);
        metrics::counter!("showsync_cycle_shows_skipped_total").increment(counters.skipped);
        metrics::counter!("showsync_cycle_shows_failed_total").increment(counters.failed);
        metrics::counter!("showsync_cycle_shows_exists_total").increment(counters.exists);
        metrics::histogram!("showsync_cycle_duration_seconds").record(duration.as_secs_f64());
        metrics::gauge!("showsync_last_run_successful").set(if successful { 1.0 } else { 0.0 });

        let mut snapshot = self.inner.write().await;
        snapshot.lifetime.add(&counters);
        snapshot.last_cycle = counters;
        snapshot.last_duration = Some(duration);
        snapshot.last_run_successful = Some(successful);
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_cycle_accumulates_lifetime_totals() {
        let stats = Stats::new();

        stats
            .record_cycle(
                CycleCounters {
                    added: 2,
                    filtered: 3,
                    ..Default::default()
                },
                Duration::from_secs(10),
                true,
            )
            .await;
        stats
            .record_cycle(
                CycleCounters {
                    added: 1,
                    ..Default::default()
                },
                Duration::from_secs(5),
                true,
            )
            .await;

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.lifetime.added, 3);
        assert_eq!(snapshot.lifetime.filtered, 3);
        assert_eq!(snapshot.last_cycle.added, 1);
        assert_eq!(snapshot.last_duration, Some(Duration::from_secs(5)));
    }
}
