//! Drives one sync cycle: initial or incremental catalog sync, the retry/
//! abandonment pass, and (once, at startup) the selection reconciliation
//! pass. Owns the cache, the upstream/downstream clients, and the shared
//! operational state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::{Cache, ProcessingStatus, Show};
use crate::config::Config;
use crate::downstream::{AddResult, DownstreamLibrary, ValidatedDownstreamParams};
use crate::duration::parse_duration;
use crate::error::UpstreamError;
use crate::processor::{self, Decision};
use crate::scheduler::CycleRunner;
use crate::state::SyncState;
use crate::stats::{CycleCounters, Stats};
use crate::upstream::{UpstreamCatalog, UpstreamShow};

/// The new-show probe beyond `highest_upstream_id` stops after this many
/// consecutive 404s.
const NEW_SHOW_PROBE_MAX_MISSES: u32 = 10;
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);

pub struct Orchestrator {
    cache: Cache,
    upstream: Arc<dyn UpstreamCatalog>,
    downstream: Arc<dyn DownstreamLibrary>,
    config: Config,
    validated: ValidatedDownstreamParams,
    state: Arc<RwLock<SyncState>>,
    stats: Arc<Stats>,
    state_path: PathBuf,
}

impl Orchestrator {
    pub fn new(
        cache: Cache,
        upstream: Arc<dyn UpstreamCatalog>,
        downstream: Arc<dyn DownstreamLibrary>,
        config: Config,
        validated: ValidatedDownstreamParams,
        state: Arc<RwLock<SyncState>>,
        stats: Arc<Stats>,
        state_path: PathBuf,
    ) -> Self {
        Self {
            cache,
            upstream,
            downstream,
            config,
            validated,
            state,
            stats,
            state_path,
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn state(&self) -> &Arc<RwLock<SyncState>> {
        &self.state
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs once at daemon start, before the scheduler's first cycle:
    /// recovers shows accepted downstream outside this daemon's history.
    pub async fn run_selection_reconciliation(&self) -> anyhow::Result<()> {
        info!("starting selection reconciliation pass");
        let existing = self.downstream.list_all_series().await?;
        let existing_ids: std::collections::HashSet<i64> =
            existing.into_iter().filter_map(|s| s.tvdb_id).collect();
        info!(count = existing_ids.len(), "found existing series downstream");

        let mut checked = 0usize;
        let mut candidates = 0usize;

        for show in self.cache.list_with_downstream_catalog_id().await? {
            checked += 1;
            let Some(downstream_catalog_id) = show.downstream_catalog_id else {
                continue;
            };
            if existing_ids.contains(&downstream_catalog_id) {
                continue;
            }

            let decision = processor::process(&show, &self.config.filters, &self.config.downstream, &self.validated);
            if matches!(decision, Decision::Add { .. }) {
                candidates += 1;
                self.apply_decision(&show, decision, &mut CycleCounters::default()).await;
            }
        }

        info!(checked, candidates, "selection reconciliation pass complete");
        Ok(())
    }

    pub async fn run_cycle(&self) -> anyhow::Result<()> {
        let start = Instant::now();
        let mut counters = CycleCounters::default();

        {
            let mut state = self.state.write().await;
            processor::check_filter_change(&self.cache, &self.config, &mut state).await?;
        }

        let outcome = self.execute_cycle(&mut counters).await;
        let duration = start.elapsed();

        self.stats.record_cycle(counters, duration, outcome.is_ok()).await;
        if let Err(e) = self.stats.refresh(&self.cache).await {
            warn!(error = %e, "failed to refresh statistics snapshot");
        }

        match &outcome {
            Ok(()) => info!(duration_secs = duration.as_secs_f64(), "sync cycle complete"),
            Err(e) => error!(error = %e, "sync cycle failed"),
        }

        outcome
    }

    async fn execute_cycle(&self, counters: &mut CycleCounters) -> anyhow::Result<()> {
        let last_full_sync = self.state.read().await.last_full_sync;

        if last_full_sync.is_none() {
            self.run_initial_sync(counters).await?;
            self.state.write().await.last_full_sync = Some(Utc::now());
        } else {
            self.run_incremental_sync(counters).await?;
        }

        self.retry_pass(counters).await?;

        self.state.write().await.last_incremental_sync = Some(Utc::now());
        self.persist_state(true).await?;

        Ok(())
    }

    async fn run_initial_sync(&self, counters: &mut CycleCounters) -> anyhow::Result<()> {
        info!("starting initial full sync");

        loop {
            let page = self.state.read().await.last_page;

            match self.upstream.get_page(page as u64).await {
                Ok(shows) if shows.is_empty() => {
                    info!(page, "reached end of upstream catalog index");
                    break;
                }
                Ok(shows) => {
                    info!(page, count = shows.len(), "processing catalog page");
                    for upstream_show in shows {
                        self.process_single_show(upstream_show, counters).await;
                    }

                    self.state.write().await.last_page = page + 1;
                    self.persist_state(false).await?;
                }
                Err(e) if is_rate_limited(&e) => {
                    warn!("rate limited during initial sync, backing off");
                    tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!("initial sync complete");
        Ok(())
    }

    async fn run_incremental_sync(&self, counters: &mut CycleCounters) -> anyhow::Result<()> {
        info!("starting incremental sync");

        let updates = self.upstream.get_updates(&self.config.upstream.update_window).await?;
        info!(count = updates.len(), "found updated shows upstream");

        for (upstream_id, updated_at) in updates {
            let existing = self.cache.get(upstream_id).await?;
            let needs_refresh = match &existing {
                None => true,
                Some(show) => show.upstream_updated_at.unwrap_or(0) < updated_at,
            };
            if !needs_refresh {
                continue;
            }

            match self.upstream.get_show(upstream_id).await {
                Ok(upstream_show) => {
                    self.process_single_show(upstream_show, counters).await;
                }
                Err(UpstreamError::NotFound(id)) => {
                    warn!(id, "show no longer exists upstream, skipping");
                }
                Err(e) if is_rate_limited(&e) => {
                    warn!("rate limited during incremental sync, backing off");
                    tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                }
                Err(e) => {
                    error!(id = upstream_id, error = %e, "error fetching show during incremental sync");
                }
            }
        }

        self.check_for_new_shows(counters).await;
        Ok(())
    }

    async fn check_for_new_shows(&self, counters: &mut CycleCounters) {
        let mut current_id = self.state.read().await.highest_upstream_id + 1;
        let mut consecutive_misses = 0u32;

        info!(starting_id = current_id, "checking for new shows above highest known id");

        while consecutive_misses < NEW_SHOW_PROBE_MAX_MISSES {
            match self.upstream.get_show(current_id).await {
                Ok(upstream_show) => {
                    self.process_single_show(upstream_show, counters).await;
                    consecutive_misses = 0;
                    current_id += 1;
                }
                Err(UpstreamError::NotFound(_)) => {
                    consecutive_misses += 1;
                    current_id += 1;
                }
                Err(e) if is_rate_limited(&e) => {
                    warn!("rate limited during new-show probe, backing off");
                    tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                }
                Err(e) => {
                    error!(id = current_id, error = %e, "error during new-show probe");
                    consecutive_misses += 1;
                    current_id += 1;
                }
            }
        }

        info!(
            highest_upstream_id = self.state.read().await.highest_upstream_id,
            "new-show probe complete"
        );
    }

    async fn retry_pass(&self, counters: &mut CycleCounters) -> anyhow::Result<()> {
        let now = Utc::now();
        let abandon_after = chrono::Duration::from_std(parse_duration(&self.config.sync.abandon_after)?)
            .unwrap_or(chrono::Duration::zero());
        let retry_delay = chrono::Duration::from_std(parse_duration(&self.config.sync.retry_delay)?)
            .unwrap_or(chrono::Duration::zero());

        for show in self.cache.due_for_abandonment(now, abandon_after).await? {
            warn!(title = %show.title, "show exceeded abandon_after, marking as failed");
            self.cache
                .mark_failed(
                    show.upstream_id,
                    &format!("no downstream id after {}", self.config.sync.abandon_after),
                )
                .await?;
            counters.failed += 1;
        }

        let to_retry = self.cache.ready_for_retry(now, abandon_after).await?;
        if to_retry.is_empty() {
            return Ok(());
        }
        info!(count = to_retry.len(), "retrying shows pending a downstream id");

        for show in to_retry {
            match self.upstream.get_show(show.upstream_id).await {
                Ok(upstream_show) => {
                    let mut refreshed = upstream_show.into_cache_show(now);
                    refreshed.pending_since = show.pending_since;
                    refreshed.retry_count = show.retry_count;
                    refreshed.processing_status = ProcessingStatus::PendingDownstreamId;
                    self.cache.upsert(&refreshed).await?;

                    if refreshed.downstream_catalog_id.is_some() {
                        info!(title = %refreshed.title, "show now has a downstream id, processing");
                        self.cache.increment_retry_count(show.upstream_id).await?;
                        let decision = processor::process(
                            &refreshed,
                            &self.config.filters,
                            &self.config.downstream,
                            &self.validated,
                        );
                        self.apply_decision(&refreshed, decision, counters).await;
                    } else {
                        self.cache.increment_retry_count(show.upstream_id).await?;
                        self.cache
                            .mark_pending_downstream_id(show.upstream_id, now + retry_delay, now)
                            .await?;
                    }
                }
                Err(UpstreamError::NotFound(_)) => {
                    warn!(title = %show.title, "show no longer exists upstream");
                    self.cache
                        .mark_failed(show.upstream_id, "removed from upstream catalog")
                        .await?;
                }
                Err(e) => {
                    error!(title = %show.title, error = %e, "error retrying show");
                }
            }
        }

        Ok(())
    }

    /// Upserts the fresh catalog row, decides, and applies the decision.
    /// Also advances `highest_upstream_id` so it always reflects the
    /// largest upstream id ever observed, regardless of which sync path
    /// (initial, incremental, or the new-show probe) produced this show.
    async fn process_single_show(&self, upstream_show: UpstreamShow, counters: &mut CycleCounters) {
        let now = Utc::now();
        let upstream_id = upstream_show.id;
        let show = upstream_show.into_cache_show(now);

        if let Err(e) = self.cache.upsert(&show).await {
            error!(id = upstream_id, error = %e, "failed to upsert show");
            return;
        }

        {
            let mut state = self.state.write().await;
            if upstream_id > state.highest_upstream_id {
                state.highest_upstream_id = upstream_id;
            }
        }

        let decision = processor::process(&show, &self.config.filters, &self.config.downstream, &self.validated);
        self.apply_decision(&show, decision, counters).await;
    }

    async fn apply_decision(&self, show: &Show, decision: Decision, counters: &mut CycleCounters) {
        match decision {
            Decision::Filter { reason, category } => {
                if let Err(e) = self.cache.mark_filtered(show.upstream_id, &reason, category).await {
                    error!(id = show.upstream_id, error = %e, "failed to mark show filtered");
                }
                counters.filtered += 1;
                if self.config.dry_run {
                    debug!(title = %show.title, reason, "[dry run] filtered");
                }
            }
            Decision::Retry { .. } => {
                self.schedule_retry(show).await;
                counters.skipped += 1;
            }
            Decision::Add { reason, params } => {
                if self.config.dry_run {
                    info!(title = %show.title, reason, "[dry run] would add show downstream");
                    counters.added += 1;
                    return;
                }

                match self.downstream.lookup(params.downstream_catalog_id).await {
                    Ok(None) => {
                        warn!(title = %show.title, "show not found in downstream lookup, scheduling retry");
                        self.schedule_retry(show).await;
                        counters.skipped += 1;
                    }
                    Ok(Some(series_data)) => match self.downstream.add(&params, series_data).await {
                        Ok(AddResult::Added(series_id)) => {
                            if let Err(e) = self.cache.mark_added(show.upstream_id, series_id).await {
                                error!(id = show.upstream_id, error = %e, "failed to mark show added");
                            }
                            counters.added += 1;
                            info!(title = %show.title, "added show downstream");
                        }
                        Ok(AddResult::AlreadyExists) => {
                            if let Err(e) = self
                                .cache
                                .update_status(show.upstream_id, ProcessingStatus::Exists)
                                .await
                            {
                                error!(id = show.upstream_id, error = %e, "failed to mark show exists");
                            }
                            counters.exists += 1;
                        }
                        Ok(AddResult::Failed(message)) => {
                            warn!(title = %show.title, message, "downstream rejected add");
                            if let Err(e) = self.cache.mark_failed(show.upstream_id, &message).await {
                                error!(id = show.upstream_id, error = %e, "failed to mark show failed");
                            }
                            counters.failed += 1;
                        }
                        Err(e) => {
                            error!(title = %show.title, error = %e, "error adding show downstream");
                            counters.failed += 1;
                        }
                    },
                    Err(e) => {
                        error!(title = %show.title, error = %e, "error looking up show downstream");
                        counters.failed += 1;
                    }
                }
            }
            Decision::Skip => {}
        }
    }

    async fn schedule_retry(&self, show: &Show) {
        let now = Utc::now();
        let retry_delay = parse_duration(&self.config.sync.retry_delay)
            .map(|d| chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero()))
            .unwrap_or(chrono::Duration::zero());

        if let Err(e) = self
            .cache
            .mark_pending_downstream_id(show.upstream_id, now + retry_delay, now)
            .await
        {
            error!(id = show.upstream_id, error = %e, "failed to schedule retry");
        }
    }

    async fn persist_state(&self, backup: bool) -> Result<(), crate::error::StateError> {
        let state = self.state.read().await.clone();
        state.save(&self.state_path).await?;
        if backup {
            state.backup(&self.state_path).await?;
        }
        Ok(())
    }
}

fn is_rate_limited(error: &UpstreamError) -> bool {
    error.is_rate_limit_exceeded()
}

#[async_trait]
impl CycleRunner for Orchestrator {
    async fn run_cycle(&self) -> anyhow::Result<()> {
        Orchestrator::run_cycle(self).await
    }
}
