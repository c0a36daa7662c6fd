//! The pure decision function at the heart of a sync cycle, plus the
//! filter re-evaluation pass that runs when the filter specification
//! itself changes between cycles.

use tracing::info;

use crate::cache::{Cache, ProcessingStatus, Show};
use crate::config::{Config, ConfigSelector, DownstreamConfig, FiltersConfig};
use crate::downstream::{DownstreamParams, ValidatedDownstreamParams};
use crate::error::CacheError;
use crate::filter::{filter_hash, matches_any_exclude, matching_selection};
use crate::state::SyncState;

/// The four outcomes `process` can reach for a single show. `Skip` exists
/// in the state machine as a `SKIPPED` status but `process` never produces
/// it itself; it is reserved for manual/administrative use.
#[derive(Debug, Clone)]
pub enum Decision {
    Add {
        reason: String,
        params: DownstreamParams,
    },
    Filter {
        reason: String,
        category: &'static str,
    },
    Retry {
        reason: String,
        category: &'static str,
    },
    Skip,
}

/// Pure function: classifies a show against the current filter
/// specification and validated downstream configuration.
pub fn process(
    show: &Show,
    filters: &FiltersConfig,
    downstream: &DownstreamConfig,
    validated: &ValidatedDownstreamParams,
) -> Decision {
    let Some(downstream_catalog_id) = show.downstream_catalog_id else {
        return Decision::Retry {
            reason: "no downstream id".to_string(),
            category: "downstream-id",
        };
    };

    if matches_any_exclude(filters, show) {
        return Decision::Filter {
            reason: "matched a global exclude rule".to_string(),
            category: "exclude",
        };
    }

    if filters.selections.is_empty() {
        return Decision::Filter {
            reason: "no selections configured".to_string(),
            category: "selection",
        };
    }

    match matching_selection(filters, show) {
        Some(selection) => {
            let name = selection.name.clone().unwrap_or_else(|| "unnamed".to_string());
            Decision::Add {
                reason: format!("matched: {name}"),
                params: build_params(show, downstream_catalog_id, downstream, validated),
            }
        }
        None => Decision::Filter {
            reason: "no selection matched".to_string(),
            category: "selection",
        },
    }
}

fn build_params(
    show: &Show,
    downstream_catalog_id: i64,
    downstream: &DownstreamConfig,
    validated: &ValidatedDownstreamParams,
) -> DownstreamParams {
    DownstreamParams {
        downstream_catalog_id,
        title: show.title.clone(),
        root_folder: validated.root_folder_path.clone(),
        quality_profile_id: validated.quality_profile_id,
        language_profile_id: validated.language_profile_id,
        monitor: downstream.monitor.clone(),
        search_on_add: downstream.search_on_add,
        tag_ids: validated.tag_ids.clone(),
    }
}

/// Recomputes the current filter hash and, if it differs from the last
/// recorded one (and a previous hash existed), re-evaluates every
/// currently-filtered show. Shows that now pass go back to `PENDING` for
/// the next cycle to pick up; shows still filtered have their reason
/// refreshed in place. A first run (no previous hash) only records it.
pub async fn check_filter_change(
    cache: &Cache,
    config: &Config,
    state: &mut SyncState,
) -> Result<(), CacheError> {
    let current_hash = filter_hash(&config.filters);

    let changed = state
        .last_filter_hash
        .as_deref()
        .is_some_and(|previous| previous != current_hash);

    if changed {
        info!(
            previous = state.last_filter_hash.as_deref().unwrap_or(""),
            current = %current_hash,
            "filter specification changed, re-evaluating filtered shows"
        );
        re_evaluate_filtered_shows(cache, config).await?;
    }

    state.last_filter_hash = Some(current_hash);
    Ok(())
}

/// Re-evaluates every currently-`FILTERED` show against the current
/// filter specification. Shows that now pass go back to `PENDING` for the
/// next cycle to act on; shows still filtered have their reason refreshed
/// in place. Returns the number of shows that newly passed.
pub async fn re_evaluate_filtered_shows(cache: &Cache, config: &Config) -> Result<usize, CacheError> {
    let placeholder = ValidatedDownstreamParams {
        root_folder_path: String::new(),
        quality_profile_id: 0,
        language_profile_id: None,
        tag_ids: Vec::new(),
        server_version: String::new(),
    };

    let mut changed = 0;

    for show in cache.iter_filtered().await? {
        match process(&show, &config.filters, &config.downstream, &placeholder) {
            Decision::Add { .. } => {
                cache.update_status(show.upstream_id, ProcessingStatus::Pending).await?;
                changed += 1;
                info!(title = %show.title, "show now passes filters");
            }
            Decision::Filter { reason, category } => {
                if show.filter_reason.as_deref() != Some(reason.as_str()) {
                    cache.mark_filtered(show.upstream_id, &reason, category).await?;
                }
            }
            Decision::Retry { .. } | Decision::Skip => {}
        }
    }

    info!(changed, "re-evaluated filtered shows");
    Ok(changed)
}

/// Used only by tests and the selector-resolution validation path to
/// describe a downstream selector in diagnostics.
pub fn describe_selector(selector: &ConfigSelector) -> String {
    selector.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownstreamConfig, ExcludeSet, SelectionConfig};
    use chrono::{TimeZone, Utc};

    fn base_show() -> Show {
        Show {
            upstream_id: 1,
            title: "Example".to_string(),
            downstream_catalog_id: Some(42),
            secondary_id: None,
            language: Some("en".to_string()),
            country: Some("US".to_string()),
            show_type: Some("Scripted".to_string()),
            status: Some("Running".to_string()),
            premiered: chrono::NaiveDate::from_ymd_opt(2020, 1, 1),
            ended: None,
            network: Some("ABC".to_string()),
            web_channel: None,
            genres: vec!["Drama".to_string()],
            runtime: Some(60),
            rating: Some(8.0),
            processing_status: ProcessingStatus::Pending,
            filter_reason: None,
            filter_category: None,
            downstream_series_id: None,
            added_at: None,
            last_checked: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            upstream_updated_at: None,
            retry_after: None,
            retry_count: 0,
            pending_since: None,
            error_message: None,
        }
    }

    fn base_downstream_config() -> DownstreamConfig {
        DownstreamConfig {
            url: "http://sonarr.local".to_string(),
            api_key: "key".to_string(),
            root_folder: ConfigSelector::ByName("/tv".to_string()),
            quality_profile: ConfigSelector::ByName("HD".to_string()),
            language_profile: None,
            monitor: "all".to_string(),
            search_on_add: true,
            tags: Vec::new(),
        }
    }

    fn validated() -> ValidatedDownstreamParams {
        ValidatedDownstreamParams {
            root_folder_path: "/tv".to_string(),
            quality_profile_id: 1,
            language_profile_id: None,
            tag_ids: Vec::new(),
            server_version: "4.0.0".to_string(),
        }
    }

    #[test]
    fn missing_downstream_id_retries() {
        let mut show = base_show();
        show.downstream_catalog_id = None;
        let filters = FiltersConfig::default();

        let decision = process(&show, &filters, &base_downstream_config(), &validated());
        assert!(matches!(decision, Decision::Retry { category: "downstream-id", .. }));
    }

    #[test]
    fn global_exclude_filters_before_selections_are_checked() {
        let show = base_show();
        let filters = FiltersConfig {
            exclude: ExcludeSet {
                genres: vec!["Drama".to_string()],
                ..Default::default()
            },
            selections: vec![SelectionConfig::default()],
        };

        let decision = process(&show, &filters, &base_downstream_config(), &validated());
        assert!(matches!(decision, Decision::Filter { category: "exclude", .. }));
    }

    #[test]
    fn empty_selections_filters_everything() {
        let show = base_show();
        let filters = FiltersConfig::default();

        let decision = process(&show, &filters, &base_downstream_config(), &validated());
        assert!(matches!(decision, Decision::Filter { category: "selection", .. }));
    }

    #[test]
    fn matching_selection_adds() {
        let show = base_show();
        let filters = FiltersConfig {
            exclude: ExcludeSet::default(),
            selections: vec![SelectionConfig {
                name: Some("drama".to_string()),
                genres: vec!["Drama".to_string()],
                ..Default::default()
            }],
        };

        let decision = process(&show, &filters, &base_downstream_config(), &validated());
        match decision {
            Decision::Add { reason, params } => {
                assert_eq!(reason, "matched: drama");
                assert_eq!(params.downstream_catalog_id, 42);
            }
            other => panic!("expected Add, got {other:?}"),
        }
    }

    #[test]
    fn no_selection_match_filters() {
        let show = base_show();
        let filters = FiltersConfig {
            exclude: ExcludeSet::default(),
            selections: vec![SelectionConfig {
                genres: vec!["Comedy".to_string()],
                ..Default::default()
            }],
        };

        let decision = process(&show, &filters, &base_downstream_config(), &validated());
        assert!(matches!(decision, Decision::Filter { category: "selection", .. }));
    }

    fn base_config() -> Config {
        Config {
            upstream: Default::default(),
            sync: Default::default(),
            filters: FiltersConfig::default(),
            downstream: base_downstream_config(),
            storage: Default::default(),
            logging: Default::default(),
            server: Default::default(),
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn re_evaluate_filtered_shows_returns_newly_passing_shows() {
        let cache = Cache::connect_in_memory().await.unwrap();

        let mut matching = base_show();
        matching.upstream_id = 10;
        matching.language = Some("English".to_string());
        matching.processing_status = ProcessingStatus::Filtered;
        matching.filter_reason = Some("no selection matched".to_string());
        matching.filter_category = Some("selection".to_string());
        cache.upsert(&matching).await.unwrap();

        let mut non_matching = base_show();
        non_matching.upstream_id = 11;
        non_matching.language = Some("French".to_string());
        non_matching.processing_status = ProcessingStatus::Filtered;
        non_matching.filter_reason = Some("no selection matched".to_string());
        non_matching.filter_category = Some("selection".to_string());
        cache.upsert(&non_matching).await.unwrap();

        let mut config = base_config();
        config.filters.selections.push(SelectionConfig {
            languages: vec!["English".to_string()],
            ..Default::default()
        });

        let changed = re_evaluate_filtered_shows(&cache, &config).await.unwrap();
        assert_eq!(changed, 1);

        let reevaluated = cache.get(10).await.unwrap().unwrap();
        assert_eq!(reevaluated.processing_status, ProcessingStatus::Pending);

        let still_filtered = cache.get(11).await.unwrap().unwrap();
        assert_eq!(still_filtered.processing_status, ProcessingStatus::Filtered);
    }

    #[tokio::test]
    async fn check_filter_change_only_re_evaluates_on_a_real_change() {
        let cache = Cache::connect_in_memory().await.unwrap();

        let mut show = base_show();
        show.upstream_id = 20;
        show.language = Some("English".to_string());
        show.processing_status = ProcessingStatus::Filtered;
        show.filter_reason = Some("no selection matched".to_string());
        show.filter_category = Some("selection".to_string());
        cache.upsert(&show).await.unwrap();

        let mut config = base_config();
        config.filters.selections.push(SelectionConfig {
            languages: vec!["English".to_string()],
            ..Default::default()
        });

        let mut state = SyncState::default();
        check_filter_change(&cache, &config, &mut state).await.unwrap();
        // First run with no previous hash only records it, it never re-evaluates.
        let untouched = cache.get(20).await.unwrap().unwrap();
        assert_eq!(untouched.processing_status, ProcessingStatus::Filtered);

        check_filter_change(&cache, &config, &mut state).await.unwrap();
        // Same hash as before: still no re-evaluation.
        let still_untouched = cache.get(20).await.unwrap().unwrap();
        assert_eq!(still_untouched.processing_status, ProcessingStatus::Filtered);

        config.filters.selections[0].languages = vec!["English".to_string(), "French".to_string()];
        check_filter_change(&cache, &config, &mut state).await.unwrap();
        let reevaluated = cache.get(20).await.unwrap().unwrap();
        assert_eq!(reevaluated.processing_status, ProcessingStatus::Pending);
    }
}
