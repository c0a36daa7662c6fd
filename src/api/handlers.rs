use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::cache::ProcessingStatus;
use crate::error::ApiError;
use crate::processor;

use super::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database_ok = state.cache.is_healthy().await;
    let downstream_ok = state.downstream.healthcheck().await;
    let all_healthy = database_ok && downstream_ok;

    let body = json!({
        "status": if all_healthy { "ready" } else { "not_ready" },
        "checks": {
            "database": database_ok,
            "downstream": downstream_ok,
        }
    });

    let status = if all_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}

pub async fn metrics(State(state): State<AppState>) -> String {
    if let Err(e) = state.orchestrator.stats().refresh(&state.cache).await {
        tracing::warn!(error = %e, "failed to refresh statistics before metrics scrape");
    }
    state.metrics_handle.render()
}

pub async fn trigger(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    if state.scheduler.is_running() {
        return Err(ApiError::conflict("sync cycle already in progress"));
    }

    state.scheduler.trigger_now();
    Ok(Json(json!({ "status": "triggered" })))
}

pub async fn state(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let sync_state = state.orchestrator.state().read().await.clone();
    let status_counts = state.cache.count_by_status().await?;
    let total_shows = state.cache.total_count().await?;

    Ok(Json(json!({
        "last_full_sync": sync_state.last_full_sync,
        "last_incremental_sync": sync_state.last_incremental_sync,
        "highest_upstream_id": sync_state.highest_upstream_id,
        "next_scheduled_run": state.scheduler.next_run().await,
        "sync_running": state.scheduler.is_running(),
        "status_counts": status_counts,
        "total_shows": total_shows,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListShowsQuery {
    status: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    100
}

const MAX_LIMIT: i64 = 1000;

pub async fn list_shows(
    State(state): State<AppState>,
    Query(query): Query<ListShowsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.min(MAX_LIMIT).max(0);

    let shows = match query.status.as_deref() {
        Some(raw) => {
            let status = ProcessingStatus::from_db_str(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status: {raw}")))?;
            state.cache.list_by_status(status, Some(limit), query.offset).await?
        }
        None => Vec::new(),
    };

    Ok(Json(json!({
        "shows": shows.iter().map(show_to_json).collect::<Vec<_>>(),
        "count": shows.len(),
        "limit": limit,
        "offset": query.offset,
    })))
}

fn show_to_json(show: &crate::cache::Show) -> serde_json::Value {
    json!({
        "upstream_id": show.upstream_id,
        "title": show.title,
        "downstream_catalog_id": show.downstream_catalog_id,
        "processing_status": show.processing_status.as_db_str(),
        "filter_reason": show.filter_reason,
        "filter_category": show.filter_category,
        "downstream_series_id": show.downstream_series_id,
        "retry_count": show.retry_count,
        "pending_since": show.pending_since,
        "error_message": show.error_message,
        "last_checked": show.last_checked,
    })
}

pub async fn refilter(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let changed = processor::re_evaluate_filtered_shows(&state.cache, state.orchestrator.config())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(json!({
        "status": "complete",
        "shows_re_evaluated": changed,
    })))
}
