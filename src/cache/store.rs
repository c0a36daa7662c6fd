use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::info;

use crate::error::CacheError;

use super::model::{ProcessingStatus, Show};

/// Wraps the connection pool for the single `shows` table. The daemon is
/// single-writer for this store; the HTTP surface reads concurrently, which
/// SQLite's WAL mode supports without external locking.
#[derive(Clone)]
pub struct Cache {
    pool: SqlitePool,
}

impl Cache {
    pub async fn connect(path: &str) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(path, "cache database opened");

        Ok(Self { pool })
    }

    /// An isolated in-memory database, useful for tests that want a real
    /// `sqlx` pool without a file on disk.
    pub async fn connect_in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn upsert(&self, show: &Show) -> Result<(), CacheError> {
        self.upsert_row(&self.pool, show).await
    }

    pub async fn upsert_many(&self, shows: &[Show]) -> Result<usize, CacheError> {
        let mut tx = self.pool.begin().await?;
        for show in shows {
            self.upsert_row(&mut *tx, show).await?;
        }
        tx.commit().await?;
        Ok(shows.len())
    }

    async fn upsert_row<'e, E>(&self, executor: E, show: &Show) -> Result<(), CacheError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let genres = serde_json::to_string(&show.genres).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO shows (
                upstream_id, title, downstream_catalog_id, secondary_id,
                language, country, show_type, status, premiered, ended,
                network, web_channel, genres, runtime, rating,
                processing_status, filter_reason, filter_category,
                downstream_series_id, added_at,
                last_checked, upstream_updated_at, retry_after, retry_count,
                pending_since, error_message
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )
            ON CONFLICT(upstream_id) DO UPDATE SET
                title = excluded.title,
                downstream_catalog_id = excluded.downstream_catalog_id,
                secondary_id = excluded.secondary_id,
                language = excluded.language,
                country = excluded.country,
                show_type = excluded.show_type,
                status = excluded.status,
                premiered = excluded.premiered,
                ended = excluded.ended,
                network = excluded.network,
                web_channel = excluded.web_channel,
                genres = excluded.genres,
                runtime = excluded.runtime,
                rating = excluded.rating,
                processing_status = excluded.processing_status,
                filter_reason = excluded.filter_reason,
                filter_category = excluded.filter_category,
                downstream_series_id = excluded.downstream_series_id,
                added_at = excluded.added_at,
                last_checked = excluded.last_checked,
                upstream_updated_at = excluded.upstream_updated_at,
                retry_after = excluded.retry_after,
                retry_count = excluded.retry_count,
                pending_since = excluded.pending_since,
                error_message = excluded.error_message
            "#,
        )
        .bind(show.upstream_id)
        .bind(&show.title)
        .bind(show.downstream_catalog_id)
        .bind(&show.secondary_id)
        .bind(&show.language)
        .bind(&show.country)
        .bind(&show.show_type)
        .bind(&show.status)
        .bind(show.premiered)
        .bind(show.ended)
        .bind(&show.network)
        .bind(&show.web_channel)
        .bind(genres)
        .bind(show.runtime)
        .bind(show.rating)
        .bind(show.processing_status.as_db_str())
        .bind(&show.filter_reason)
        .bind(&show.filter_category)
        .bind(show.downstream_series_id)
        .bind(show.added_at)
        .bind(show.last_checked)
        .bind(show.upstream_updated_at)
        .bind(show.retry_after)
        .bind(show.retry_count)
        .bind(show.pending_since)
        .bind(&show.error_message)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn get(&self, upstream_id: i64) -> Result<Option<Show>, CacheError> {
        let row = sqlx::query_as::<_, ShowRow>("SELECT * FROM shows WHERE upstream_id = ?")
            .bind(upstream_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Show::from))
    }

    pub async fn get_by_downstream_catalog_id(&self, id: i64) -> Result<Option<Show>, CacheError> {
        let row = sqlx::query_as::<_, ShowRow>("SELECT * FROM shows WHERE downstream_catalog_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Show::from))
    }

    pub async fn delete(&self, upstream_id: i64) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM shows WHERE upstream_id = ?")
            .bind(upstream_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_by_status(
        &self,
        status: ProcessingStatus,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Show>, CacheError> {
        let rows = match limit {
            Some(limit) => {
                sqlx::query_as::<_, ShowRow>(
                    "SELECT * FROM shows WHERE processing_status = ? LIMIT ? OFFSET ?",
                )
                .bind(status.as_db_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ShowRow>("SELECT * FROM shows WHERE processing_status = ?")
                    .bind(status.as_db_str())
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.into_iter().map(Show::from).collect())
    }

    /// Every currently-filtered show, for the filter re-evaluation pass.
    /// Not restartable; a fresh query is required for each re-evaluation.
    pub async fn iter_filtered(&self) -> Result<Vec<Show>, CacheError> {
        self.list_by_status(ProcessingStatus::Filtered, None, 0).await
    }

    /// Every cached show carrying a downstream id, regardless of
    /// `processing_status`, for the selection reconciliation pass.
    pub async fn list_with_downstream_catalog_id(&self) -> Result<Vec<Show>, CacheError> {
        let rows = sqlx::query_as::<_, ShowRow>(
            "SELECT * FROM shows WHERE downstream_catalog_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Show::from).collect())
    }

    pub async fn ready_for_retry(
        &self,
        now: DateTime<Utc>,
        abandon_after: chrono::Duration,
    ) -> Result<Vec<Show>, CacheError> {
        let horizon = now - abandon_after;
        let rows = sqlx::query_as::<_, ShowRow>(
            r#"
            SELECT * FROM shows
            WHERE processing_status = ?
            AND retry_after <= ?
            AND (pending_since IS NULL OR pending_since > ?)
            "#,
        )
        .bind(ProcessingStatus::PendingDownstreamId.as_db_str())
        .bind(now)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Show::from).collect())
    }

    pub async fn due_for_abandonment(
        &self,
        now: DateTime<Utc>,
        abandon_after: chrono::Duration,
    ) -> Result<Vec<Show>, CacheError> {
        let horizon = now - abandon_after;
        let rows = sqlx::query_as::<_, ShowRow>(
            r#"
            SELECT * FROM shows
            WHERE processing_status = ?
            AND pending_since IS NOT NULL
            AND pending_since <= ?
            "#,
        )
        .bind(ProcessingStatus::PendingDownstreamId.as_db_str())
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Show::from).collect())
    }

    pub async fn ids_updated_since(&self, unix_ts: i64) -> Result<Vec<i64>, CacheError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT upstream_id FROM shows WHERE upstream_updated_at >= ?")
                .bind(unix_ts)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn mark_added(&self, upstream_id: i64, series_id: i64) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            UPDATE shows SET
                processing_status = ?,
                downstream_series_id = ?,
                added_at = ?,
                filter_reason = NULL,
                filter_category = NULL,
                error_message = NULL,
                pending_since = NULL
            WHERE upstream_id = ?
            "#,
        )
        .bind(ProcessingStatus::Added.as_db_str())
        .bind(series_id)
        .bind(Utc::now())
        .bind(upstream_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_filtered(
        &self,
        upstream_id: i64,
        reason: &str,
        category: &str,
    ) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            UPDATE shows SET
                processing_status = ?,
                filter_reason = ?,
                filter_category = ?,
                downstream_series_id = NULL,
                error_message = NULL
            WHERE upstream_id = ?
            "#,
        )
        .bind(ProcessingStatus::Filtered.as_db_str())
        .bind(reason)
        .bind(category)
        .bind(upstream_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Sets `retry_after`; sets `pending_since` only if it was previously
    /// null, per the entity invariant that it never advances once set.
    pub async fn mark_pending_downstream_id(
        &self,
        upstream_id: i64,
        retry_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            UPDATE shows SET
                processing_status = ?,
                retry_after = ?,
                pending_since = COALESCE(pending_since, ?),
                error_message = ?
            WHERE upstream_id = ?
            "#,
        )
        .bind(ProcessingStatus::PendingDownstreamId.as_db_str())
        .bind(retry_after)
        .bind(now)
        .bind("no downstream id available")
        .bind(upstream_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, upstream_id: i64, error: &str) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            UPDATE shows SET processing_status = ?, error_message = ?
            WHERE upstream_id = ?
            "#,
        )
        .bind(ProcessingStatus::Failed.as_db_str())
        .bind(error)
        .bind(upstream_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_status(
        &self,
        upstream_id: i64,
        status: ProcessingStatus,
    ) -> Result<(), CacheError> {
        sqlx::query("UPDATE shows SET processing_status = ? WHERE upstream_id = ?")
            .bind(status.as_db_str())
            .bind(upstream_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn increment_retry_count(&self, upstream_id: i64) -> Result<i64, CacheError> {
        let row: (i64,) = sqlx::query_as(
            "UPDATE shows SET retry_count = retry_count + 1 WHERE upstream_id = ? RETURNING retry_count",
        )
        .bind(upstream_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn count_by_status(&self) -> Result<HashMap<String, i64>, CacheError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT processing_status, COUNT(*) FROM shows GROUP BY processing_status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn count_by_filter_category(&self) -> Result<HashMap<String, i64>, CacheError> {
        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT filter_category, COUNT(*) FROM shows
            WHERE processing_status = ? AND filter_category IS NOT NULL
            GROUP BY filter_category
            "#,
        )
        .bind(ProcessingStatus::Filtered.as_db_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(category, count)| category.map(|c| (c, count)))
            .collect())
    }

    pub async fn count_by_retry_count(&self) -> Result<HashMap<i64, i64>, CacheError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT retry_count, COUNT(*) FROM shows
            WHERE processing_status = ?
            GROUP BY retry_count
            "#,
        )
        .bind(ProcessingStatus::PendingDownstreamId.as_db_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn total_count(&self) -> Result<i64, CacheError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shows")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn max_upstream_id(&self) -> Result<i64, CacheError> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(upstream_id) FROM shows")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.unwrap_or(0))
    }
}

/// Flat row shape matching the `shows` table, decoupled from [`Show`] so
/// `genres` can round-trip through its JSON-text column representation.
#[derive(sqlx::FromRow)]
struct ShowRow {
    upstream_id: i64,
    title: String,
    downstream_catalog_id: Option<i64>,
    secondary_id: Option<String>,
    language: Option<String>,
    country: Option<String>,
    show_type: Option<String>,
    status: Option<String>,
    premiered: Option<NaiveDate>,
    ended: Option<NaiveDate>,
    network: Option<String>,
    web_channel: Option<String>,
    genres: String,
    runtime: Option<i64>,
    rating: Option<f64>,
    processing_status: String,
    filter_reason: Option<String>,
    filter_category: Option<String>,
    downstream_series_id: Option<i64>,
    added_at: Option<DateTime<Utc>>,
    last_checked: DateTime<Utc>,
    upstream_updated_at: Option<i64>,
    retry_after: Option<DateTime<Utc>>,
    retry_count: i64,
    pending_since: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl From<ShowRow> for Show {
    fn from(row: ShowRow) -> Self {
        let genres: Vec<String> = serde_json::from_str(&row.genres).unwrap_or_default();
        let processing_status =
            ProcessingStatus::from_db_str(&row.processing_status).unwrap_or(ProcessingStatus::Pending);

        Show {
            upstream_id: row.upstream_id,
            title: row.title,
            downstream_catalog_id: row.downstream_catalog_id,
            secondary_id: row.secondary_id,
            language: row.language,
            country: row.country,
            show_type: row.show_type,
            status: row.status,
            premiered: row.premiered,
            ended: row.ended,
            network: row.network,
            web_channel: row.web_channel,
            genres,
            runtime: row.runtime,
            rating: row.rating,
            processing_status,
            filter_reason: row.filter_reason,
            filter_category: row.filter_category,
            downstream_series_id: row.downstream_series_id,
            added_at: row.added_at,
            last_checked: row.last_checked,
            upstream_updated_at: row.upstream_updated_at,
            retry_after: row.retry_after,
            retry_count: row.retry_count,
            pending_since: row.pending_since,
            error_message: row.error_message,
        }
    }
}
