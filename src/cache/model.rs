use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Pending,
    Filtered,
    PendingDownstreamId,
    Added,
    Exists,
    Failed,
    Skipped,
}

impl ProcessingStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Filtered => "filtered",
            ProcessingStatus::PendingDownstreamId => "pending_downstream_id",
            ProcessingStatus::Added => "added",
            ProcessingStatus::Exists => "exists",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Skipped => "skipped",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => ProcessingStatus::Pending,
            "filtered" => ProcessingStatus::Filtered,
            "pending_downstream_id" => ProcessingStatus::PendingDownstreamId,
            "added" => ProcessingStatus::Added,
            "exists" => ProcessingStatus::Exists,
            "failed" => ProcessingStatus::Failed,
            "skipped" => ProcessingStatus::Skipped,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A cached catalog entry. Keyed by `upstream_id`. Mirrors the `shows`
/// table row-for-row; `genres` is stored as a JSON array in the database
/// and expanded here.
#[derive(Debug, Clone)]
pub struct Show {
    pub upstream_id: i64,
    pub title: String,

    pub downstream_catalog_id: Option<i64>,
    pub secondary_id: Option<String>,

    pub language: Option<String>,
    pub country: Option<String>,
    pub show_type: Option<String>,
    pub status: Option<String>,
    pub premiered: Option<chrono::NaiveDate>,
    pub ended: Option<chrono::NaiveDate>,
    pub network: Option<String>,
    pub web_channel: Option<String>,
    pub genres: Vec<String>,
    pub runtime: Option<i64>,
    pub rating: Option<f64>,

    pub processing_status: ProcessingStatus,
    pub filter_reason: Option<String>,
    pub filter_category: Option<String>,
    pub downstream_series_id: Option<i64>,
    pub added_at: Option<DateTime<Utc>>,

    pub last_checked: DateTime<Utc>,
    pub upstream_updated_at: Option<i64>,
    pub retry_after: Option<DateTime<Utc>>,
    pub retry_count: i64,
    pub pending_since: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}
