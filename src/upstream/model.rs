use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::cache::{ProcessingStatus, Show};

/// A single parsed upstream catalog record. Deserialized defensively: every
/// field but `id` is optional, since the live API omits fields freely.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamShow {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(rename = "type", default)]
    pub show_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub premiered: Option<String>,
    #[serde(default)]
    pub ended: Option<String>,
    #[serde(default)]
    pub runtime: Option<i64>,
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub network: Option<NetworkRef>,
    #[serde(rename = "webChannel", default)]
    pub web_channel: Option<NetworkRef>,
    #[serde(default)]
    pub externals: Externals,
    #[serde(default)]
    pub updated: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rating {
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkRef {
    pub name: Option<String>,
    pub country: Option<CountryRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountryRef {
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Externals {
    pub thetvdb: Option<i64>,
    pub imdb: Option<String>,
}

fn parse_date(value: &Option<String>) -> Option<chrono::NaiveDate> {
    value
        .as_deref()
        .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

impl UpstreamShow {
    /// Builds a fresh cache row from this catalog record, preserving no
    /// prior processing state (the caller merges with any existing row).
    pub fn into_cache_show(self, now: DateTime<Utc>) -> Show {
        let country = self
            .network
            .as_ref()
            .and_then(|n| n.country.as_ref())
            .and_then(|c| c.code.clone())
            .or_else(|| {
                self.web_channel
                    .as_ref()
                    .and_then(|n| n.country.as_ref())
                    .and_then(|c| c.code.clone())
            });

        Show {
            upstream_id: self.id,
            title: self.name.unwrap_or_else(|| "Unknown".to_string()),
            downstream_catalog_id: self.externals.thetvdb,
            secondary_id: self.externals.imdb,
            language: self.language,
            country,
            show_type: self.show_type,
            status: self.status,
            premiered: parse_date(&self.premiered),
            ended: parse_date(&self.ended),
            network: self.network.and_then(|n| n.name),
            web_channel: self.web_channel.and_then(|n| n.name),
            genres: self.genres,
            runtime: self.runtime,
            rating: self.rating.and_then(|r| r.average),
            processing_status: ProcessingStatus::Pending,
            filter_reason: None,
            filter_category: None,
            downstream_series_id: None,
            added_at: None,
            last_checked: now,
            upstream_updated_at: self.updated,
            retry_after: None,
            retry_count: 0,
            pending_since: None,
            error_message: None,
        }
    }
}
