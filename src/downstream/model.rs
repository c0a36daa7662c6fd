use serde::Deserialize;

/// Fully resolved parameters for adding a series downstream — built once
/// from validated configuration and passed through unchanged thereafter.
#[derive(Debug, Clone)]
pub struct DownstreamParams {
    pub downstream_catalog_id: i64,
    pub title: String,
    pub root_folder: String,
    pub quality_profile_id: i64,
    pub language_profile_id: Option<i64>,
    pub monitor: String,
    pub search_on_add: bool,
    pub tag_ids: Vec<i64>,
}

/// The downstream's view of a series, as returned by its lookup endpoint.
/// Passed through to `add` unchanged; this crate never edits its fields.
#[derive(Debug, Clone, Deserialize)]
pub struct DownstreamSeriesLookup {
    #[serde(rename = "tvdbId")]
    pub tvdb_id: Option<i64>,
    #[serde(flatten)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExistingSeries {
    #[serde(rename = "tvdbId")]
    pub tvdb_id: Option<i64>,
}

/// Outcome of an add-series call; "already exists" is a successful
/// classification, not an error.
#[derive(Debug, Clone)]
pub enum AddResult {
    Added(i64),
    AlreadyExists,
    Failed(String),
}

/// Values discovered once at startup by [`super::client::validate_config`]
/// and reused for every `add` call in the process lifetime.
#[derive(Debug, Clone)]
pub struct ValidatedDownstreamParams {
    pub root_folder_path: String,
    pub quality_profile_id: i64,
    pub language_profile_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub server_version: String,
}
