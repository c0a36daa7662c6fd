use serde::{Deserialize, Serialize};

/// A downstream selector that may be configured either by human-readable
/// name or by the library manager's numeric ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigSelector {
    ById(i64),
    ByName(String),
}

impl std::fmt::Display for ConfigSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSelector::ById(id) => write!(f, "{id}"),
            ConfigSelector::ByName(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_key: Option<String>,
    pub rate_limit: u32,
    pub update_window: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: 20,
            update_window: "week".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub poll_interval: String,
    pub retry_delay: String,
    pub abandon_after: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: "6h".to_string(),
            retry_delay: "1w".to_string(),
            abandon_after: "1y".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludeSet {
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub networks: Vec<String>,
}

/// One accept rule: a conjunction of constraints. An empty list constraint
/// is vacuously satisfied; range bounds fail a show whose field is null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub name: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub status: Vec<String>,
    pub premiered_after: Option<String>,
    pub premiered_before: Option<String>,
    pub ended_after: Option<String>,
    pub ended_before: Option<String>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub min_runtime: Option<i64>,
    pub max_runtime: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    pub exclude: ExcludeSet,
    pub selections: Vec<SelectionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    pub url: String,
    pub api_key: String,
    pub root_folder: ConfigSelector,
    pub quality_profile: ConfigSelector,
    #[serde(default)]
    pub language_profile: Option<ConfigSelector>,
    #[serde(default = "default_monitor")]
    pub monitor: String,
    #[serde(default = "default_true")]
    pub search_on_add: bool,
    #[serde(default)]
    pub tags: Vec<ConfigSelector>,
}

fn default_monitor() -> String {
    "all".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "/data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    pub downstream: DownstreamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

fn default_dry_run() -> bool {
    true
}
