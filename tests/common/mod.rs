//! Shared test doubles for scenario tests: in-process fakes for the
//! upstream catalog and downstream library manager, plus a factory for a
//! minimal valid [`Config`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use showsync::config::{Config, ConfigSelector, DownstreamConfig};
use showsync::downstream::{AddResult, DownstreamLibrary, ExistingSeries, ValidatedDownstreamParams};
use showsync::error::{DownstreamError, UpstreamError};
use showsync::upstream::UpstreamCatalog;

/// A scripted upstream catalog: pages and individual shows are supplied
/// up front and returned verbatim, with an interior `Mutex` so call
/// counts and later overrides are observable/mutable from the test body.
#[derive(Default)]
pub struct FakeUpstream {
    pub pages: Mutex<HashMap<u64, Vec<serde_json::Value>>>,
    pub shows: Mutex<HashMap<i64, serde_json::Value>>,
    pub updates: Mutex<HashMap<i64, i64>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, page: u64, shows: Vec<serde_json::Value>) -> Self {
        self.pages.lock().unwrap().insert(page, shows);
        self
    }

    pub fn with_show(self, id: i64, show: serde_json::Value) -> Self {
        self.shows.lock().unwrap().insert(id, show);
        self
    }

    pub fn set_show(&self, id: i64, show: serde_json::Value) {
        self.shows.lock().unwrap().insert(id, show);
    }

    pub fn remove_show(&self, id: i64) {
        self.shows.lock().unwrap().remove(&id);
    }

    pub fn with_update(self, id: i64, updated: i64) -> Self {
        self.updates.lock().unwrap().insert(id, updated);
        self
    }
}

#[async_trait]
impl UpstreamCatalog for FakeUpstream {
    async fn get_page(&self, page: u64) -> Result<Vec<showsync::upstream::UpstreamShow>, UpstreamError> {
        let pages = self.pages.lock().unwrap();
        match pages.get(&page) {
            Some(shows) => shows
                .iter()
                .map(|v| serde_json::from_value(v.clone()).map_err(UpstreamError::Parse))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    async fn get_show(&self, id: i64) -> Result<showsync::upstream::UpstreamShow, UpstreamError> {
        let shows = self.shows.lock().unwrap();
        match shows.get(&id) {
            Some(v) => serde_json::from_value(v.clone()).map_err(UpstreamError::Parse),
            None => Err(UpstreamError::NotFound(id)),
        }
    }

    async fn get_updates(&self, _window: &str) -> Result<HashMap<i64, i64>, UpstreamError> {
        Ok(self.updates.lock().unwrap().clone())
    }
}

/// A scripted downstream library manager: lookup results and add outcomes
/// are keyed by `downstream_catalog_id`.
#[derive(Default)]
pub struct FakeDownstream {
    pub lookups: Mutex<HashMap<i64, serde_json::Value>>,
    pub add_results: Mutex<HashMap<i64, AddResult>>,
    pub added_calls: Mutex<Vec<i64>>,
    pub existing_series: Mutex<Vec<ExistingSeries>>,
}

impl FakeDownstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookup(self, id: i64, result: serde_json::Value) -> Self {
        self.lookups.lock().unwrap().insert(id, result);
        self
    }

    pub fn with_add_result(self, id: i64, result: AddResult) -> Self {
        self.add_results.lock().unwrap().insert(id, result);
        self
    }
}

#[async_trait]
impl DownstreamLibrary for FakeDownstream {
    async fn validate_config(&self) -> Result<ValidatedDownstreamParams, DownstreamError> {
        Ok(ValidatedDownstreamParams {
            root_folder_path: "/tv".to_string(),
            quality_profile_id: 1,
            language_profile_id: None,
            tag_ids: Vec::new(),
            server_version: "4.0.0".to_string(),
        })
    }

    async fn lookup(&self, downstream_catalog_id: i64) -> Result<Option<serde_json::Value>, DownstreamError> {
        Ok(self.lookups.lock().unwrap().get(&downstream_catalog_id).cloned())
    }

    async fn add(
        &self,
        params: &showsync::downstream::DownstreamParams,
        _series_details: serde_json::Value,
    ) -> Result<AddResult, DownstreamError> {
        self.added_calls.lock().unwrap().push(params.downstream_catalog_id);
        Ok(self
            .add_results
            .lock()
            .unwrap()
            .get(&params.downstream_catalog_id)
            .cloned()
            .unwrap_or(AddResult::Failed("no scripted result".to_string())))
    }

    async fn healthcheck(&self) -> bool {
        true
    }

    async fn list_all_series(&self) -> Result<Vec<ExistingSeries>, DownstreamError> {
        Ok(self.existing_series.lock().unwrap().clone())
    }
}

/// A minimal config that passes validation: one selection admitting every
/// English-language show, dry_run disabled so decisions reach the
/// downstream fake.
pub fn test_config() -> Config {
    let mut config = Config {
        upstream: Default::default(),
        sync: Default::default(),
        filters: Default::default(),
        downstream: DownstreamConfig {
            url: "http://sonarr.local".to_string(),
            api_key: "key".to_string(),
            root_folder: ConfigSelector::ByName("/tv".to_string()),
            quality_profile: ConfigSelector::ByName("HD".to_string()),
            language_profile: None,
            monitor: "all".to_string(),
            search_on_add: true,
            tags: Vec::new(),
        },
        storage: Default::default(),
        logging: Default::default(),
        server: Default::default(),
        dry_run: false,
    };

    config.filters.selections.push(showsync::config::SelectionConfig {
        name: Some("english".to_string()),
        languages: vec!["English".to_string()],
        ..Default::default()
    });
    config.sync.retry_delay = "1s".to_string();
    config.sync.abandon_after = "1h".to_string();

    config
}

pub fn tvmaze_show(id: i64, name: &str, language: Option<&str>, tvdb_id: Option<i64>) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "language": language,
        "externals": { "thetvdb": tvdb_id },
        "updated": 10,
    })
}
