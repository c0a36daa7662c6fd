use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::{ConfigSelector, DownstreamConfig};
use crate::error::DownstreamError;

use super::model::{AddResult, DownstreamParams, ExistingSeries, ValidatedDownstreamParams};

/// The black-box contract the orchestrator depends on.
#[async_trait]
pub trait DownstreamLibrary: Send + Sync {
    async fn validate_config(&self) -> Result<ValidatedDownstreamParams, DownstreamError>;
    async fn lookup(&self, downstream_catalog_id: i64) -> Result<Option<serde_json::Value>, DownstreamError>;
    async fn add(
        &self,
        params: &DownstreamParams,
        series_details: serde_json::Value,
    ) -> Result<AddResult, DownstreamError>;
    async fn healthcheck(&self) -> bool;
    async fn list_all_series(&self) -> Result<Vec<ExistingSeries>, DownstreamError>;
}

pub struct SonarrClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    config: DownstreamConfig,
}

#[derive(Debug, Deserialize)]
struct SystemStatus {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RootFolder {
    id: i64,
    path: String,
}

#[derive(Debug, Deserialize)]
struct QualityProfile {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct LanguageProfile {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    id: i64,
    label: String,
}

impl SonarrClient {
    pub fn new(config: DownstreamConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with default TLS backend");

        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v3{path}", self.base_url)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("X-Api-Key", &self.api_key)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, DownstreamError> {
        let response = self
            .authed(self.http.get(self.url(path)))
            .send()
            .await
            .map_err(DownstreamError::Transport)?;

        if !response.status().is_success() {
            return Err(DownstreamError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json::<T>().await?)
    }

    fn resolve_id_or_name<'a, T>(
        selector: &ConfigSelector,
        items: &'a [T],
        id_of: impl Fn(&'a T) -> i64,
        name_of: impl Fn(&'a T) -> &'a str,
    ) -> Option<i64> {
        match selector {
            ConfigSelector::ById(id) => items.iter().find(|i| id_of(i) == *id).map(|_| *id),
            ConfigSelector::ByName(name) => items
                .iter()
                .find(|i| name_of(i).eq_ignore_ascii_case(name))
                .map(id_of),
        }
    }
}

#[async_trait]
impl DownstreamLibrary for SonarrClient {
    async fn validate_config(&self) -> Result<ValidatedDownstreamParams, DownstreamError> {
        let status: SystemStatus = self.get_json("/system/status").await.map_err(|e| {
            DownstreamError::Validation(format!("cannot connect to downstream at {}: {e}", self.base_url))
        })?;
        let server_version = status.version.unwrap_or_else(|| "unknown".to_string());
        info!(version = %server_version, "connected to downstream library manager");

        let folders: Vec<RootFolder> = self.get_json("/rootfolder").await?;
        if folders.is_empty() {
            return Err(DownstreamError::Validation(
                "no root folders configured on downstream".to_string(),
            ));
        }
        let root_folder_id = Self::resolve_id_or_name(
            &self.config.root_folder,
            &folders,
            |f| f.id,
            |f| f.path.as_str(),
        )
        .ok_or_else(|| DownstreamError::RootFolderNotFound(self.config.root_folder.to_string()))?;
        let root_folder_path = folders
            .iter()
            .find(|f| f.id == root_folder_id)
            .map(|f| f.path.clone())
            .expect("just resolved this id from this list");

        let profiles: Vec<QualityProfile> = self.get_json("/qualityprofile").await?;
        let quality_profile_id = Self::resolve_id_or_name(
            &self.config.quality_profile,
            &profiles,
            |p| p.id,
            |p| p.name.as_str(),
        )
        .ok_or_else(|| DownstreamError::QualityProfileNotFound(self.config.quality_profile.to_string()))?;

        let language_profile_id = if server_version.starts_with('4') {
            info!("downstream version 4+ detected, language profiles not required");
            None
        } else {
            match &self.config.language_profile {
                None => {
                    return Err(DownstreamError::Validation(
                        "language_profile required for downstream version 3".to_string(),
                    ))
                }
                Some(selector) => match self.get_json::<Vec<LanguageProfile>>("/languageprofile").await {
                    Ok(profiles) => Some(
                        Self::resolve_id_or_name(selector, &profiles, |p| p.id, |p| p.name.as_str())
                            .ok_or_else(|| DownstreamError::LanguageProfileNotFound(selector.to_string()))?,
                    ),
                    Err(_) => {
                        info!("language profile endpoint unavailable, assuming downstream v4+");
                        None
                    }
                },
            }
        };

        let mut tag_ids = Vec::with_capacity(self.config.tags.len());
        if !self.config.tags.is_empty() {
            let tags: Vec<Tag> = self.get_json("/tag").await?;
            for selector in &self.config.tags {
                let id = Self::resolve_id_or_name(selector, &tags, |t| t.id, |t| t.label.as_str())
                    .ok_or_else(|| DownstreamError::TagNotFound(selector.to_string()))?;
                tag_ids.push(id);
            }
        }

        info!("downstream configuration validated successfully");

        Ok(ValidatedDownstreamParams {
            root_folder_path,
            quality_profile_id,
            language_profile_id,
            tag_ids,
            server_version,
        })
    }

    async fn lookup(&self, downstream_catalog_id: i64) -> Result<Option<serde_json::Value>, DownstreamError> {
        let response = self
            .authed(
                self.http
                    .get(self.url("/series/lookup"))
                    .query(&[("term", format!("tvdb:{downstream_catalog_id}"))]),
            )
            .send()
            .await
            .map_err(DownstreamError::Transport)?;

        if !response.status().is_success() {
            return Err(DownstreamError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let results: Vec<serde_json::Value> = response.json().await?;
        Ok(results.into_iter().next())
    }

    async fn add(
        &self,
        params: &DownstreamParams,
        mut series_details: serde_json::Value,
    ) -> Result<AddResult, DownstreamError> {
        if let Some(obj) = series_details.as_object_mut() {
            obj.insert("rootFolderPath".into(), params.root_folder.clone().into());
            obj.insert("qualityProfileId".into(), params.quality_profile_id.into());
            obj.insert(
                "languageProfileId".into(),
                params.language_profile_id.unwrap_or(1).into(),
            );
            obj.insert("monitored".into(), true.into());
            obj.insert("seasonFolder".into(), true.into());
            obj.insert("addOptions".into(), serde_json::json!({"searchForMissingEpisodes": params.search_on_add}));
            obj.insert(
                "tags".into(),
                serde_json::Value::Array(params.tag_ids.iter().map(|id| (*id).into()).collect()),
            );
        }

        let response = self
            .authed(self.http.post(self.url("/series")).json(&series_details))
            .send()
            .await
            .map_err(DownstreamError::Transport)?;

        if response.status().is_success() {
            let body: serde_json::Value = response.json().await?;
            let series_id = body.get("id").and_then(|v| v.as_i64());
            return Ok(match series_id {
                Some(id) => AddResult::Added(id),
                None => AddResult::Failed("downstream did not return a series id".to_string()),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let lowered = body.to_lowercase();
        if lowered.contains("already been added") || lowered.contains("already exists") {
            return Ok(AddResult::AlreadyExists);
        }

        Ok(AddResult::Failed(body))
    }

    async fn healthcheck(&self) -> bool {
        self.get_json::<SystemStatus>("/system/status").await.is_ok()
    }

    async fn list_all_series(&self) -> Result<Vec<ExistingSeries>, DownstreamError> {
        self.get_json("/series").await
    }
}
