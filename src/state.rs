use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::StateError;

/// Operational state persisted between cycles. Loaded once at startup,
/// written atomically at the end of each cycle, backed up after each
/// successful one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncState {
    pub last_full_sync: Option<DateTime<Utc>>,
    pub last_incremental_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_page: i64,
    #[serde(default)]
    pub highest_upstream_id: i64,
    pub last_filter_hash: Option<String>,
    pub last_updates_check: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Tries `path`, then `path.bak`, then falls back to a fresh default.
    /// Each candidate is independently validated before being accepted.
    pub async fn load(path: &Path) -> SyncState {
        if path.exists() {
            match Self::read_validated(path).await {
                Ok(state) => {
                    info!(path = %path.display(), "loaded operational state");
                    return state;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "state file failed to load, trying backup"),
            }
        }

        let backup_path = Self::backup_path(path);
        if backup_path.exists() {
            match Self::read_validated(&backup_path).await {
                Ok(state) => {
                    warn!(path = %backup_path.display(), "restored operational state from backup");
                    return state;
                }
                Err(e) => error!(path = %backup_path.display(), error = %e, "backup state file also failed to load"),
            }
        }

        warn!("starting with fresh operational state, no valid state file found");
        SyncState::default()
    }

    async fn read_validated(path: &Path) -> Result<SyncState, StateError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StateError::Read {
                path: path.display().to_string(),
                source,
            })?;

        let value: serde_json::Value = serde_json::from_str(&contents)?;
        validate_state(&value)?;

        let state: SyncState = serde_json::from_value(value)?;
        Ok(state)
    }

    /// Writes to `path.tmp` then atomically renames to `path`.
    pub async fn save(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StateError::Write {
                    path: path.display().to_string(),
                    source,
                })?;
        }

        let tmp_path = Self::tmp_path(path);
        let serialized = serde_json::to_string_pretty(self)?;

        tokio::fs::write(&tmp_path, serialized)
            .await
            .map_err(|source| StateError::Write {
                path: tmp_path.display().to_string(),
                source,
            })?;

        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|source| StateError::Write {
                path: path.display().to_string(),
                source,
            })?;

        debug!(path = %path.display(), "saved operational state");
        Ok(())
    }

    /// Copies `path` to `path.bak`. Called only after a successful cycle.
    pub async fn backup(&self, path: &Path) -> Result<(), StateError> {
        if !path.exists() {
            warn!(path = %path.display(), "cannot back up non-existent state file");
            return Ok(());
        }

        let backup_path = Self::backup_path(path);
        tokio::fs::copy(path, &backup_path)
            .await
            .map_err(|source| StateError::Write {
                path: backup_path.display().to_string(),
                source,
            })?;

        debug!(path = %backup_path.display(), "created state backup");
        Ok(())
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut os_name = path.file_name().unwrap_or_default().to_os_string();
        os_name.push(".bak");
        path.with_file_name(os_name)
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut os_name = path.file_name().unwrap_or_default().to_os_string();
        os_name.push(".tmp");
        path.with_file_name(os_name)
    }
}

/// Structural validation before trusting a state file: required keys
/// present and correctly typed. Datetime fields are already parsed by the
/// time this runs since `value` has been through `serde_json::from_str`;
/// only type-checking remains.
fn validate_state(value: &serde_json::Value) -> Result<(), StateError> {
    let obj = value
        .as_object()
        .ok_or_else(|| StateError::Invalid("state data is not a JSON object".to_string()))?;

    for key in ["last_page", "highest_upstream_id"] {
        match obj.get(key) {
            Some(v) if v.is_i64() || v.is_u64() => {}
            Some(_) => return Err(StateError::Invalid(format!("{key} must be an integer"))),
            None => {}
        }
    }

    for field in ["last_full_sync", "last_incremental_sync", "last_updates_check"] {
        if let Some(v) = obj.get(field) {
            if !v.is_null() && !v.is_string() {
                return Err(StateError::Invalid(format!("{field} must be a string or null")));
            }
            if let Some(s) = v.as_str() {
                if DateTime::parse_from_rfc3339(s).is_err() {
                    return Err(StateError::Invalid(format!("invalid datetime format for {field}")));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = SyncState::default();
        state.last_page = 7;
        state.highest_upstream_id = 4242;
        state.last_filter_hash = Some("abc123abc123abcd".to_string());
        state.save(&path).await.unwrap();

        let loaded = SyncState::load(&path).await;
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn missing_state_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let loaded = SyncState::load(&path).await;
        assert_eq!(loaded, SyncState::default());
    }

    #[tokio::test]
    async fn corrupt_primary_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut good = SyncState::default();
        good.last_page = 3;
        good.save(&path).await.unwrap();
        good.backup(&path).await.unwrap();

        tokio::fs::write(&path, "not valid json").await.unwrap();

        let loaded = SyncState::load(&path).await;
        assert_eq!(loaded.last_page, 3);
    }

    #[tokio::test]
    async fn backup_is_skipped_when_primary_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = SyncState::default();

        state.backup(&path).await.unwrap();
        assert!(!SyncState::backup_path(&path).exists());
    }
}
