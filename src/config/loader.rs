use std::path::{Path, PathBuf};

use tracing::warn;

use crate::duration::parse_duration;
use crate::error::ConfigError;

use super::model::Config;
use super::sources::{apply_env_overrides, resolve_env_in_value};

/// Default location read when `--config` / `CONFIG_PATH` is not supplied.
pub const DEFAULT_CONFIG_PATH: &str = "/config/config.yaml";

pub struct ConfigLoaderOptions {
    pub path: PathBuf,
}

impl ConfigLoaderOptions {
    pub fn from_env_or(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(|| {
            std::env::var("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
        });
        Self { path }
    }
}

/// Loads configuration from YAML with environment interpolation and
/// overrides, then validates it. Missing config file is not fatal: the
/// loader proceeds with an empty document so a config built entirely from
/// environment variables is still possible.
pub fn load_config(options: &ConfigLoaderOptions) -> Result<Config, ConfigError> {
    let raw = match std::fs::read_to_string(&options.path) {
        Ok(contents) => contents,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %options.path.display(), "config file not found, using environment variables only");
            String::new()
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: options.path.display().to_string(),
                source,
            })
        }
    };

    let value: serde_yaml::Value = if raw.trim().is_empty() {
        serde_yaml::Value::Mapping(Default::default())
    } else {
        serde_yaml::from_str(&raw)?
    };

    let value = resolve_env_in_value(value)?;
    let value = apply_env_overrides(value)?;

    let config: Config = serde_yaml::from_value(value)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "WARNING", "ERROR"];
    if !valid_levels.contains(&config.logging.level.to_uppercase().as_str()) {
        errors.push(format!(
            "invalid logging.level: {}. Must be one of: {}",
            config.logging.level,
            valid_levels.join(", ")
        ));
    }

    let valid_formats = ["json", "text"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        errors.push(format!(
            "invalid logging.format: {}. Must be one of: {}",
            config.logging.format,
            valid_formats.join(", ")
        ));
    }

    if config.server.port == 0 {
        errors.push("invalid server.port: must be between 1 and 65535".to_string());
    }

    let valid_windows = ["day", "week", "month"];
    if !valid_windows.contains(&config.upstream.update_window.as_str()) {
        errors.push(format!(
            "invalid upstream.update_window: {}. Must be one of: {}",
            config.upstream.update_window,
            valid_windows.join(", ")
        ));
    }

    let valid_monitors = [
        "all", "future", "missing", "existing", "pilot", "firstSeason", "latestSeason", "none",
    ];
    if !valid_monitors.contains(&config.downstream.monitor.as_str()) {
        errors.push(format!(
            "invalid downstream.monitor: {}. Must be one of: {}",
            config.downstream.monitor,
            valid_monitors.join(", ")
        ));
    }

    for (field, value) in [
        ("sync.poll_interval", &config.sync.poll_interval),
        ("sync.retry_delay", &config.sync.retry_delay),
        ("sync.abandon_after", &config.sync.abandon_after),
    ] {
        if let Err(e) = parse_duration(value) {
            errors.push(format!("invalid {field}: {e}"));
        }
    }

    for selection in &config.filters.selections {
        for (field, value) in [
            ("premiered_after", &selection.premiered_after),
            ("premiered_before", &selection.premiered_before),
            ("ended_after", &selection.ended_after),
            ("ended_before", &selection.ended_before),
        ] {
            if let Some(v) = value {
                if chrono::NaiveDate::parse_from_str(v, "%Y-%m-%d").is_err() {
                    errors.push(format!(
                        "invalid selection {field}: {v}. Must be ISO date format (YYYY-MM-DD)"
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(
            errors
                .into_iter()
                .map(|e| format!("  - {e}"))
                .collect::<Vec<_>>()
                .join("\n"),
        ))
    }
}

pub fn state_path(config: &Config) -> PathBuf {
    Path::new(&config.storage.path).join("state.json")
}

pub fn cache_path(config: &Config) -> PathBuf {
    Path::new(&config.storage.path).join("shows.db")
}
