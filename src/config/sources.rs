//! Environment-variable resolution applied to the raw YAML value tree before
//! it is deserialized into [`super::model::Config`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::error::ConfigError;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern compiles"));

/// Resolves `${VAR}` / `${VAR_FILE}` placeholders in a single string.
///
/// `${VAR_FILE}` takes precedence: if `VAR_FILE` is set in the environment,
/// its value is treated as a path and the placeholder resolves to the
/// file's trimmed contents (the Docker-secrets convention). Otherwise `VAR`
/// itself is read directly from the environment.
pub fn resolve_env_value(value: &str) -> Result<String, ConfigError> {
    let mut err = None;
    let resolved = PLACEHOLDER.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let file_var = format!("{var_name}_FILE");

        if let Ok(file_path) = std::env::var(&file_var) {
            match std::fs::read_to_string(&file_path) {
                Ok(contents) => return contents.trim().to_string(),
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                    err.get_or_insert(ConfigError::EnvFileNotFound {
                        var: var_name.to_string(),
                        path: file_path,
                    });
                    return String::new();
                }
                Err(source) => {
                    err.get_or_insert(ConfigError::EnvFileUnreadable {
                        var: var_name.to_string(),
                        source,
                    });
                    return String::new();
                }
            }
        }

        match std::env::var(var_name) {
            Ok(v) => v,
            Err(_) => {
                err.get_or_insert(ConfigError::EnvVarNotFound(var_name.to_string()));
                String::new()
            }
        }
    });

    match err {
        Some(e) => Err(e),
        None => Ok(resolved.into_owned()),
    }
}

/// Recursively walks a YAML value tree, resolving `${...}` placeholders in
/// every string (including list elements), mirroring the Python original's
/// `resolve_env_in_dict`.
pub fn resolve_env_in_value(value: Value) -> Result<Value, ConfigError> {
    match value {
        Value::String(s) => Ok(Value::String(resolve_env_value(&s)?)),
        Value::Sequence(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_env_in_value(item)?);
            }
            Ok(Value::Sequence(resolved))
        }
        Value::Mapping(map) => {
            let mut resolved = serde_yaml::Mapping::with_capacity(map.len());
            for (k, v) in map {
                resolved.insert(k, resolve_env_in_value(v)?);
            }
            Ok(Value::Mapping(resolved))
        }
        other => Ok(other),
    }
}

/// One `SECTION_KEY[_SUBKEY]` environment override mapped onto a path
/// through the config value tree, with the coercion its target field needs.
struct EnvMapping {
    var: &'static str,
    path: &'static [&'static str],
    kind: ValueKind,
}

enum ValueKind {
    String,
    StringList,
    Integer,
    Boolean,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping { var: "UPSTREAM_API_KEY", path: &["upstream", "api_key"], kind: ValueKind::String },
    EnvMapping { var: "UPSTREAM_RATE_LIMIT", path: &["upstream", "rate_limit"], kind: ValueKind::Integer },
    EnvMapping { var: "UPSTREAM_UPDATE_WINDOW", path: &["upstream", "update_window"], kind: ValueKind::String },
    EnvMapping { var: "SYNC_POLL_INTERVAL", path: &["sync", "poll_interval"], kind: ValueKind::String },
    EnvMapping { var: "SYNC_RETRY_DELAY", path: &["sync", "retry_delay"], kind: ValueKind::String },
    EnvMapping { var: "SYNC_ABANDON_AFTER", path: &["sync", "abandon_after"], kind: ValueKind::String },
    EnvMapping { var: "FILTERS_EXCLUDE_GENRES", path: &["filters", "exclude", "genres"], kind: ValueKind::StringList },
    EnvMapping { var: "FILTERS_EXCLUDE_TYPES", path: &["filters", "exclude", "types"], kind: ValueKind::StringList },
    EnvMapping { var: "FILTERS_EXCLUDE_LANGUAGES", path: &["filters", "exclude", "languages"], kind: ValueKind::StringList },
    EnvMapping { var: "FILTERS_EXCLUDE_COUNTRIES", path: &["filters", "exclude", "countries"], kind: ValueKind::StringList },
    EnvMapping { var: "FILTERS_EXCLUDE_NETWORKS", path: &["filters", "exclude", "networks"], kind: ValueKind::StringList },
    EnvMapping { var: "DOWNSTREAM_URL", path: &["downstream", "url"], kind: ValueKind::String },
    EnvMapping { var: "DOWNSTREAM_API_KEY", path: &["downstream", "api_key"], kind: ValueKind::String },
    EnvMapping { var: "DOWNSTREAM_ROOT_FOLDER", path: &["downstream", "root_folder"], kind: ValueKind::String },
    EnvMapping { var: "DOWNSTREAM_QUALITY_PROFILE", path: &["downstream", "quality_profile"], kind: ValueKind::String },
    EnvMapping { var: "DOWNSTREAM_LANGUAGE_PROFILE", path: &["downstream", "language_profile"], kind: ValueKind::String },
    EnvMapping { var: "DOWNSTREAM_MONITOR", path: &["downstream", "monitor"], kind: ValueKind::String },
    EnvMapping { var: "DOWNSTREAM_SEARCH_ON_ADD", path: &["downstream", "search_on_add"], kind: ValueKind::Boolean },
    EnvMapping { var: "DOWNSTREAM_TAGS", path: &["downstream", "tags"], kind: ValueKind::StringList },
    EnvMapping { var: "STORAGE_PATH", path: &["storage", "path"], kind: ValueKind::String },
    EnvMapping { var: "LOGGING_LEVEL", path: &["logging", "level"], kind: ValueKind::String },
    EnvMapping { var: "LOGGING_FORMAT", path: &["logging", "format"], kind: ValueKind::String },
    EnvMapping { var: "SERVER_ENABLED", path: &["server", "enabled"], kind: ValueKind::Boolean },
    EnvMapping { var: "SERVER_PORT", path: &["server", "port"], kind: ValueKind::Integer },
    EnvMapping { var: "DRY_RUN", path: &["dry_run"], kind: ValueKind::Boolean },
];

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn set_path(root: &mut Value, path: &[&str], value: Value) {
    if !root.is_mapping() {
        *root = Value::Mapping(serde_yaml::Mapping::new());
    }
    let Value::Mapping(map) = root else {
        unreachable!()
    };

    if path.len() == 1 {
        map.insert(Value::String(path[0].to_string()), value);
        return;
    }

    let entry = map
        .entry(Value::String(path[0].to_string()))
        .or_insert_with(|| Value::Mapping(serde_yaml::Mapping::new()));
    set_path(entry, &path[1..], value);
}

/// Applies `SECTION_KEY[_SUBKEY]` environment overrides to the value tree,
/// after placeholder resolution. List-valued overrides are comma-separated.
pub fn apply_env_overrides(mut root: Value) -> Result<Value, ConfigError> {
    for mapping in ENV_MAPPINGS {
        let Ok(raw) = std::env::var(mapping.var) else {
            continue;
        };

        let value = match mapping.kind {
            ValueKind::String => Value::String(raw),
            ValueKind::StringList => Value::Sequence(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ),
            ValueKind::Integer => {
                let n: i64 = raw
                    .parse()
                    .map_err(|_| ConfigError::InvalidInteger(mapping.var.to_string()))?;
                Value::Number(n.into())
            }
            ValueKind::Boolean => Value::Bool(parse_bool(&raw)),
        };

        set_path(&mut root, mapping.path, value);
    }

    Ok(root)
}
