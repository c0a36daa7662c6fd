mod loader;
mod model;
mod sources;

pub use loader::{cache_path, load_config, state_path, ConfigLoaderOptions, DEFAULT_CONFIG_PATH};
pub use model::{
    Config, ConfigSelector, DownstreamConfig, ExcludeSet, FiltersConfig, LoggingConfig,
    SelectionConfig, ServerConfig, StorageConfig, SyncConfig, UpstreamConfig,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_yaml() -> &'static str {
        r#"
downstream:
  url: "http://localhost:8989"
  api_key: "abc123"
  root_folder: "/tv"
  quality_profile: "HD-1080p"
"#
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(minimal_yaml().as_bytes()).unwrap();

        let options = ConfigLoaderOptions {
            path: file.path().to_path_buf(),
        };
        let config = load_config(&options).unwrap();

        assert_eq!(config.upstream.rate_limit, 20);
        assert_eq!(config.sync.poll_interval, "6h");
        assert!(config.dry_run);
        assert_eq!(config.downstream.url, "http://localhost:8989");
    }

    #[test]
    fn missing_file_falls_back_to_env_only() {
        std::env::set_var("DOWNSTREAM_URL", "http://sonarr.local");
        std::env::set_var("DOWNSTREAM_API_KEY", "key");
        std::env::set_var("DOWNSTREAM_ROOT_FOLDER", "/tv");
        std::env::set_var("DOWNSTREAM_QUALITY_PROFILE", "HD-1080p");

        let options = ConfigLoaderOptions {
            path: std::path::PathBuf::from("/nonexistent/config.yaml"),
        };
        let config = load_config(&options).unwrap();
        assert_eq!(config.downstream.url, "http://sonarr.local");

        for var in [
            "DOWNSTREAM_URL",
            "DOWNSTREAM_API_KEY",
            "DOWNSTREAM_ROOT_FOLDER",
            "DOWNSTREAM_QUALITY_PROFILE",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn rejects_invalid_logging_level() {
        let yaml = format!("{}\nlogging:\n  level: NOPE\n", minimal_yaml());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let options = ConfigLoaderOptions {
            path: file.path().to_path_buf(),
        };
        assert!(load_config(&options).is_err());
    }
}
