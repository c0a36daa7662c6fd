use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in config file: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("environment variable ${{{0}}} not found")]
    EnvVarNotFound(String),

    #[error("file specified in {var}_FILE not found: {path}")]
    EnvFileNotFound { var: String, path: String },

    #[error("error reading file from {var}_FILE: {source}")]
    EnvFileUnreadable {
        var: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} must be an integer")]
    InvalidInteger(String),

    #[error("configuration validation failed:\n{0}")]
    Validation(String),
}

/// Errors raised by the upstream catalog client.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("show {0} not found upstream")]
    NotFound(i64),

    #[error("upstream rate limit exceeded")]
    RateLimitExceeded,

    #[error("upstream returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to parse upstream response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised by the downstream library manager client.
#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    #[error("downstream returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("downstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to parse downstream response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("downstream validation failed: {0}")]
    Validation(String),

    #[error("quality profile \"{0}\" not found on downstream")]
    QualityProfileNotFound(String),

    #[error("language profile \"{0}\" not found on downstream")]
    LanguageProfileNotFound(String),

    #[error("tag \"{0}\" not found on downstream")]
    TagNotFound(String),

    #[error("root folder \"{0}\" not configured on downstream")]
    RootFolderNotFound(String),
}

/// Errors raised by the persistent show cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("show {0} has no cached row")]
    ShowNotFound(i64),
}

/// Errors raised while loading or saving operational state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("state file failed validation: {0}")]
    Invalid(String),
}

/// Uniform error envelope for the HTTP surface, mirroring a status/message
/// pair the same way every JSON error body on this surface is shaped.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<DownstreamError> for ApiError {
    fn from(err: DownstreamError) -> Self {
        Self::internal(err.to_string())
    }
}
