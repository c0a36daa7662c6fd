use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::rate_limiter::RateLimiter;

use super::model::UpstreamShow;

const BASE_URL: &str = "https://api.tvmaze.com";
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER: u64 = 10;
/// 429s don't count against `MAX_RETRIES` (they're the server asking us to
/// slow down, not failing), but an upstream stuck permanently rate-limiting
/// us must still surface `RateLimitExceeded` rather than loop forever.
const MAX_CONSECUTIVE_RATE_LIMITS: u32 = 10;

/// The black-box contract the orchestrator depends on, so tests can supply
/// an in-process fake instead of a live `reqwest` client.
#[async_trait]
pub trait UpstreamCatalog: Send + Sync {
    async fn get_page(&self, page: u64) -> Result<Vec<UpstreamShow>, UpstreamError>;
    async fn get_show(&self, id: i64) -> Result<UpstreamShow, UpstreamError>;
    async fn get_updates(&self, window: &str) -> Result<HashMap<i64, i64>, UpstreamError>;
}

pub struct TvMazeClient {
    http: reqwest::Client,
    api_key: Option<String>,
    rate_limiter: Arc<RateLimiter>,
}

impl TvMazeClient {
    pub fn new(api_key: Option<String>, rate_limit: u32) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with default TLS backend");

        Self {
            http,
            api_key,
            rate_limiter: Arc::new(RateLimiter::new(rate_limit, Duration::from_secs(10))),
        }
    }

    fn apply_api_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("apikey", key)]),
            None => request,
        }
    }

    /// Performs one logical operation with the retry policy:
    /// 429 sleeps `Retry-After` and retries without counting against the
    /// attempt budget; 5xx/timeout retries up to `MAX_RETRIES` with
    /// `2^attempt` second backoff; any other non-2xx status is returned to
    /// the caller as-is for status-specific handling (404 vs. other 4xx).
    async fn request(&self, path: &str) -> Result<reqwest::Response, UpstreamError> {
        let url = format!("{BASE_URL}{path}");
        let mut attempt = 0u32;
        let mut consecutive_rate_limits = 0u32;

        loop {
            self.rate_limiter.acquire().await;

            let response = self.apply_api_key(self.http.get(&url)).send().await;

            let response = match response {
                Ok(r) => r,
                Err(e) if e.is_timeout() && attempt < MAX_RETRIES => {
                    warn!(path, attempt, "upstream request timed out, retrying");
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(UpstreamError::Transport(e)),
            };

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                consecutive_rate_limits += 1;
                if consecutive_rate_limits > MAX_CONSECUTIVE_RATE_LIMITS {
                    return Err(UpstreamError::RateLimitExceeded);
                }
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                warn!(path, retry_after, "rate limited by upstream catalog");
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                continue;
            }

            if response.status().is_server_error() {
                if attempt < MAX_RETRIES {
                    let backoff = 2u64.pow(attempt);
                    warn!(path, status = %response.status(), backoff, "upstream server error, retrying");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                    continue;
                }
                return Err(UpstreamError::Api {
                    status: response.status().as_u16(),
                    body: response.text().await.unwrap_or_default(),
                });
            }

            return Ok(response);
        }
    }
}

#[async_trait]
impl UpstreamCatalog for TvMazeClient {
    async fn get_page(&self, page: u64) -> Result<Vec<UpstreamShow>, UpstreamError> {
        let response = self.request(&format!("/shows?page={page}")).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(UpstreamError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let shows = response.json::<Vec<UpstreamShow>>().await?;
        Ok(shows)
    }

    async fn get_show(&self, id: i64) -> Result<UpstreamShow, UpstreamError> {
        let response = self.request(&format!("/shows/{id}")).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound(id));
        }
        if !response.status().is_success() {
            return Err(UpstreamError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let show = response.json::<UpstreamShow>().await?;
        Ok(show)
    }

    async fn get_updates(&self, window: &str) -> Result<HashMap<i64, i64>, UpstreamError> {
        let response = self.request(&format!("/updates/shows?since={window}")).await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let raw: HashMap<String, i64> = response.json().await?;
        let mut updates = HashMap::with_capacity(raw.len());
        for (k, v) in raw {
            match k.parse::<i64>() {
                Ok(id) => {
                    updates.insert(id, v);
                }
                Err(_) => debug!(key = %k, "ignoring non-numeric upstream ID in updates feed"),
            }
        }
        Ok(updates)
    }
}

impl UpstreamError {
    pub fn is_rate_limit_exceeded(&self) -> bool {
        matches!(self, UpstreamError::RateLimitExceeded)
    }
}
