use crate::types::{NotifierError, Result};
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Minimum spacing between two requests to the same host.
    pub min_request_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("upload-notifier/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_ms: 1_000,
            min_request_interval_ms: 250,
        }
    }
}

/// Body and status of a finished request. Non-success statuses are returned
/// rather than turned into errors so providers can read upstream error payloads.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub body: String,
}

impl FetchResponse {
    /// Turn a non-success response into a `Status` error.
    pub fn into_success(self, endpoint: &str) -> Result<String> {
        if self.status.is_success() {
            Ok(self.body)
        } else {
            Err(NotifierError::Status {
                status: self.status.as_u16(),
                endpoint: endpoint.to_string(),
                message: snippet(&self.body),
            })
        }
    }
}

/// Shared GET client for upstream providers: timeouts, retries with
/// exponential backoff, and per-host request spacing.
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            config,
            last_request: Mutex::new(HashMap::new()),
        })
    }

    /// GET `url`, retrying network errors, 5xx and 429 responses.
    ///
    /// Only the host and path are logged; query strings may carry API keys.
    pub async fn get(&self, url: &Url) -> Result<FetchResponse> {
        let endpoint = redacted(url);
        let mut backoff = ExponentialBackoff {
            current_interval: Duration::from_millis(self.config.retry_delay_ms),
            initial_interval: Duration::from_millis(self.config.retry_delay_ms),
            max_interval: Duration::from_millis(self.config.retry_delay_ms.saturating_mul(32)),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            self.apply_rate_limit(url).await;
            debug!("GET {} (attempt {})", endpoint, attempt + 1);

            let failure = match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable(status) || attempt >= self.config.max_retries {
                        let body = response.text().await?;
                        return Ok(FetchResponse { status, body });
                    }
                    NotifierError::Status {
                        status: status.as_u16(),
                        endpoint: endpoint.clone(),
                        message: status.canonical_reason().unwrap_or("Unknown").to_string(),
                    }
                }
                Err(e) if attempt >= self.config.max_retries => return Err(e.into()),
                Err(e) => NotifierError::Http(e),
            };

            attempt += 1;
            match backoff.next_backoff() {
                Some(delay) => {
                    warn!("Attempt {} for {} failed ({}), retrying in {:?}", attempt, endpoint, failure, delay);
                    tokio::time::sleep(delay).await;
                }
                None => return Err(failure),
            }
        }
    }

    /// GET `url` and return the body, failing on non-success statuses.
    pub async fn get_text(&self, url: &Url) -> Result<String> {
        self.get(url).await?.into_success(&redacted(url))
    }

    async fn apply_rate_limit(&self, url: &Url) {
        let host = url.host_str().unwrap_or("").to_string();
        let min_interval = Duration::from_millis(self.config.min_request_interval_ms);

        let wait = {
            let mut last_request = self.last_request.lock().await;
            let now = Instant::now();
            let next_allowed = last_request
                .get(&host)
                .map(|last| *last + min_interval)
                .unwrap_or(now);
            let slot = next_allowed.max(now);
            last_request.insert(host.clone(), slot);
            slot - now
        };

        if !wait.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// `scheme://host/path` without the query string.
pub fn redacted(url: &Url) -> String {
    format!("{}://{}{}", url.scheme(), url.host_str().unwrap_or(""), url.path())
}

/// First part of an error body, enough for a log line.
pub fn snippet(body: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= LIMIT {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(LIMIT).collect();
        cut.push('…');
        cut
    }
}
