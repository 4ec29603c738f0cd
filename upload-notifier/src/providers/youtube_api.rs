use crate::fetcher::{redacted, snippet, FetchResponse, HttpFetcher};
use crate::providers::{unescape_html, watch_url};
use crate::traits::ContentProvider;
use crate::types::{Item, NotifierError, ProviderId, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// YouTube Data API v3 client built on `search.list`.
pub struct YouTubeApiProvider {
    fetcher: Arc<HttpFetcher>,
    base_url: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    channel_id: Option<String>,
    #[serde(default)]
    title: String,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

impl YouTubeApiProvider {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(NotifierError::Config("YouTube API key is empty".to_string()));
        }
        Ok(Self {
            fetcher,
            base_url: Url::parse(base_url)?,
            api_key,
        })
    }

    fn search_url(&self, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.join("youtube/v3/search")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("part", "snippet");
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("key", &self.api_key);
        }
        Ok(url)
    }

    async fn search(&self, url: &Url) -> Result<SearchResponse> {
        let response = self.fetcher.get(url).await?;
        if !response.status.is_success() {
            return Err(api_error(response, &redacted(url)));
        }
        serde_json::from_str(&response.body)
            .map_err(|e| NotifierError::Parse(format!("search response: {}", e)))
    }
}

/// Map an API error payload onto our taxonomy. Quota and rate errors arrive
/// as 403 with a reason code, or as a plain 429.
fn api_error(response: FetchResponse, endpoint: &str) -> NotifierError {
    let status = response.status.as_u16();
    let parsed: Option<ApiErrorBody> = serde_json::from_str(&response.body).ok();
    let message = parsed
        .as_ref()
        .map(|b| b.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| snippet(&response.body));
    let rate_limited = status == 429
        || parsed.as_ref().is_some_and(|b| {
            b.error
                .errors
                .iter()
                .any(|d| matches!(d.reason.as_str(), "quotaExceeded" | "rateLimitExceeded" | "dailyLimitExceeded"))
        });

    if rate_limited {
        NotifierError::RateLimited(message)
    } else {
        NotifierError::Status {
            status,
            endpoint: endpoint.to_string(),
            message,
        }
    }
}

#[async_trait]
impl ContentProvider for YouTubeApiProvider {
    fn name(&self) -> &str {
        "youtube-api"
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<ProviderId>> {
        let handle = handle.trim_start_matches('@');
        let url = self.search_url(&[("q", handle), ("type", "channel"), ("maxResults", "1")])?;
        let response = self.search(&url).await?;

        let channel_id = response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.snippet.channel_id)
            .filter(|id| !id.is_empty());
        debug!("Handle @{} resolved to {:?}", handle, channel_id);

        Ok(channel_id.map(ProviderId))
    }

    async fn latest_item(&self, channel: &ProviderId) -> Result<Option<Item>> {
        let url = self.search_url(&[
            ("channelId", channel.0.as_str()),
            ("order", "date"),
            ("type", "video"),
            ("maxResults", "1"),
        ])?;
        let response = self.search(&url).await?;

        let Some(first) = response.items.into_iter().next() else {
            return Ok(None);
        };
        let Some(video_id) = first.id.video_id.filter(|id| !id.is_empty()) else {
            debug!("Latest search result for {} has no video ID", channel);
            return Ok(None);
        };

        Ok(Some(Item {
            url: watch_url(&video_id),
            title: unescape_html(&first.snippet.title),
            published: first.snippet.published_at,
            id: video_id,
        }))
    }
}
