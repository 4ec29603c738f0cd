use crate::fetcher::{redacted, HttpFetcher};
use crate::providers::watch_url;
use crate::traits::ContentProvider;
use crate::types::{Item, NotifierError, ProviderId, Result};
use async_trait::async_trait;
use feed_rs::model::Entry;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

/// Keyless provider reading the public per-channel Atom feed.
pub struct YouTubeFeedProvider {
    fetcher: Arc<HttpFetcher>,
    base_url: Url,
}

impl YouTubeFeedProvider {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: &str) -> Result<Self> {
        Ok(Self {
            fetcher,
            base_url: Url::parse(base_url)?,
        })
    }

    fn feed_url(&self, channel: &ProviderId) -> Result<Url> {
        let mut url = self.base_url.join("feeds/videos.xml")?;
        url.query_pairs_mut().append_pair("channel_id", &channel.0);
        Ok(url)
    }
}

/// Newest entry of a parsed channel feed, by publish date.
pub fn latest_entry(content: &[u8]) -> Result<Option<Item>> {
    let feed = feed_rs::parser::parse(content)
        .map_err(|e| NotifierError::Parse(format!("channel feed: {}", e)))?;

    let newest = feed
        .entries
        .into_iter()
        .max_by_key(|entry| entry.published.or(entry.updated));

    Ok(newest.and_then(entry_to_item))
}

fn entry_to_item(entry: Entry) -> Option<Item> {
    let id = entry
        .id
        .strip_prefix("yt:video:")
        .unwrap_or(&entry.id)
        .trim()
        .to_string();
    if id.is_empty() {
        return None;
    }

    Some(Item {
        url: watch_url(&id),
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        published: entry.published.or(entry.updated),
        id,
    })
}

/// Pull the `UC…` channel ID out of a channel page.
pub fn extract_channel_id(page: &str) -> Option<String> {
    const MARKERS: [&str; 2] = [
        "\"externalId\":\"",
        "<link rel=\"canonical\" href=\"https://www.youtube.com/channel/",
    ];

    MARKERS.iter().find_map(|marker| {
        let start = page.find(marker)? + marker.len();
        let rest = &page[start..];
        let end = rest.find('"')?;
        let id = &rest[..end];
        (id.starts_with("UC") && id.len() == 24).then(|| id.to_string())
    })
}

#[async_trait]
impl ContentProvider for YouTubeFeedProvider {
    fn name(&self) -> &str {
        "youtube-feed"
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<ProviderId>> {
        let handle = handle.trim_start_matches('@');
        let url = self.base_url.join(&format!("@{}", handle))?;
        let response = self.fetcher.get(&url).await?;

        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let page = response.into_success(&redacted(&url))?;
        let channel_id = extract_channel_id(&page);
        debug!("Handle @{} resolved to {:?}", handle, channel_id);

        Ok(channel_id.map(ProviderId))
    }

    async fn latest_item(&self, channel: &ProviderId) -> Result<Option<Item>> {
        let url = self.feed_url(channel)?;
        let body = self.fetcher.get_text(&url).await?;
        latest_entry(body.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns="http://www.w3.org/2005/Atom">
  <id>yt:channel:UCabcdefghijklmnopqrstuv</id>
  <title>ODL Clips</title>
  <entry>
    <id>yt:video:older111</id>
    <yt:videoId>older111</yt:videoId>
    <title>Week 1 highlights</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v=older111"/>
    <published>2024-04-01T12:00:00+00:00</published>
    <updated>2024-04-01T12:00:00+00:00</updated>
  </entry>
  <entry>
    <id>yt:video:newer222</id>
    <yt:videoId>newer222</yt:videoId>
    <title>Week 2 highlights</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v=newer222"/>
    <published>2024-04-08T12:00:00+00:00</published>
    <updated>2024-04-08T12:00:00+00:00</updated>
  </entry>
</feed>"#;

    #[test]
    fn picks_newest_entry_regardless_of_order() {
        let item = latest_entry(FEED.as_bytes()).unwrap().unwrap();
        assert_eq!(item.id, "newer222");
        assert_eq!(item.title, "Week 2 highlights");
        assert_eq!(item.url, "https://www.youtube.com/watch?v=newer222");
        assert!(item.published.is_some());
    }

    #[test]
    fn empty_feed_has_no_item() {
        let empty = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><id>yt:channel:x</id><title>Empty</title></feed>"#;
        assert!(latest_entry(empty.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(latest_entry(b"not a feed"), Err(NotifierError::Parse(_))));
    }

    #[test]
    fn extracts_channel_id_from_page() {
        let page = r#"<html><script>var x = {"externalId":"UCabcdefghijklmnopqrstuv","other":1}</script></html>"#;
        assert_eq!(extract_channel_id(page).as_deref(), Some("UCabcdefghijklmnopqrstuv"));

        let canonical = r#"<link rel="canonical" href="https://www.youtube.com/channel/UCzyxwvutsrqponmlkjihgfe">"#;
        assert_eq!(extract_channel_id(canonical).as_deref(), Some("UCzyxwvutsrqponmlkjihgfe"));

        assert!(extract_channel_id("<html>nothing here</html>").is_none());
    }
}
