use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// How a source was written down in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceRef {
    /// Human-readable handle (stored without the leading `@`), resolved before polling.
    Handle(String),
    /// Provider channel ID, used as-is.
    ChannelId(String),
}

impl SourceRef {
    /// Parse `@handle`, a bare channel ID, or a channel URL.
    ///
    /// Accepted URL shapes are `https://www.youtube.com/@handle`,
    /// `https://www.youtube.com/channel/UC...` and the legacy `/c/name` and
    /// `/user/name` forms, which are looked up like handles.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(NotifierError::Config("empty source reference".to_string()));
        }

        if input.starts_with("http://") || input.starts_with("https://") {
            return Self::from_url(&Url::parse(input)?);
        }

        if let Some(handle) = input.strip_prefix('@') {
            return Self::handle(handle);
        }

        if looks_like_channel_id(input) {
            return Ok(SourceRef::ChannelId(input.to_string()));
        }

        Self::handle(input)
    }

    fn from_url(url: &Url) -> Result<Self> {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            [first, ..] if first.starts_with('@') => Self::handle(&first[1..]),
            ["channel", id, ..] if looks_like_channel_id(id) => Ok(SourceRef::ChannelId(id.to_string())),
            ["c", name, ..] | ["user", name, ..] => Self::handle(name),
            _ => Err(NotifierError::Config(format!(
                "cannot find a channel handle or ID in URL {}",
                url
            ))),
        }
    }

    fn handle(raw: &str) -> Result<Self> {
        let handle = raw.trim().trim_start_matches('@');
        if handle.is_empty() || handle.chars().any(char::is_whitespace) {
            return Err(NotifierError::Config(format!("invalid channel handle '{}'", raw)));
        }
        Ok(SourceRef::Handle(handle.to_string()))
    }

    /// Stable key used for routing overrides, logging and duplicate detection.
    pub fn key(&self) -> String {
        match self {
            SourceRef::Handle(handle) => format!("@{}", handle),
            SourceRef::ChannelId(id) => id.clone(),
        }
    }
}

fn looks_like_channel_id(s: &str) -> bool {
    s.len() == 24
        && s.starts_with("UC")
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Provider-specific channel identifier, the output of handle resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderId(pub String);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque routing key understood by the notification sink (e.g. a chat channel ID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(pub String);

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Destination {
    fn from(s: &str) -> Self {
        Destination(s.to_string())
    }
}

/// A configured content origin with its destination already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub key: String,
    pub label: String,
    pub reference: SourceRef,
    pub destination: Destination,
}

/// The latest upload of a source at poll time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Provider-assigned ID, the dedup key.
    pub id: String,
    pub title: String,
    pub url: String,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Resolve,
    Fetch,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Resolve => f.write_str("resolve"),
            FailureStage::Fetch => f.write_str("fetch"),
        }
    }
}

/// What happened to one source during one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// Latest item was already notified, or the source has no items at all.
    NoNewItem { item_id: Option<String> },
    Notified { item_id: String, destination: Destination },
    /// Delivery did not succeed. `recorded` tells whether the item was still
    /// marked as notified (permanent rejections) or left for the next cycle.
    NotifyFailed {
        item_id: String,
        destination: Destination,
        reason: String,
        recorded: bool,
    },
    FetchFailed { stage: FailureStage, reason: String },
    /// Reading or writing the dedup store failed for this item.
    StoreFailed { item_id: String, reason: String },
    /// Not visited because the cycle ran out of time.
    Skipped,
}

impl SourceOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceOutcome::NoNewItem { .. } => "no-new-item",
            SourceOutcome::Notified { .. } => "new-item-notified",
            SourceOutcome::NotifyFailed { .. } => "new-item-notify-failed",
            SourceOutcome::FetchFailed { .. } => "fetch-failed",
            SourceOutcome::StoreFailed { .. } => "store-failed",
            SourceOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub outcome: SourceOutcome,
}

/// Per-source results of one poll cycle. Logged, never persisted.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    pub fn outcome_for(&self, source_key: &str) -> Option<&SourceOutcome> {
        self.sources
            .iter()
            .find(|r| r.source == source_key)
            .map(|r| &r.outcome)
    }

    pub fn count(&self, kind: &str) -> usize {
        self.sources.iter().filter(|r| r.outcome.kind() == kind).count()
    }

    pub fn summary(&self) -> String {
        const KINDS: [&str; 6] = [
            "new-item-notified",
            "no-new-item",
            "new-item-notify-failed",
            "fetch-failed",
            "store-failed",
            "skipped",
        ];
        let parts: Vec<String> = KINDS
            .iter()
            .map(|kind| (kind, self.count(kind)))
            .filter(|(_, n)| *n > 0)
            .map(|(kind, n)| format!("{}={}", kind, n))
            .collect();

        if parts.is_empty() {
            "no sources configured".to_string()
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {endpoint}: {message}")]
    Status {
        status: u16,
        endpoint: String,
        message: String,
    },

    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid item identifier: {0:?}")]
    InvalidItemId(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("A poll cycle is already running")]
    CycleInProgress,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NotifierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_handle_forms() {
        assert_eq!(SourceRef::parse("@odlclips").unwrap(), SourceRef::Handle("odlclips".into()));
        assert_eq!(SourceRef::parse("  odlclips ").unwrap(), SourceRef::Handle("odlclips".into()));
        assert_eq!(
            SourceRef::parse("https://www.youtube.com/@odlclips").unwrap(),
            SourceRef::Handle("odlclips".into())
        );
        assert_eq!(
            SourceRef::parse("https://www.youtube.com/@odlclips/videos").unwrap(),
            SourceRef::Handle("odlclips".into())
        );
        assert_eq!(
            SourceRef::parse("https://www.youtube.com/c/OldName").unwrap(),
            SourceRef::Handle("OldName".into())
        );
    }

    #[test]
    fn parses_channel_ids() {
        let id = "UC_x5XG1OV2P6uZZ5FSM9Ttw";
        assert_eq!(SourceRef::parse(id).unwrap(), SourceRef::ChannelId(id.into()));
        assert_eq!(
            SourceRef::parse(&format!("https://www.youtube.com/channel/{}", id)).unwrap(),
            SourceRef::ChannelId(id.into())
        );
    }

    #[test]
    fn rejects_unusable_references() {
        assert!(SourceRef::parse("").is_err());
        assert!(SourceRef::parse("@").is_err());
        assert!(SourceRef::parse("two words").is_err());
        assert!(SourceRef::parse("https://www.youtube.com/watch?v=abc").is_err());
    }

    #[test]
    fn keys_keep_the_at_sign_for_handles() {
        assert_eq!(SourceRef::Handle("a".into()).key(), "@a");
        assert_eq!(SourceRef::ChannelId("UC1".into()).key(), "UC1");
    }

    #[test]
    fn summary_counts_each_outcome_kind() {
        let report = CycleReport {
            cycle_id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration: Duration::from_millis(5),
            sources: vec![
                SourceReport {
                    source: "@a".into(),
                    outcome: SourceOutcome::NoNewItem { item_id: Some("v1".into()) },
                },
                SourceReport {
                    source: "@b".into(),
                    outcome: SourceOutcome::FetchFailed {
                        stage: FailureStage::Fetch,
                        reason: "boom".into(),
                    },
                },
                SourceReport {
                    source: "@c".into(),
                    outcome: SourceOutcome::NoNewItem { item_id: None },
                },
            ],
        };

        assert_eq!(report.summary(), "no-new-item=2 fetch-failed=1");
        assert_eq!(report.count("fetch-failed"), 1);
        assert!(matches!(report.outcome_for("@b"), Some(SourceOutcome::FetchFailed { .. })));
        assert!(report.outcome_for("@z").is_none());
    }
}
