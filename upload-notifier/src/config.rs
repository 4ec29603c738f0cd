use crate::engine::EngineConfig;
use crate::fetcher::FetchConfig;
use crate::registry::{RoutingTable, SourceSpec};
use crate::types::{Destination, NotifierError, Result, SourceRef};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_poll_interval_minutes")]
    pub poll_interval_minutes: u64,
    #[serde(default = "default_call_timeout_seconds")]
    pub call_timeout_seconds: u64,
    pub cycle_timeout_seconds: Option<u64>,
    /// File path, `sqlite:<path>` or `memory`.
    #[serde(default = "default_dedup")]
    pub dedup: String,
    /// Optional channel list, one reference per line, re-read every cycle.
    pub sources_file: Option<PathBuf>,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// YouTube Data API v3 (needs an API key).
    #[default]
    Api,
    /// Public channel Atom feeds.
    Feed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: None,
            user_agent: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            min_request_interval_ms: default_min_request_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    pub default: Option<String>,
    #[serde(default)]
    pub overrides: Vec<RouteOverride>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteOverride {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceEntry {
    pub source: String,
    pub label: Option<String>,
    pub destination: Option<String>,
}

/// One week.
const MAX_POLL_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
const MAX_CALL_TIMEOUT_SECONDS: u64 = 60 * 60;
const MAX_CYCLE_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;

fn check_range(field: &str, value: u64, max: u64) -> Result<()> {
    if value == 0 || value > max {
        return Err(NotifierError::Config(format!(
            "{} must be between 1 and {} (got {})",
            field, max, value
        )));
    }
    Ok(())
}

fn default_poll_interval_minutes() -> u64 {
    30
}

fn default_call_timeout_seconds() -> u64 {
    30
}

fn default_dedup() -> String {
    "posted_videos.txt".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_min_request_interval_ms() -> u64 {
    250
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| NotifierError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_range("poll_interval_minutes", self.poll_interval_minutes, MAX_POLL_INTERVAL_MINUTES)?;
        check_range("call_timeout_seconds", self.call_timeout_seconds, MAX_CALL_TIMEOUT_SECONDS)?;
        if let Some(seconds) = self.cycle_timeout_seconds {
            check_range("cycle_timeout_seconds", seconds, MAX_CYCLE_TIMEOUT_SECONDS)?;
        }
        if self.sources.is_empty() && self.sources_file.is_none() {
            return Err(NotifierError::Config(
                "no sources configured: add [[sources]] entries or set sources_file".to_string(),
            ));
        }
        for base in [&self.provider.base_url, &self.discord.base_url].into_iter().flatten() {
            Url::parse(base).map_err(|e| NotifierError::Config(format!("invalid base_url '{}': {}", base, e)))?;
        }
        for entry in &self.sources {
            SourceRef::parse(&entry.source)
                .map_err(|e| NotifierError::Config(format!("sources entry '{}': {}", entry.source, e)))?;
        }
        self.routing_table()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            call_timeout: Duration::from_secs(self.call_timeout_seconds),
            cycle_timeout: self.cycle_timeout_seconds.map(Duration::from_secs),
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let defaults = FetchConfig::default();
        FetchConfig {
            user_agent: self.provider.user_agent.clone().unwrap_or(defaults.user_agent),
            timeout_seconds: self.call_timeout_seconds,
            max_retries: self.provider.max_retries,
            retry_delay_ms: self.provider.retry_delay_ms,
            min_request_interval_ms: self.provider.min_request_interval_ms,
        }
    }

    pub fn routing_table(&self) -> Result<RoutingTable> {
        let default = self.routing.default.as_deref().map(Destination::from);
        self.routing
            .overrides
            .iter()
            .try_fold(RoutingTable::new(default), |table, rule| {
                table.with_override(&rule.source, rule.destination.as_str())
            })
    }

    pub fn source_specs(&self) -> Result<Vec<SourceSpec>> {
        self.sources
            .iter()
            .map(|entry| {
                let mut spec = SourceSpec::new(SourceRef::parse(&entry.source)?);
                spec.label = entry.label.clone();
                spec.destination = entry.destination.as_deref().map(Destination::from);
                Ok(spec)
            })
            .collect()
    }
}
