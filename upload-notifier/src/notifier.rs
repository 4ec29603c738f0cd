use crate::config::{AppConfig, ProviderKind};
use crate::dedup;
use crate::engine::PollEngine;
use crate::fetcher::HttpFetcher;
use crate::providers::{youtube_api, youtube_feed, YouTubeApiProvider, YouTubeFeedProvider};
use crate::registry::{Resolution, SourceRegistry};
use crate::scheduler::Scheduler;
use crate::sinks::{discord, DiscordSink, LogSink};
use crate::traits::{ContentProvider, DedupStore, NotificationSink};
use crate::types::{CycleReport, NotifierError, Result, Source, SourceRef};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Credentials that come from the environment rather than the config file.
#[derive(Clone, Default)]
pub struct Secrets {
    pub youtube_api_key: Option<String>,
    pub discord_token: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("youtube_api_key", &self.youtube_api_key.as_ref().map(|_| "***"))
            .field("discord_token", &self.discord_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Fully wired notifier: registry, provider, sink, dedup store and engine.
pub struct UploadNotifier {
    engine: Arc<PollEngine>,
    poll_interval: Duration,
}

impl UploadNotifier {
    /// Build everything from configuration. Opening the dedup store or
    /// constructing a client is the only place startup can fail.
    pub async fn from_config(config: &AppConfig, secrets: &Secrets, dry_run: bool) -> Result<Self> {
        let provider = build_provider(config, secrets)?;
        let sink: Arc<dyn NotificationSink> = if dry_run {
            Arc::new(LogSink)
        } else {
            let token = secrets
                .discord_token
                .as_deref()
                .ok_or_else(|| NotifierError::Config("DISCORD_TOKEN is not set".to_string()))?;
            Arc::new(DiscordSink::new(
                config.discord.base_url.as_deref().unwrap_or(discord::DEFAULT_BASE_URL),
                token,
                Duration::from_secs(config.call_timeout_seconds),
            )?)
        };
        let store: Arc<dyn DedupStore> = if dry_run {
            dedup::open_store("memory").await?
        } else {
            dedup::open_store(&config.dedup).await?
        };

        let registry = Arc::new(build_registry(config).await?);
        Ok(Self::from_parts(registry, provider, sink, store, config))
    }

    pub fn from_parts(
        registry: Arc<SourceRegistry>,
        provider: Arc<dyn ContentProvider>,
        sink: Arc<dyn NotificationSink>,
        store: Arc<dyn DedupStore>,
        config: &AppConfig,
    ) -> Self {
        let engine = Arc::new(PollEngine::new(registry, provider, sink, store, config.engine_config()));
        Self {
            engine,
            poll_interval: config.poll_interval(),
        }
    }

    pub fn engine(&self) -> &Arc<PollEngine> {
        &self.engine
    }

    /// One cycle, for `once` runs and manual checks.
    pub async fn check_now(&self) -> Result<CycleReport> {
        self.engine.run_cycle().await
    }

    /// Start the scheduler after the sink's startup handshake.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<()>> {
        let sink = Arc::clone(self.engine.sink());
        let ready = async move { sink.ready().await };
        Scheduler::new(Arc::clone(&self.engine), self.poll_interval).spawn(ready, shutdown)
    }

    /// Resolve a single handle the same way a cycle would.
    pub async fn resolve(&self, reference: &str) -> Result<Resolution> {
        let reference = SourceRef::parse(reference)?;
        let source = Source {
            key: reference.key(),
            label: reference.key(),
            reference,
            destination: "unused".into(),
        };
        self.engine
            .registry()
            .resolve(&source, self.engine.provider().as_ref())
            .await
    }
}

fn build_provider(config: &AppConfig, secrets: &Secrets) -> Result<Arc<dyn ContentProvider>> {
    let fetcher = Arc::new(HttpFetcher::new(config.fetch_config())?);
    let base_url = config.provider.base_url.as_deref();

    let provider: Arc<dyn ContentProvider> = match config.provider.kind {
        ProviderKind::Api => {
            let key = secrets
                .youtube_api_key
                .as_deref()
                .ok_or_else(|| NotifierError::Config("YOUTUBE_API_KEY is not set".to_string()))?;
            Arc::new(YouTubeApiProvider::new(
                fetcher,
                base_url.unwrap_or(youtube_api::DEFAULT_BASE_URL),
                key,
            )?)
        }
        ProviderKind::Feed => Arc::new(YouTubeFeedProvider::new(
            fetcher,
            base_url.unwrap_or(youtube_feed::DEFAULT_BASE_URL),
        )?),
    };
    info!("Using {} content provider", provider.name());
    Ok(provider)
}

async fn build_registry(config: &AppConfig) -> Result<SourceRegistry> {
    let specs = config.source_specs()?;
    let routing = config.routing_table()?;
    match &config.sources_file {
        Some(path) => SourceRegistry::with_list_file(specs, routing, path.clone()).await,
        None => SourceRegistry::new(specs, routing),
    }
}
