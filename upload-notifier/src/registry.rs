use crate::traits::ContentProvider;
use crate::types::{Destination, NotifierError, ProviderId, Result, Source, SourceRef};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Source as declared in configuration, before routing is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub reference: SourceRef,
    pub label: Option<String>,
    pub destination: Option<Destination>,
}

impl SourceSpec {
    pub fn new(reference: SourceRef) -> Self {
        Self {
            reference,
            label: None,
            destination: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(Destination(destination.into()));
        self
    }
}

/// Source key → destination mapping with a fallback for everything else.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    default: Option<Destination>,
    overrides: HashMap<String, Destination>,
}

impl RoutingTable {
    pub fn new(default: Option<Destination>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Route one source elsewhere. `source` may be any form accepted by
    /// [`SourceRef::parse`]; it is matched on the normalized key.
    pub fn with_override(mut self, source: &str, destination: impl Into<String>) -> Result<Self> {
        let key = SourceRef::parse(source)?.key();
        self.overrides.insert(key, Destination(destination.into()));
        Ok(self)
    }

    pub fn destination_for(&self, source_key: &str) -> Option<&Destination> {
        self.overrides.get(source_key).or(self.default.as_ref())
    }

    /// Override keys that name none of `sources`, sorted.
    pub fn unmatched_overrides(&self, sources: &[Source]) -> Vec<&str> {
        let mut unmatched: Vec<&str> = self
            .overrides
            .keys()
            .filter(|key| !sources.iter().any(|s| &s.key == *key))
            .map(String::as_str)
            .collect();
        unmatched.sort_unstable();
        unmatched
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ProviderId),
    NotFound,
}

/// Ordered set of sources to poll, each with its destination fixed at load.
pub struct SourceRegistry {
    specs: Vec<SourceSpec>,
    list_file: Option<PathBuf>,
    routing: RoutingTable,
    sources: RwLock<Vec<Source>>,
    resolved: RwLock<HashMap<String, ProviderId>>,
}

impl SourceRegistry {
    pub fn new(specs: Vec<SourceSpec>, routing: RoutingTable) -> Result<Self> {
        let sources = build_sources(&specs, &routing)?;
        info!("Registry loaded with {} sources", sources.len());
        warn_unmatched_overrides(&routing, &sources);
        Ok(Self {
            specs,
            list_file: None,
            routing,
            sources: RwLock::new(sources),
            resolved: RwLock::new(HashMap::new()),
        })
    }

    /// Registry whose sources also come from a one-reference-per-line file,
    /// re-read on every [`refresh`](Self::refresh).
    pub async fn with_list_file(specs: Vec<SourceSpec>, routing: RoutingTable, list_file: PathBuf) -> Result<Self> {
        let registry = Self {
            specs,
            list_file: Some(list_file),
            routing,
            sources: RwLock::new(Vec::new()),
            resolved: RwLock::new(HashMap::new()),
        };
        registry.refresh().await?;
        warn_unmatched_overrides(&registry.routing, &registry.sources.read().await);
        Ok(registry)
    }

    /// Re-read the list file, if any. On failure the previous list is kept.
    pub async fn refresh(&self) -> Result<()> {
        let Some(path) = &self.list_file else {
            return Ok(());
        };

        let contents = tokio::fs::read_to_string(path).await?;
        let mut specs = self.specs.clone();
        specs.extend(parse_source_list(&contents));
        let sources = build_sources(&specs, &self.routing)?;

        let mut current = self.sources.write().await;
        if current.len() != sources.len() {
            info!("Registry now has {} sources (was {})", sources.len(), current.len());
        }
        *current = sources;
        Ok(())
    }

    /// Sources in configuration order.
    pub async fn list(&self) -> Vec<Source> {
        self.sources.read().await.clone()
    }

    /// Provider ID for `source`, looking up handles upstream on first use.
    /// Successful lookups are cached for the life of the registry.
    pub async fn resolve(&self, source: &Source, provider: &dyn ContentProvider) -> Result<Resolution> {
        let handle = match &source.reference {
            SourceRef::ChannelId(id) => return Ok(Resolution::Resolved(ProviderId(id.clone()))),
            SourceRef::Handle(handle) => handle,
        };

        if let Some(id) = self.resolved.read().await.get(handle) {
            return Ok(Resolution::Resolved(id.clone()));
        }

        match provider.resolve_handle(handle).await? {
            Some(id) => {
                debug!("Resolved {} to {}", source.key, id);
                self.resolved.write().await.insert(handle.clone(), id.clone());
                Ok(Resolution::Resolved(id))
            }
            None => Ok(Resolution::NotFound),
        }
    }
}

/// Parse a channel list: one handle, ID or channel URL per line. Blank lines
/// and `#` comments are skipped, as are lines that name no channel.
pub fn parse_source_list(contents: &str) -> Vec<SourceSpec> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match SourceRef::parse(line) {
            Ok(reference) => Some(SourceSpec::new(reference)),
            Err(e) => {
                warn!("Skipping channel list entry '{}': {}", line, e);
                None
            }
        })
        .collect()
}

fn build_sources(specs: &[SourceSpec], routing: &RoutingTable) -> Result<Vec<Source>> {
    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(specs.len());

    for spec in specs {
        let key = spec.reference.key();
        if !seen.insert(key.clone()) {
            warn!("Source {} is configured more than once; keeping the first entry", key);
            continue;
        }

        let destination = spec
            .destination
            .clone()
            .or_else(|| routing.destination_for(&key).cloned())
            .ok_or_else(|| {
                NotifierError::Config(format!("source {} has no destination and no default route is set", key))
            })?;

        sources.push(Source {
            label: spec.label.clone().unwrap_or_else(|| display_label(&spec.reference)),
            key,
            reference: spec.reference.clone(),
            destination,
        });
    }

    Ok(sources)
}

/// Overrides are matched on the normalized key, so a source listed by channel
/// ID is not reached by an override written as its handle.
fn warn_unmatched_overrides(routing: &RoutingTable, sources: &[Source]) {
    for key in routing.unmatched_overrides(sources) {
        warn!("Routing override for {} matches no configured source", key);
    }
}

fn display_label(reference: &SourceRef) -> String {
    match reference {
        SourceRef::Handle(handle) => handle.clone(),
        SourceRef::ChannelId(id) => id.clone(),
    }
}
