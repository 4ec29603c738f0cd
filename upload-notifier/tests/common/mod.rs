#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use upload_notifier::{
    ContentProvider, DedupStore, DeliveryOutcome, Destination, EngineConfig, Item, NotificationSink, NotifierError,
    PollEngine, ProviderId, Result, RoutingTable, SourceRef, SourceRegistry, SourceSpec,
};
use upload_notifier::dedup::MemoryDedupStore;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const CHANNEL_X: &str = "111111111111111111";
pub const CHANNEL_Y: &str = "222222222222222222";

/// What the fake provider returns for one channel ID.
#[derive(Clone)]
pub enum Latest {
    Item(Item),
    Empty,
    Fail(String),
    Hang,
    Panic,
}

pub fn item(id: &str, title: &str) -> Item {
    Item {
        id: id.to_string(),
        title: title.to_string(),
        url: format!("https://www.youtube.com/watch?v={}", id),
        published: None,
    }
}

/// In-memory provider: handles map to channel IDs, channel IDs map to a
/// scripted latest item.
#[derive(Default)]
pub struct FakeProvider {
    handles: Mutex<HashMap<String, String>>,
    latest: Mutex<HashMap<String, Latest>>,
    pub fetches: AtomicUsize,
    pub lookups: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `@handle` as channel `UC<handle>` with the given latest item.
    pub fn channel(self, handle: &str, latest: Latest) -> Self {
        let id = channel_id(handle);
        self.handles.lock().unwrap().insert(handle.to_string(), id.clone());
        self.latest.lock().unwrap().insert(id, latest);
        self
    }

    pub fn set_latest(&self, handle: &str, latest: Latest) {
        self.latest.lock().unwrap().insert(channel_id(handle), latest);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

pub fn channel_id(handle: &str) -> String {
    format!("UC{}", handle)
}

#[async_trait]
impl ContentProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<ProviderId>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.handles.lock().unwrap().get(handle).cloned().map(ProviderId))
    }

    async fn latest_item(&self, channel: &ProviderId) -> Result<Option<Item>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let latest = self.latest.lock().unwrap().get(&channel.0).cloned();
        match latest {
            Some(Latest::Item(item)) => Ok(Some(item)),
            Some(Latest::Empty) | None => Ok(None),
            Some(Latest::Fail(message)) => Err(NotifierError::Parse(message)),
            Some(Latest::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
            Some(Latest::Panic) => panic!("provider blew up"),
        }
    }
}

/// Sink that records every delivery and answers with a scripted outcome.
pub struct FakeSink {
    pub deliveries: Mutex<Vec<(Destination, String)>>,
    outcomes: Mutex<HashMap<Destination, DeliveryOutcome>>,
    pub ready_calls: AtomicUsize,
}

impl FakeSink {
    pub fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            outcomes: Mutex::new(HashMap::new()),
            ready_calls: AtomicUsize::new(0),
        }
    }

    pub fn respond(&self, destination: &str, outcome: DeliveryOutcome) {
        self.outcomes.lock().unwrap().insert(Destination::from(destination), outcome);
    }

    pub fn deliveries(&self) -> Vec<(Destination, String)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSink for FakeSink {
    fn name(&self) -> &str {
        "fake"
    }

    async fn ready(&self) -> Result<()> {
        self.ready_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn deliver(&self, destination: &Destination, text: &str) -> DeliveryOutcome {
        self.deliveries
            .lock()
            .unwrap()
            .push((destination.clone(), text.to_string()));
        self.outcomes
            .lock()
            .unwrap()
            .get(destination)
            .cloned()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}

pub fn handle_spec(handle: &str) -> SourceSpec {
    SourceSpec::new(SourceRef::Handle(handle.to_string()))
}

pub struct Harness {
    pub engine: Arc<PollEngine>,
    pub provider: Arc<FakeProvider>,
    pub sink: Arc<FakeSink>,
    pub store: Arc<MemoryDedupStore>,
}

/// Engine over the given handles, all routed to `CHANNEL_Y` by default.
pub fn harness(handles: &[&str], provider: FakeProvider, routing: Option<RoutingTable>) -> Harness {
    harness_with(handles, provider, routing, EngineConfig::default(), MemoryDedupStore::new())
}

pub fn harness_with(
    handles: &[&str],
    provider: FakeProvider,
    routing: Option<RoutingTable>,
    config: EngineConfig,
    store: MemoryDedupStore,
) -> Harness {
    let routing = routing.unwrap_or_else(|| RoutingTable::new(Some(Destination::from(CHANNEL_Y))));
    let specs = handles.iter().map(|h| handle_spec(h)).collect();
    let registry = Arc::new(SourceRegistry::new(specs, routing).expect("registry"));

    let provider = Arc::new(provider);
    let sink = Arc::new(FakeSink::new());
    let store = Arc::new(store);
    let engine = Arc::new(PollEngine::new(
        registry,
        provider.clone(),
        sink.clone(),
        store.clone() as Arc<dyn DedupStore>,
        config,
    ));

    Harness {
        engine,
        provider,
        sink,
        store,
    }
}
