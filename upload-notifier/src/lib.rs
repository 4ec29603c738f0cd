pub mod types;
pub mod traits;
pub mod fetcher;
pub mod providers;
pub mod sinks;
pub mod dedup;
pub mod registry;
pub mod engine;
pub mod scheduler;
pub mod config;
pub mod notifier;

pub use types::*;
pub use traits::{ContentProvider, DedupStore, DeliveryOutcome, NotificationSink};
pub use fetcher::{FetchConfig, HttpFetcher};
pub use registry::{Resolution, RoutingTable, SourceRegistry, SourceSpec};
pub use engine::{EngineConfig, PollEngine};
pub use scheduler::Scheduler;
pub use config::AppConfig;
pub use notifier::{Secrets, UploadNotifier};
