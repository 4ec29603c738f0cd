use crate::types::{Destination, Item, ProviderId, Result};
use async_trait::async_trait;

/// Upstream that knows about channels and their uploads.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Translate a human-readable handle into a provider channel ID.
    /// `Ok(None)` means the upstream has no matching channel.
    async fn resolve_handle(&self, handle: &str) -> Result<Option<ProviderId>>;

    /// Most recent upload of the channel, newest by publish date.
    /// `Ok(None)` means the channel has no uploads.
    async fn latest_item(&self, channel: &ProviderId) -> Result<Option<Item>>;
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The destination will never accept the message until someone fixes
    /// permissions or configuration.
    PermissionDenied(String),
    /// Worth retrying later (network trouble, rate limits, sink outage).
    TransientFailure(String),
}

/// Where notifications go.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    /// Startup handshake. Polling does not begin until this succeeds.
    async fn ready(&self) -> Result<()>;

    async fn deliver(&self, destination: &Destination, text: &str) -> DeliveryOutcome;
}

/// Durable set of item IDs that have already been notified.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn contains(&self, item_id: &str) -> Result<bool>;

    /// Idempotent. Must be durable once this returns `Ok`.
    async fn record(&self, item_id: &str) -> Result<()>;

    async fn len(&self) -> Result<usize>;
}
