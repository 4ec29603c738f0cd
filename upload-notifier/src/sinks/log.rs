use crate::traits::{DeliveryOutcome, NotificationSink};
use crate::types::{Destination, Result};
use async_trait::async_trait;
use tracing::info;

/// Dry-run sink: writes notifications to the log and reports them delivered.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn ready(&self) -> Result<()> {
        info!("Log sink ready (dry run, nothing will be posted)");
        Ok(())
    }

    async fn deliver(&self, destination: &Destination, text: &str) -> DeliveryOutcome {
        info!(%destination, "Would post: {}", text);
        DeliveryOutcome::Delivered
    }
}
