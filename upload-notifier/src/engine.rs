use crate::registry::{Resolution, SourceRegistry};
use crate::traits::{ContentProvider, DedupStore, DeliveryOutcome, NotificationSink};
use crate::types::{
    CycleReport, FailureStage, Item, NotifierError, Result, Source, SourceOutcome, SourceReport,
};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on each provider or sink call.
    pub call_timeout: Duration,
    /// Bound on a whole cycle. Defaults to three calls per source.
    pub cycle_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            cycle_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn cycle_budget(&self, source_count: usize) -> Duration {
        self.cycle_timeout.unwrap_or_else(|| {
            let calls = u32::try_from(source_count).unwrap_or(u32::MAX).saturating_mul(3);
            self.call_timeout.checked_mul(calls).unwrap_or(Duration::MAX)
        })
    }
}

/// Notification text for a new upload.
pub fn format_notification(source: &Source, item: &Item) -> String {
    format!("🎥 **New Video Uploaded by {}:** {}\n{}", source.label, item.title, item.url)
}

/// One pass over every configured source: resolve, fetch, dedup, deliver, record.
pub struct PollEngine {
    registry: Arc<SourceRegistry>,
    provider: Arc<dyn ContentProvider>,
    sink: Arc<dyn NotificationSink>,
    store: Arc<dyn DedupStore>,
    config: EngineConfig,
    running: Mutex<()>,
}

impl PollEngine {
    pub fn new(
        registry: Arc<SourceRegistry>,
        provider: Arc<dyn ContentProvider>,
        sink: Arc<dyn NotificationSink>,
        store: Arc<dyn DedupStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            sink,
            store,
            config,
            running: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }

    pub fn provider(&self) -> &Arc<dyn ContentProvider> {
        &self.provider
    }

    /// Run a full cycle. Fails with [`NotifierError::CycleInProgress`] if
    /// another cycle holds the engine, or with the registry error if the
    /// source list cannot be loaded. Per-source failures never fail the cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _running = self.running.try_lock().map_err(|_| NotifierError::CycleInProgress)?;

        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", id = %cycle_id);
        self.run_cycle_inner(cycle_id).instrument(span).await
    }

    async fn run_cycle_inner(&self, cycle_id: Uuid) -> Result<CycleReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        self.registry.refresh().await?;
        let sources = self.registry.list().await;
        // `None` when the budget reaches past anything an `Instant` can hold.
        let deadline = start.checked_add(self.config.cycle_budget(sources.len()));
        info!("Checking {} sources for new uploads", sources.len());

        let mut reports = Vec::with_capacity(sources.len());
        for source in &sources {
            let outcome = if deadline.is_some_and(|d| Instant::now() >= d) {
                SourceOutcome::Skipped
            } else {
                self.poll_source(source).await
            };
            log_outcome(source, &outcome);
            reports.push(SourceReport {
                source: source.key.clone(),
                outcome,
            });
        }

        let report = CycleReport {
            cycle_id,
            started_at,
            duration: start.elapsed(),
            sources: reports,
        };
        info!("Cycle finished in {:?}: {}", report.duration, report.summary());
        Ok(report)
    }

    async fn poll_source(&self, source: &Source) -> SourceOutcome {
        let resolution = self
            .bounded("channel lookup", self.registry.resolve(source, self.provider.as_ref()))
            .await;
        let channel = match resolution {
            Ok(Resolution::Resolved(id)) => id,
            Ok(Resolution::NotFound) => {
                return SourceOutcome::FetchFailed {
                    stage: FailureStage::Resolve,
                    reason: format!("no channel found for {}", source.key),
                }
            }
            Err(e) => {
                return SourceOutcome::FetchFailed {
                    stage: FailureStage::Resolve,
                    reason: e.to_string(),
                }
            }
        };

        let item = match self.bounded("latest upload fetch", self.provider.latest_item(&channel)).await {
            Ok(Some(item)) => item,
            Ok(None) => return SourceOutcome::NoNewItem { item_id: None },
            Err(e) => {
                return SourceOutcome::FetchFailed {
                    stage: FailureStage::Fetch,
                    reason: e.to_string(),
                }
            }
        };

        match self.store.contains(&item.id).await {
            Ok(true) => return SourceOutcome::NoNewItem { item_id: Some(item.id) },
            Ok(false) => {}
            Err(e) => {
                return SourceOutcome::StoreFailed {
                    item_id: item.id,
                    reason: e.to_string(),
                }
            }
        }

        let text = format_notification(source, &item);
        let delivery = match tokio::time::timeout(
            self.config.call_timeout,
            self.sink.deliver(&source.destination, &text),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::TransientFailure(format!(
                "delivery timed out after {}s",
                self.config.call_timeout.as_secs()
            )),
        };

        let destination = source.destination.clone();
        match delivery {
            DeliveryOutcome::Delivered => match self.store.record(&item.id).await {
                Ok(()) => SourceOutcome::Notified {
                    item_id: item.id,
                    destination,
                },
                Err(e) => SourceOutcome::StoreFailed {
                    item_id: item.id,
                    reason: format!("delivered but not recorded: {}", e),
                },
            },
            // Recorded so the next cycle does not hammer a channel that will
            // never accept the message.
            DeliveryOutcome::PermissionDenied(reason) => match self.store.record(&item.id).await {
                Ok(()) => SourceOutcome::NotifyFailed {
                    item_id: item.id,
                    destination,
                    reason,
                    recorded: true,
                },
                Err(e) => SourceOutcome::StoreFailed {
                    item_id: item.id,
                    reason: format!("{}; also failed to record: {}", reason, e),
                },
            },
            DeliveryOutcome::TransientFailure(reason) => SourceOutcome::NotifyFailed {
                item_id: item.id,
                destination,
                reason,
                recorded: false,
            },
        }
    }

    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(NotifierError::Timeout {
                operation: operation.to_string(),
                seconds: self.config.call_timeout.as_secs(),
            }),
        }
    }
}

fn log_outcome(source: &Source, outcome: &SourceOutcome) {
    match outcome {
        SourceOutcome::Notified { item_id, destination } => {
            info!(source = %source.key, %destination, "Posted new video {}", item_id)
        }
        SourceOutcome::NoNewItem { item_id: Some(id) } => {
            debug!(source = %source.key, "No new video (latest {} already posted)", id)
        }
        SourceOutcome::NoNewItem { item_id: None } => debug!(source = %source.key, "Channel has no videos"),
        SourceOutcome::NotifyFailed {
            item_id,
            destination,
            reason,
            recorded,
        } => warn!(
            source = %source.key,
            %destination,
            recorded,
            "Could not post video {}: {}",
            item_id,
            reason
        ),
        SourceOutcome::FetchFailed { stage, reason } => {
            warn!(source = %source.key, %stage, "Check failed: {}", reason)
        }
        SourceOutcome::StoreFailed { item_id, reason } => {
            warn!(source = %source.key, "Dedup store error for {}: {}", item_id, reason)
        }
        SourceOutcome::Skipped => warn!(source = %source.key, "Skipped: cycle time budget exhausted"),
    }
}
