use crate::engine::PollEngine;
use crate::types::{CycleReport, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Drives the engine on a fixed period once the host reports ready.
///
/// Cycles never overlap: the loop awaits each cycle before taking the next
/// tick, and ticks missed while a cycle was running are dropped. Each cycle
/// runs in its own task so a panic inside it is contained to that tick.
pub struct Scheduler {
    engine: Arc<PollEngine>,
    period: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<PollEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Start on a background task so the caller stays free to serve other work.
    pub fn spawn<R>(self, ready: R, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<()>>
    where
        R: Future<Output = Result<()>> + Send + 'static,
    {
        tokio::spawn(self.run(ready, shutdown))
    }

    /// Wait for `ready`, then run cycles every period until `shutdown` flips
    /// to `true` or its sender is dropped. Only a failed `ready` is an error.
    pub async fn run<R>(self, ready: R, mut shutdown: watch::Receiver<bool>) -> Result<()>
    where
        R: Future<Output = Result<()>>,
    {
        ready.await?;
        info!("Scheduler started, polling every {:?}", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            // An in-flight cycle finishes before shutdown is honoured.
            self.tick().await;
            if *shutdown.borrow() {
                break;
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// Run one isolated cycle, logging rather than propagating any failure.
    pub async fn tick(&self) -> Option<CycleReport> {
        let engine = Arc::clone(&self.engine);
        match tokio::spawn(async move { engine.run_cycle().await }).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                error!("Poll cycle failed: {}", e);
                None
            }
            Err(e) if e.is_panic() => {
                error!("Poll cycle panicked; continuing with the next tick");
                None
            }
            Err(e) => {
                warn!("Poll cycle task was cancelled: {}", e);
                None
            }
        }
    }
}
