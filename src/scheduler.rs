//! Fixed-interval driver for the sync orchestrator.
//!
//! The first cycle fires immediately at startup, then every interval.
//! A try-lock guard keeps cycles from overlapping: a tick that arrives
//! while a run is still in flight is skipped, not queued.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::errors::SyncError;
use crate::sync::{RunSummary, SyncOrchestrator};

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    run_guard: Mutex<()>,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            run_guard: Mutex::new(()),
        }
    }

    /// Executes a single guarded cycle. Returns `Ok(None)` when another
    /// run already holds the guard.
    pub async fn run_once(&self) -> Result<Option<RunSummary>, SyncError> {
        let guard = match self.run_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Previous sync run still in progress; skipping this trigger");
                return Ok(None);
            }
        };
        let summary = self.orchestrator.run_once().await?;
        drop(guard);
        Ok(Some(summary))
    }

    /// Runs cycles until the shutdown future resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        // Setup failures abort the cycle; the next tick
                        // retries with a fresh row set.
                        error!(error = %err, "Sync cycle aborted");
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested; stopping scheduler");
                    break;
                }
            }
        }
    }
}
