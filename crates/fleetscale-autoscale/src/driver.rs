//! Periodic driver for the sync controller.
//!
//! Every interval the loop lists autoscaler keys and runs one pass per key,
//! at most `max_concurrent` at a time. A round finishes before the next one
//! starts, so a key never has two passes in flight. Failed passes are
//! retried by the next round; there is no separate backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::controller::{SyncController, SyncOutcome};
use crate::error::ScaleResult;

/// Tally of one round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoundReport {
    pub reconciled: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct SyncLoop {
    controller: Arc<SyncController>,
    interval: Duration,
    max_concurrent: usize,
}

impl SyncLoop {
    pub fn new(controller: Arc<SyncController>, interval: Duration, max_concurrent: usize) -> Self {
        Self {
            controller,
            interval,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run one pass for every autoscaler.
    pub async fn run_round(&self) -> ScaleResult<RoundReport> {
        let keys = self.controller.autoscaler_keys()?;
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for key in keys {
            let controller = self.controller.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                // The semaphore is never closed, so acquiring cannot fail.
                let _permit = permits.acquire_owned().await.ok();
                let result = controller.sync(&key).await;
                (key, result)
            });
        }

        let mut report = RoundReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(SyncOutcome::Reconciled { .. }))) => report.reconciled += 1,
                Ok((_, Ok(_))) => report.skipped += 1,
                Ok((key, Err(e))) => {
                    report.failed += 1;
                    warn!(%key, error = %e, retryable = e.is_retryable(), "autoscaler sync failed");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, "autoscaler sync task panicked");
                }
            }
        }

        debug!(
            reconciled = report.reconciled,
            skipped = report.skipped,
            failed = report.failed,
            "sync round finished"
        );
        Ok(report)
    }

    /// Run rounds until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            max_concurrent = self.max_concurrent,
            "autoscaler sync loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.run_round().await {
                        error!(error = %e, "autoscaler sync round failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler sync loop shutting down");
                    break;
                }
            }
        }
    }
}
