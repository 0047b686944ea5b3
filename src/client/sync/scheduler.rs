//! # Sync Scheduler
//!
//! Periodic background trigger for full sync cycles. Each tick probes the
//! backend first; the cycle itself decides whether it can run.
//!
//! Stopping never cuts a cycle short: the loop only checks for shutdown
//! between ticks, and `stop` waits for the loop to exit.
//!
//! The loop holds the orchestrator weakly and upgrades only for the length
//! of a tick. Dropping the last orchestrator handle ends the loop.

use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::WeakOrchestrator;

#[derive(Debug)]
pub struct SyncScheduler {
    interval: Duration,
    task: Mutex<Option<RunningLoop>>,
}

#[derive(Debug)]
struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the background loop; returns false if it was already running
    ///
    /// The first tick fires immediately so a freshly started agent syncs
    /// without waiting a full interval.
    pub(crate) async fn start(&self, orchestrator: WeakOrchestrator) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            return false;
        }

        let period = self.interval;
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let Some(orchestrator) = orchestrator.upgrade() else {
                            tracing::debug!("Orchestrator dropped, background sync exiting");
                            break;
                        };
                        let outcome = orchestrator.on_timer().await;
                        tracing::debug!(?outcome, "Periodic sync tick");
                    }
                }
            }
        });

        *task = Some(RunningLoop { shutdown, handle });
        tracing::info!(interval_secs = period.as_secs(), "Background sync started");
        true
    }

    /// Stop the loop after any cycle in progress; returns false if it was
    /// not running
    pub async fn stop(&self) -> bool {
        let Some(running) = self.task.lock().await.take() else {
            return false;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            tracing::warn!(error = %e, "Background sync task ended abnormally");
        }
        tracing::info!("Background sync stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}
