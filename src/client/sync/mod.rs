//! # Sync Orchestrator
//!
//! Coordinates queue draining, periodic full sync, offline → online
//! transitions, merging of server data and status broadcasting.
//!
//! ## Full sync cycle
//!
//! Strictly sequential, never parallelized:
//!
//! 1. Drain the sync queue
//! 2. Download server changes since the last successful cycle
//! 3. Merge them into the local store (last-writer-wins per entity type)
//! 4. Upload the full current snapshot of every entity type
//! 5. Persist the new last-sync timestamp and clear the error
//!
//! Only one cycle runs at a time. The active identity is re-checked before
//! every write, so a sign-out during a cycle stops it from writing anything
//! further under the old user.
//!
//! ## Triggers
//!
//! - `enqueue` while online with a remote identity
//! - the background scheduler (`start` / `stop`)
//! - `set_network_available(true)` after being offline
//! - `force_sync`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use studysync::client::sync::SyncOrchestrator;
//! use studysync::shared::{EntityType, SyncAction};
//! # async fn example(orchestrator: SyncOrchestrator) -> Result<(), Box<dyn std::error::Error>> {
//! let mut status = orchestrator.subscribe();
//!
//! orchestrator
//!     .enqueue(EntityType::Tasks, SyncAction::Update, serde_json::json!({"id": "t1", "completed": true}))
//!     .await?;
//!
//! status.changed().await?;
//! println!("pending: {}", status.borrow().pending_changes);
//! # Ok(())
//! # }
//! ```

pub mod metrics;
pub mod network_monitor;
pub mod scheduler;
pub mod sync_state;

pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use network_monitor::{NetworkMonitor, NetworkStatus};
pub use scheduler::SyncScheduler;
pub use sync_state::{SyncPhase, SyncStatus};

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::api_client::RemoteApi;
use crate::client::error::{ApiError, StoreError, StoreResult, SyncError, SyncResult};
use crate::client::identity::IdentityHandle;
use crate::client::local_db::{LocalStore, LAST_SYNC_KEY};
use crate::client::notifications::{dispatch_best_effort, Notifier};
use crate::client::offline::queue::FlightGuard;
use crate::client::offline::{DrainReport, ReconciliationManager, RetryPolicy, SyncQueue, SyncQueueItem};
use crate::client::types::SyncUploadRequest;
use crate::shared::{AppConfig, EntityType, SyncAction};

/// Orchestrator settings derived from `AppConfig`
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval of the background scheduler
    pub sync_interval: Duration,
    /// Delivery attempts per queue item
    pub max_retries: u32,
    /// Start a cycle right after an enqueue when online
    pub sync_on_enqueue: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SyncConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            sync_interval: config.sync_interval,
            max_retries: config.max_retries,
            sync_on_enqueue: config.sync_on_enqueue,
        }
    }
}

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Enqueue,
    Timer,
    Reconnect,
    SignIn,
    Manual,
}

/// Why a cycle did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another cycle is in flight
    AlreadySyncing,
    NoIdentity,
    /// Local-only identities never sync
    LocalIdentity,
    Offline,
    /// Sign-out or account switch during the cycle
    IdentityChanged,
}

/// Summary of a successful cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Queue items delivered during the drain step
    pub drained: usize,
    /// Queue items that failed and stay queued
    pub retried: usize,
    /// Queue items dropped at the retry ceiling
    pub dropped: usize,
    /// Entity types replaced by server data
    pub merged_entity_types: Vec<EntityType>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Skipped(SkipReason),
    /// The cycle aborted; the reason is also recorded in `SyncStatus.error`
    Failed(String),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }
}

/// Owns the sync queue and drives every sync cycle
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    store: LocalStore,
    api: Arc<dyn RemoteApi>,
    identity: IdentityHandle,
    queue: SyncQueue,
    network: NetworkMonitor,
    reconciler: ReconciliationManager,
    notifier: Arc<dyn Notifier>,
    metrics: SyncMetrics,
    status: watch::Sender<SyncStatus>,
    cycle_in_flight: AtomicBool,
    scheduler: SyncScheduler,
}

/// Non-owning handle held by the background scheduler
#[derive(Clone)]
pub(crate) struct WeakOrchestrator(Weak<Inner>);

impl WeakOrchestrator {
    pub(crate) fn upgrade(&self) -> Option<SyncOrchestrator> {
        self.0.upgrade().map(|inner| SyncOrchestrator { inner })
    }
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.inner.config)
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfig,
        store: LocalStore,
        api: Arc<dyn RemoteApi>,
        identity: IdentityHandle,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let queue = SyncQueue::new(store.clone(), RetryPolicy::new(config.max_retries));
        let (status, _) = watch::channel(SyncStatus::default());
        let scheduler = SyncScheduler::new(config.sync_interval);

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                api,
                identity,
                queue,
                network: NetworkMonitor::new(),
                reconciler: ReconciliationManager::new(),
                notifier,
                metrics: SyncMetrics::new(),
                status,
                cycle_in_flight: AtomicBool::new(false),
                scheduler,
            }),
        }
    }

    // ── Observation ─────────────────────────────────────────────────

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.inner.network.status()
    }

    /// Pending mutations of the current owner, in order
    pub async fn pending_items(&self) -> Vec<SyncQueueItem> {
        self.inner.queue.items().await
    }

    // ── Identity ────────────────────────────────────────────────────

    /// Rebind the queue and status to the identity now in the handle
    ///
    /// Called by the auth resolver after every identity change. The previous
    /// owner's queue stays persisted under their uid and is never drained
    /// under the new one.
    pub async fn identity_changed(&self) -> StoreResult<()> {
        let uid = self.inner.identity.current_uid();
        self.inner.queue.load_for(uid.as_deref()).await?;

        let last_sync_at = match &uid {
            Some(uid) => self.load_last_sync(uid).await?,
            None => None,
        };
        let pending = self.inner.queue.len().await;

        self.inner.status.send_modify(|status| {
            status.last_sync_at = last_sync_at;
            status.pending_changes = pending;
            status.error = None;
            if !status.is_syncing {
                status.phase = SyncPhase::Idle;
            }
        });
        Ok(())
    }

    /// Drop the current owner's pending items
    pub async fn discard_pending(&self) -> StoreResult<()> {
        let discarded = self.inner.queue.len().await;
        self.inner.queue.clear().await?;
        if discarded > 0 {
            tracing::info!(discarded, "Discarded pending mutations");
        }
        self.publish_pending().await;
        Ok(())
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Record a local mutation for delivery
    ///
    /// The item is filed under the identity active at the time of the call,
    /// even if the queue has not been rebound to it yet. The queue is
    /// persisted before this returns. When online with a remote identity a
    /// cycle is started in the background.
    pub async fn enqueue(
        &self,
        entity_type: EntityType,
        action: SyncAction,
        payload: Value,
    ) -> StoreResult<SyncQueueItem> {
        let uid = self.inner.identity.current_uid().ok_or(StoreError::NoIdentity)?;
        let item = self.inner.queue.enqueue(&uid, entity_type, action, payload).await?;
        self.publish_pending().await;

        if self.inner.config.sync_on_enqueue && self.can_sync() {
            let orchestrator = self.clone();
            tokio::spawn(async move {
                orchestrator.run_cycle(SyncTrigger::Enqueue).await;
            });
        }
        Ok(item)
    }

    /// Drain the queue outside a full cycle
    ///
    /// `None` when no remote identity is active or the backend is offline;
    /// attempting delivery then would only burn retry attempts. Skipped when
    /// another drain is already running.
    pub async fn drain(&self) -> Option<DrainReport> {
        if !self.can_sync() {
            return None;
        }
        Some(self.drain_queue(false).await)
    }

    /// `wait_for_current` queues behind a drain in progress instead of skipping
    async fn drain_queue(&self, wait_for_current: bool) -> DrainReport {
        let api = Arc::clone(&self.inner.api);
        let deliver = |item: SyncQueueItem| {
            let api = Arc::clone(&api);
            async move {
                api.upload_sync(&SyncUploadRequest::for_item(&item)).await?;
                Ok::<(), ApiError>(())
            }
        };
        let report = if wait_for_current {
            self.inner.queue.drain_after_current(deliver).await
        } else {
            self.inner.queue.drain(deliver).await
        };

        if !report.skipped {
            self.inner.metrics.record_items(report.delivered, report.dropped.len());
            self.publish_pending().await;
        }
        report
    }

    // ── Connectivity ────────────────────────────────────────────────

    /// Ping the backend and update `is_online`; no data is touched
    pub async fn check_connection(&self) -> bool {
        let online = self.inner.network.probe(self.inner.api.as_ref()).await;
        self.publish_online();
        online
    }

    /// Report an OS-level online/offline signal
    ///
    /// An offline → online transition probes the backend and, when it
    /// answers, runs a cycle. Returns that cycle's outcome, if one ran.
    pub async fn set_network_available(&self, available: bool) -> Option<CycleOutcome> {
        let came_online = self.inner.network.set_os_online(available);
        self.publish_online();

        if !came_online {
            if !available {
                tracing::info!("Network unavailable, sync paused");
            }
            return None;
        }

        tracing::info!("Network available again, checking backend");
        if self.check_connection().await {
            Some(self.run_cycle(SyncTrigger::Reconnect).await)
        } else {
            None
        }
    }

    fn can_sync(&self) -> bool {
        self.inner.identity.is_remote() && self.inner.network.is_online()
    }

    // ── Cycles ──────────────────────────────────────────────────────

    /// Periodic tick: probe, then cycle if the probe succeeded
    pub async fn on_timer(&self) -> CycleOutcome {
        self.check_connection().await;
        self.run_cycle(SyncTrigger::Timer).await
    }

    /// Explicit user request
    pub async fn force_sync(&self) -> CycleOutcome {
        self.check_connection().await;
        self.run_cycle(SyncTrigger::Manual).await
    }

    /// Run a cycle in the background, probing first if not known online
    pub fn spawn_cycle(&self, trigger: SyncTrigger) -> JoinHandle<CycleOutcome> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            if !orchestrator.inner.network.is_online() {
                orchestrator.check_connection().await;
            }
            orchestrator.run_cycle(trigger).await
        })
    }

    /// Run one full cycle if the preconditions hold
    pub async fn run_cycle(&self, trigger: SyncTrigger) -> CycleOutcome {
        let Some(identity) = self.inner.identity.current() else {
            return CycleOutcome::Skipped(SkipReason::NoIdentity);
        };
        if !identity.is_from_remote {
            return CycleOutcome::Skipped(SkipReason::LocalIdentity);
        }
        if !self.inner.network.is_online() {
            tracing::debug!(?trigger, "Offline, skipping sync cycle");
            return CycleOutcome::Skipped(SkipReason::Offline);
        }
        let Some(guard) = FlightGuard::acquire(&self.inner.cycle_in_flight) else {
            tracing::debug!(?trigger, "Sync cycle already in flight");
            return CycleOutcome::Skipped(SkipReason::AlreadySyncing);
        };

        // The flag is released inside the final status update, so anyone who
        // observes the cycle as finished can start the next one.
        let uid = identity.uid;
        tracing::info!(?trigger, uid = %uid, "Sync cycle started");
        self.inner.status.send_modify(SyncStatus::enter_syncing);
        self.inner.metrics.record_cycle_start();
        let started = Instant::now();

        let result = self.cycle(&uid).await;
        let elapsed = started.elapsed();

        match result {
            Ok(report) if self.inner.identity.is_current(&uid) => {
                self.inner.metrics.record_cycle_success(elapsed);
                let pending = self.inner.queue.len().await;
                self.inner.status.send_modify(|status| {
                    status.finish_ok(report.uploaded_at);
                    status.pending_changes = pending;
                    drop(guard);
                });
                tracing::info!(
                    delivered = report.drained,
                    dropped = report.dropped,
                    merged = report.merged_entity_types.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Sync cycle finished"
                );
                CycleOutcome::Completed(report)
            }
            Ok(_) | Err(SyncError::IdentityChanged) => {
                self.inner.metrics.record_cycle_failure(elapsed);
                self.inner.status.send_modify(|status| {
                    status.abandon();
                    drop(guard);
                });
                tracing::warn!(uid = %uid, "Identity changed during sync cycle, stopped");
                CycleOutcome::Skipped(SkipReason::IdentityChanged)
            }
            Err(e) => {
                self.inner.metrics.record_cycle_failure(elapsed);
                let reason = SyncError::CycleFailure(e.to_string()).to_string();
                self.inner.status.send_modify(|status| {
                    status.finish_err(reason.clone());
                    drop(guard);
                });
                tracing::error!(error = %reason, "Sync cycle failed");
                CycleOutcome::Failed(reason)
            }
        }
    }

    async fn cycle(&self, uid: &str) -> SyncResult<CycleReport> {
        let drain = self.drain_queue(true).await;
        self.ensure_identity(uid)?;

        let since = self.load_last_sync(uid).await?;
        let download = self.inner.api.download_sync(since).await?;

        let merged = self
            .inner
            .reconciler
            .reconcile(&self.inner.store, &self.inner.identity, uid, &download)
            .await?;
        dispatch_best_effort(self.inner.notifier.as_ref(), &merged.notifications).await;

        self.ensure_identity(uid)?;
        let snapshot = self.inner.store.snapshot_for(uid, &EntityType::ALL).await?;
        let uploaded_at = Utc::now();
        self.inner
            .api
            .upload_sync(&SyncUploadRequest::full_snapshot(snapshot, uploaded_at))
            .await?;

        self.ensure_identity(uid)?;
        self.inner.store.set_for(uid, LAST_SYNC_KEY, &uploaded_at).await?;

        Ok(CycleReport {
            drained: drain.delivered,
            retried: drain.retried,
            dropped: drain.dropped.len(),
            merged_entity_types: merged.applied,
            uploaded_at,
        })
    }

    fn ensure_identity(&self, uid: &str) -> SyncResult<()> {
        if self.inner.identity.is_current(uid) {
            Ok(())
        } else {
            Err(SyncError::IdentityChanged)
        }
    }

    async fn load_last_sync(&self, uid: &str) -> StoreResult<Option<DateTime<Utc>>> {
        self.inner.store.get_for(uid, LAST_SYNC_KEY).await
    }

    async fn publish_pending(&self) {
        let pending = self.inner.queue.len().await;
        self.inner
            .status
            .send_if_modified(|status| std::mem::replace(&mut status.pending_changes, pending) != pending);
    }

    fn publish_online(&self) {
        let online = self.inner.network.is_online();
        self.inner
            .status
            .send_if_modified(|status| std::mem::replace(&mut status.is_online, online) != online);
    }

    // ── Background scheduler ────────────────────────────────────────

    pub async fn start(&self) -> bool {
        self.inner.scheduler.start(self.downgrade()).await
    }

    pub async fn stop(&self) -> bool {
        self.inner.scheduler.stop().await
    }

    pub async fn is_running(&self) -> bool {
        self.inner.scheduler.is_running().await
    }

    fn downgrade(&self) -> WeakOrchestrator {
        WeakOrchestrator(Arc::downgrade(&self.inner))
    }
}
