//! # Sync Queue
//!
//! Ordered, persisted list of pending mutations awaiting delivery to the
//! companion backend.
//!
//! ## Guarantees
//!
//! - **Durable enqueue**: the queue is written to the local store before
//!   `enqueue` returns.
//! - **Global FIFO**: items are attempted in insertion order. A failed item
//!   keeps its position; it is not moved behind newer items.
//! - **Retry ceiling**: an item that fails `max_attempts` times is removed and
//!   reported as a `SyncError::ItemFailure`.
//! - **Single-flight drain**: a drain that starts while another is running
//!   returns immediately without making any delivery calls. The sync cycle
//!   uses `drain_after_current`, which waits its turn instead.
//! - **Owned by one user**: the queue is bound to the uid it was loaded for
//!   and persisted under `{uid}:sync-queue`. Reloading for another identity
//!   replaces the items wholesale. An enqueue names its uid and rebinds the
//!   queue first when that uid is not the current owner.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use studysync::client::offline::queue::SyncQueue;
//! use studysync::client::offline::retry::RetryPolicy;
//! use studysync::shared::{EntityType, SyncAction};
//! # use studysync::client::local_db::LocalStore;
//! # async fn example(store: LocalStore) -> Result<(), Box<dyn std::error::Error>> {
//! let queue = SyncQueue::new(store, RetryPolicy::default());
//! queue.load_for(Some("user-1")).await?;
//!
//! queue
//!     .enqueue("user-1", EntityType::Tasks, SyncAction::Update, serde_json::json!({"id": "t1"}))
//!     .await?;
//!
//! let report = queue.drain(|_item| async { Ok(()) }).await;
//! assert_eq!(report.delivered, 1);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::client::error::{ApiResult, StoreResult, SyncError};
use crate::client::local_db::{LocalStore, QUEUE_KEY};
use crate::client::offline::retry::{RetryDecision, RetryPolicy};
use crate::shared::{EntityType, SyncAction};

/// A single pending mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: String,
    pub entity_type: EntityType,
    pub action: SyncAction,
    /// Snapshot of the entity state at enqueue time
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl SyncQueueItem {
    pub fn new(entity_type: EntityType, action: SyncAction, payload: Value) -> Self {
        let enqueued_at = Utc::now();
        Self {
            id: generate_item_id(entity_type, action, enqueued_at),
            entity_type,
            action,
            payload,
            enqueued_at,
            retry_count: 0,
        }
    }
}

/// `{entity}-{action}-{millis}-{random}`; the random suffix keeps ids
/// unique when several items are enqueued within the same millisecond
pub fn generate_item_id(entity_type: EntityType, action: SyncAction, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}-{}",
        entity_type,
        action,
        at.timestamp_millis(),
        &suffix[..12]
    )
}

/// Outcome of one drain pass
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Items delivered and removed
    pub delivered: usize,
    /// Items that failed and stay queued with a higher retry count
    pub retried: usize,
    /// Items removed after exhausting their attempts
    pub dropped: Vec<SyncError>,
    /// Another drain was already running; nothing was attempted
    pub skipped: bool,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Persisted queue of pending mutations
#[derive(Debug)]
pub struct SyncQueue {
    store: LocalStore,
    retry: RetryPolicy,
    state: Mutex<QueueState>,
    drain_lock: Mutex<()>,
}

#[derive(Debug, Default)]
struct QueueState {
    owner: Option<String>,
    items: VecDeque<SyncQueueItem>,
}

/// Clears an in-flight flag when dropped
pub(crate) struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    /// `None` if the flag was already set
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncQueue {
    /// Create an empty, unowned queue
    pub fn new(store: LocalStore, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            state: Mutex::new(QueueState::default()),
            drain_lock: Mutex::new(()),
        }
    }

    /// Bind the queue to `uid` and load its persisted items
    ///
    /// `None` unloads the queue.
    pub async fn load_for(&self, uid: Option<&str>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        self.rebind(&mut state, uid).await
    }

    /// Read happens under the state lock so a concurrent enqueue can never
    /// be overwritten by a stale load
    async fn rebind(&self, state: &mut MutexGuard<'_, QueueState>, uid: Option<&str>) -> StoreResult<()> {
        let items: Vec<SyncQueueItem> = match uid {
            Some(uid) => self.store.get_for(uid, QUEUE_KEY).await?,
            None => Vec::new(),
        };

        tracing::debug!(owner = ?uid, pending = items.len(), "Loaded sync queue");
        state.owner = uid.map(str::to_string);
        state.items = items.into();
        Ok(())
    }

    /// Append a mutation for `uid` and persist before returning
    ///
    /// Rebinds the queue to `uid` first when another owner is loaded, so a
    /// mutation made right after an identity switch never lands in the
    /// previous user's queue.
    pub async fn enqueue(
        &self,
        uid: &str,
        entity_type: EntityType,
        action: SyncAction,
        payload: Value,
    ) -> StoreResult<SyncQueueItem> {
        let item = SyncQueueItem::new(entity_type, action, payload);

        let mut state = self.state.lock().await;
        if state.owner.as_deref() != Some(uid) {
            tracing::debug!(owner = ?state.owner, uid = %uid, "Queue owner stale, rebinding before enqueue");
            self.rebind(&mut state, Some(uid)).await?;
        }
        state.items.push_back(item.clone());

        if let Err(e) = self.persist(uid, &state.items).await {
            state.items.pop_back();
            return Err(e);
        }

        tracing::debug!(id = %item.id, entity = %entity_type, action = %action, "Enqueued mutation");
        Ok(item)
    }

    /// Attempt delivery of every queued item in order
    ///
    /// `deliver` performs the remote call for one item. Successes are removed,
    /// failures advance the item's retry counter or drop it at the ceiling. A
    /// failing item never stops later items from being attempted in the same pass.
    pub async fn drain<F, Fut>(&self, deliver: F) -> DrainReport
    where
        F: Fn(SyncQueueItem) -> Fut,
        Fut: Future<Output = ApiResult<()>>,
    {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            tracing::debug!("Drain already in progress, skipping");
            return DrainReport::skipped();
        };
        self.drain_items(deliver).await
    }

    /// Like `drain`, but waits for a drain in progress to finish and then
    /// runs its own pass instead of skipping
    pub async fn drain_after_current<F, Fut>(&self, deliver: F) -> DrainReport
    where
        F: Fn(SyncQueueItem) -> Fut,
        Fut: Future<Output = ApiResult<()>>,
    {
        let _guard = self.drain_lock.lock().await;
        self.drain_items(deliver).await
    }

    async fn drain_items<F, Fut>(&self, deliver: F) -> DrainReport
    where
        F: Fn(SyncQueueItem) -> Fut,
        Fut: Future<Output = ApiResult<()>>,
    {
        let (owner, pending) = {
            let state = self.state.lock().await;
            (state.owner.clone(), state.items.iter().cloned().collect::<Vec<_>>())
        };
        let mut report = DrainReport::default();
        let Some(owner) = owner else {
            return report;
        };

        for item in pending {
            let outcome = deliver(item.clone()).await;

            let mut state = self.state.lock().await;
            if state.owner.as_deref() != Some(owner.as_str()) {
                tracing::warn!("Queue owner changed during drain, stopping");
                break;
            }

            match outcome {
                Ok(()) => {
                    state.items.retain(|queued| queued.id != item.id);
                    report.delivered += 1;
                    tracing::debug!(id = %item.id, entity = %item.entity_type, "Delivered queue item");
                }
                Err(err) => match self.retry.on_failure(item.retry_count) {
                    RetryDecision::Retry { next_count } => {
                        if let Some(queued) = state.items.iter_mut().find(|queued| queued.id == item.id) {
                            queued.retry_count = next_count;
                        }
                        report.retried += 1;
                        tracing::warn!(
                            id = %item.id,
                            entity = %item.entity_type,
                            retry_count = next_count,
                            error = %err,
                            "Queue item delivery failed, will retry"
                        );
                    }
                    RetryDecision::Drop { attempts } => {
                        state.items.retain(|queued| queued.id != item.id);
                        let failure = SyncError::ItemFailure {
                            item_id: item.id.clone(),
                            entity_type: item.entity_type,
                            attempts,
                            reason: err.to_string(),
                        };
                        tracing::error!(entity = %item.entity_type, "{}", failure);
                        report.dropped.push(failure);
                    }
                },
            }

            if let Err(e) = self.persist(&owner, &state.items).await {
                tracing::error!(error = %e, "Failed to persist sync queue");
            }
        }

        report
    }

    /// Whether a drain is currently running
    pub fn is_draining(&self) -> bool {
        self.drain_lock.try_lock().is_err()
    }

    /// Number of pending items
    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of the pending items in order
    pub async fn items(&self) -> Vec<SyncQueueItem> {
        self.state.lock().await.items.iter().cloned().collect()
    }

    /// uid the queue is bound to
    pub async fn owner(&self) -> Option<String> {
        self.state.lock().await.owner.clone()
    }

    /// Drop every pending item for the current owner
    pub async fn clear(&self) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.items.clear();
        if let Some(owner) = state.owner.clone() {
            self.persist(&owner, &state.items).await?;
        }
        Ok(())
    }

    async fn persist(&self, owner: &str, items: &VecDeque<SyncQueueItem>) -> StoreResult<()> {
        self.store.set_for(owner, QUEUE_KEY, items).await?;
        Ok(())
    }
}
