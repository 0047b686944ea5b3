//! # State Reconciliation
//!
//! Merges a server download into the local store with a last-writer-wins
//! rule at entity-type granularity: a downloaded entity type replaces the
//! local one only when the server's `updatedAt` is strictly newer than the
//! local write stamp. Equal stamps never write, so repeated cycles converge
//! instead of bouncing the same data back and forth.
//!
//! While comparing goal and achievement lists the reconciler also picks up
//! domain events (a goal that became completed, an achievement that became
//! unlocked) for the notification dispatcher.

use serde_json::Value;
use std::collections::HashSet;

use crate::client::error::{SyncError, SyncResult};
use crate::client::identity::IdentityHandle;
use crate::client::local_db::{LocalStore, StoredEntry};
use crate::client::notifications::Notification;
use crate::client::types::{RemoteEntity, SyncDownloadResponse};
use crate::shared::EntityType;

/// What to do with one downloaded entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    Apply,
    KeepLocal,
}

/// Last-writer-wins decision for one entity type
pub fn decide(local: Option<&StoredEntry>, remote: &RemoteEntity) -> MergeDecision {
    match local {
        Some(entry) if remote.updated_at <= entry.updated_at => MergeDecision::KeepLocal,
        _ => MergeDecision::Apply,
    }
}

/// Result of reconciling one download
#[derive(Debug, Default)]
pub struct ReconciliationResult {
    /// Entity types replaced by server data
    pub applied: Vec<EntityType>,
    /// Entity types where local data was newer (or equal) and kept
    pub kept_local: Vec<EntityType>,
    /// Domain events observed in applied data
    pub notifications: Vec<Notification>,
}

/// Applies downloads to the local store
#[derive(Debug, Default)]
pub struct ReconciliationManager;

impl ReconciliationManager {
    pub fn new() -> Self {
        Self
    }

    /// Merge `download` into `uid`'s namespace
    ///
    /// The identity is re-checked before every write; if it no longer matches
    /// `uid` the merge stops with `SyncError::IdentityChanged`.
    pub async fn reconcile(
        &self,
        store: &LocalStore,
        identity: &IdentityHandle,
        uid: &str,
        download: &SyncDownloadResponse,
    ) -> SyncResult<ReconciliationResult> {
        let mut result = ReconciliationResult::default();

        for (entity_type, remote) in download.entities() {
            if !identity.is_current(uid) {
                return Err(SyncError::IdentityChanged);
            }

            let key = entity_type.storage_key();
            let local = store.get_entry_for(uid, key).await?;

            if decide(local.as_ref(), remote) == MergeDecision::KeepLocal {
                tracing::debug!(entity = %entity_type, "Local data is newer, keeping it");
                result.kept_local.push(entity_type);
                continue;
            }

            let written = store
                .merge_remote_for(uid, key, &remote.data, remote.updated_at)
                .await?;

            if written {
                let previous = local.map(|entry| entry.value).unwrap_or(Value::Null);
                result
                    .notifications
                    .extend(detect_events(entity_type, &previous, &remote.data));
                tracing::debug!(entity = %entity_type, updated_at = %remote.updated_at, "Applied server data");
                result.applied.push(entity_type);
            } else {
                // a local write landed between the read and the merge
                result.kept_local.push(entity_type);
            }
        }

        Ok(result)
    }
}

/// Goals that became completed / achievements that became unlocked
///
/// Only records that already existed locally in the "not yet" state count;
/// records first seen in a download are history, not news.
pub fn detect_events(entity_type: EntityType, previous: &Value, incoming: &Value) -> Vec<Notification> {
    let flag: fn(&Value) -> bool = match entity_type {
        EntityType::Goals => goal_completed,
        EntityType::Achievements => achievement_unlocked,
        _ => return Vec::new(),
    };

    let pending_locally: HashSet<&str> = records(previous)
        .filter(|record| !flag(record))
        .filter_map(record_id)
        .collect();

    records(incoming)
        .filter(|record| flag(record))
        .filter_map(|record| {
            let id = record_id(record)?;
            if !pending_locally.contains(id) {
                return None;
            }
            let title = record_title(record);
            Some(match entity_type {
                EntityType::Achievements => Notification::AchievementUnlocked {
                    achievement_id: id.to_string(),
                    title,
                },
                _ => Notification::GoalCompleted {
                    goal_id: id.to_string(),
                    title,
                },
            })
        })
        .collect()
}

fn records(value: &Value) -> impl Iterator<Item = &Value> {
    value.as_array().into_iter().flatten()
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn record_title(record: &Value) -> Option<String> {
    record
        .get("title")
        .or_else(|| record.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn goal_completed(record: &Value) -> bool {
    record.get("completed").and_then(Value::as_bool).unwrap_or(false)
}

fn achievement_unlocked(record: &Value) -> bool {
    record.get("unlocked").and_then(Value::as_bool).unwrap_or(false)
        || record.get("unlockedAt").is_some_and(|at| !at.is_null())
}
