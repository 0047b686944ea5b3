//! # Sync State
//!
//! Observable snapshot of the orchestrator, broadcast to status observers
//! (UI indicators, the agent's log line) through a `watch` channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Orchestrator state machine
///
/// `Syncing` never nests; `Idle` and `Error` are the only states a new
/// cycle can start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    Error,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// OS-level network available and the last ping succeeded
    pub is_online: bool,
    pub is_syncing: bool,
    /// Last successful full cycle, persisted per user
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Current queue length
    pub pending_changes: usize,
    /// Last cycle's failure, cleared by the next successful cycle
    pub error: Option<String>,
}

impl SyncStatus {
    pub(crate) fn enter_syncing(&mut self) {
        self.phase = SyncPhase::Syncing;
        self.is_syncing = true;
    }

    pub(crate) fn finish_ok(&mut self, last_sync_at: DateTime<Utc>) {
        self.phase = SyncPhase::Idle;
        self.is_syncing = false;
        self.last_sync_at = Some(last_sync_at);
        self.error = None;
    }

    pub(crate) fn finish_err(&mut self, error: String) {
        self.phase = SyncPhase::Error;
        self.is_syncing = false;
        self.error = Some(error);
    }

    /// Leave `Syncing` without touching the recorded error
    pub(crate) fn abandon(&mut self) {
        self.phase = if self.error.is_some() {
            SyncPhase::Error
        } else {
            SyncPhase::Idle
        };
        self.is_syncing = false;
    }
}
