//! Notification dispatch
//!
//! The sync core fires notifications as a side effect of specific domain
//! events (goal completed, achievement unlocked) observed while merging
//! server data. Delivery belongs to an external dispatcher; the core only
//! makes best-effort calls and never lets a delivery failure affect sync.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain event worth telling the user about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notification {
    GoalCompleted { goal_id: String, title: Option<String> },
    AchievementUnlocked { achievement_id: String, title: Option<String> },
}

impl Notification {
    pub fn title(&self) -> String {
        match self {
            Notification::GoalCompleted { title, .. } => {
                format!("Goal completed: {}", title.as_deref().unwrap_or("untitled goal"))
            }
            Notification::AchievementUnlocked { title, .. } => {
                format!("Achievement unlocked: {}", title.as_deref().unwrap_or("new achievement"))
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// External notification dispatcher
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Dispatcher that only logs; used when no push channel is wired up
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn dispatch(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!("{}", notification.title());
        Ok(())
    }
}

/// Fire every notification, logging and swallowing failures
pub async fn dispatch_best_effort(notifier: &dyn Notifier, notifications: &[Notification]) {
    for notification in notifications {
        if let Err(e) = notifier.dispatch(notification).await {
            tracing::warn!(error = %e, "Dropping notification");
        }
    }
}
