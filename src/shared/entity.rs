//! Entity Types
//!
//! The closed set of domain data categories that are synchronized with the
//! companion backend, plus the local-only keys that share the per-user
//! namespace but never leave the device.
//!
//! Each entity type is stored and synced as one independent unit (the whole
//! list of subjects, the whole list of tasks, ...). There is no per-record
//! version vector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::shared::error::SharedError;

/// Local-only key for calendar events (never uploaded)
pub const CALENDAR_EVENTS_KEY: &str = "calendar-events";

/// Local-only key for notifications the user dismissed (never uploaded)
pub const DISMISSED_NOTIFICATIONS_KEY: &str = "dismissed-notifications";

/// A synchronized data category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Subjects,
    Sessions,
    Tasks,
    Achievements,
    Challenges,
    FocusSessions,
    Goals,
    Notes,
}

impl EntityType {
    /// Every synchronized entity type, in upload order
    pub const ALL: [EntityType; 8] = [
        EntityType::Subjects,
        EntityType::Sessions,
        EntityType::Tasks,
        EntityType::Achievements,
        EntityType::Challenges,
        EntityType::FocusSessions,
        EntityType::Goals,
        EntityType::Notes,
    ];

    /// Wire and storage name (`focusSessions`, `tasks`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Subjects => "subjects",
            EntityType::Sessions => "sessions",
            EntityType::Tasks => "tasks",
            EntityType::Achievements => "achievements",
            EntityType::Challenges => "challenges",
            EntityType::FocusSessions => "focusSessions",
            EntityType::Goals => "goals",
            EntityType::Notes => "notes",
        }
    }

    /// Key this entity type is stored under inside a user's namespace
    pub fn storage_key(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|entity| entity.as_str() == s)
            .ok_or_else(|| SharedError::validation("entityType", format!("unknown entity type '{}'", s)))
    }
}

/// Kind of mutation recorded in the sync queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
