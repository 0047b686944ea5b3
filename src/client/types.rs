/**
 * Shared Types Module
 *
 * Wire types exchanged with the companion backend and the resolved
 * `Identity` that namespaces all local data.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::client::offline::queue::SyncQueueItem;
use crate::shared::{EntityType, SyncAction};

/// Resolved user context
///
/// `uid` namespaces every local key (`{uid}:{entity}`); `is_from_remote`
/// decides whether sync is attempted at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub is_from_remote: bool,
}

impl Identity {
    pub fn remote(user: &UserInfo) -> Self {
        Self {
            uid: user.id.clone(),
            email: user.email.clone(),
            display_name: user.name.clone(),
            is_from_remote: true,
        }
    }

    pub fn local(uid: impl Into<String>, email: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name,
            is_from_remote: false,
        }
    }
}

/// User information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Authentication response from server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Third-party identity provider sign-in (`/auth/google`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderLoginRequest {
    pub id_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
}

/// Which queued mutation an upload carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRef {
    pub id: String,
    pub action: SyncAction,
}

/// Body of `POST /sync/upload`: a partial or full snapshot keyed by entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUploadRequest {
    pub data: BTreeMap<EntityType, Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<MutationRef>,
}

impl SyncUploadRequest {
    /// Upload of a single queued mutation
    pub fn for_item(item: &SyncQueueItem) -> Self {
        let mut data = BTreeMap::new();
        data.insert(item.entity_type, item.payload.clone());
        Self {
            data,
            timestamp: item.enqueued_at,
            mutation: Some(MutationRef {
                id: item.id.clone(),
                action: item.action,
            }),
        }
    }

    /// Upload of every entity type's current state
    pub fn full_snapshot(data: BTreeMap<EntityType, Value>, timestamp: DateTime<Utc>) -> Self {
        Self {
            data,
            timestamp,
            mutation: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUploadResponse {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One entity type as recorded on the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntity {
    pub data: Value,
    pub updated_at: DateTime<Utc>,
}

/// Body of `GET /sync/download`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDownloadResponse {
    /// Keyed by entity name; unknown names are ignored by the merge step
    #[serde(default)]
    pub data: BTreeMap<String, RemoteEntity>,
    #[serde(default)]
    pub server_time: Option<DateTime<Utc>>,
}

impl SyncDownloadResponse {
    /// Entries whose key names a known entity type, in entity order
    pub fn entities(&self) -> Vec<(EntityType, &RemoteEntity)> {
        let mut entities: Vec<_> = self
            .data
            .iter()
            .filter_map(|(name, entity)| match name.parse::<EntityType>() {
                Ok(entity_type) => Some((entity_type, entity)),
                Err(_) => {
                    tracing::debug!(entity = %name, "Ignoring unknown entity type in download");
                    None
                }
            })
            .collect();
        entities.sort_by_key(|(entity_type, _)| *entity_type);
        entities
    }
}
