//! # Client Sync Core
//!
//! Offline-first data layer of the StudySync app: local namespaced storage,
//! the mutation queue, the sync orchestrator and identity resolution.
//!
//! ## Layout
//!
//! - `local_db` - per-user namespaced key-value store (SQLite)
//! - `api_client` - companion backend client (`RemoteApi`, `ApiClient`)
//! - `offline` - mutation queue, retry ceiling, merge of server data
//! - `sync` - orchestrator state machine, scheduler, connectivity, metrics
//! - `auth` / `local_auth` - identity resolution with local fallback
//! - `state` - `AppContext`, the explicitly constructed service owner
//!
//! Control flow: a UI mutation writes the store, then calls
//! `SyncOrchestrator::enqueue`; the orchestrator drains the queue on enqueue,
//! reconnect, timer or manual request, merges the server's answer back and
//! broadcasts `SyncStatus`.

pub mod api_client;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod local_auth;
pub mod local_db;
pub mod notifications;
pub mod offline;
pub mod state;
pub mod sync;
pub mod types;

pub use api_client::{ApiClient, RemoteApi};
pub use auth::{AuthResolver, AuthState};
pub use config::Config;
pub use error::{ApiError, AuthError, StoreError, SyncError};
pub use identity::IdentityHandle;
pub use local_db::LocalStore;
pub use notifications::{LogNotifier, Notification, Notifier};
pub use state::AppContext;
pub use sync::{CycleOutcome, SyncOrchestrator, SyncPhase, SyncStatus};
pub use types::Identity;
