//! StudySync - Offline-First Sync Core
//!
//! Client-side data synchronization for the StudySync study tracker:
//! subjects, sessions, tasks, achievements, challenges, focus sessions,
//! goals and notes are stored locally per user and reconciled with the
//! companion backend whenever it is reachable.
//!
//! # Module Structure
//!
//! - **`shared`** - Types independent of the client runtime
//!   - Entity types and queue actions
//!   - Configuration (`AppConfig`)
//!   - Shared error type
//!
//! - **`client`** - The sync core
//!   - Local key-value store namespaced by user
//!   - Remote API client
//!   - Sync queue, orchestrator and scheduler
//!   - Auth/identity resolver with local fallback
//!
//! # Usage
//!
//! ```rust,no_run
//! use studysync::client::{AppContext, Config};
//! use studysync::shared::{EntityType, SyncAction};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = AppContext::new(Config::load(None)?).await?;
//! context.auth.sign_in("sam@example.com", "correct horse").await?;
//!
//! context.store.set("tasks", &serde_json::json!([{"id": "t1", "title": "Read"}])).await?;
//! context
//!     .sync
//!     .enqueue(EntityType::Tasks, SyncAction::Create, serde_json::json!({"id": "t1", "title": "Read"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! - `Result<T, E>` with one `thiserror` enum per layer
//! - Only auth errors are meant for the user; sync failures become status

/// Shared types and data structures
pub mod shared;

/// Offline-first client sync core
pub mod client;
