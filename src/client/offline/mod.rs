//! # Offline Mutation Handling
//!
//! Keeps the app fully usable without a network: every local mutation is
//! recorded in a persisted queue and delivered once the backend is reachable,
//! and downloaded server state is merged back without clobbering newer
//! local edits.
//!
//! ## Key Components
//!
//! - `queue.rs`: ordered, persisted, single-flight mutation queue
//! - `retry.rs`: retry ceiling for failed deliveries
//! - `reconciliation.rs`: last-writer-wins merge of server downloads
//!
//! ## Usage
//!
//! ```rust,no_run
//! use studysync::client::offline::{RetryPolicy, SyncQueue};
//! use studysync::shared::{EntityType, SyncAction};
//! # use studysync::client::local_db::LocalStore;
//! # async fn example(store: LocalStore) -> Result<(), Box<dyn std::error::Error>> {
//! let queue = SyncQueue::new(store, RetryPolicy::new(3));
//! queue.load_for(Some("user-1")).await?;
//! queue
//!     .enqueue("user-1", EntityType::Goals, SyncAction::Create, serde_json::json!({"id": "g1"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod reconciliation;
pub mod retry;

pub use queue::{DrainReport, SyncQueue, SyncQueueItem};
pub use reconciliation::{MergeDecision, ReconciliationManager, ReconciliationResult};
pub use retry::{RetryDecision, RetryPolicy};
