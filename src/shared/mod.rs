//! Shared Module
//!
//! Types that are independent of any particular client runtime: the closed
//! set of synchronized entity types, queue actions, configuration and the
//! shared error type.

/// Synchronized entity types and queue actions
pub mod entity;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use entity::{EntityType, SyncAction, CALENDAR_EVENTS_KEY, DISMISSED_NOTIFICATIONS_KEY};
pub use error::SharedError;
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
