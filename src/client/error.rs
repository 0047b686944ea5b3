//! Client Error Types
//!
//! One error enum per layer of the sync core:
//!
//! - `ApiError` - remote API transport and HTTP status failures
//! - `StoreError` - local key-value store failures
//! - `AuthError` - sign-in / sign-up failures surfaced to the user
//! - `SyncError` - queue item and full-cycle failures
//!
//! Only `AuthError` is meant to reach the user as an actionable message.
//! Sync failures are contained: item failures are logged and dropped after
//! the retry ceiling, cycle failures become a status flag.

use thiserror::Error;

use crate::shared::EntityType;

/// Result type for remote API calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for local store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Remote API errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport failure (DNS, connection refused, offline)
    #[error("Network error: {0}")]
    Network(String),

    /// The configured timeout elapsed before a response arrived
    #[error("Request timed out after {timeout_ms} ms")]
    RequestTimeout { timeout_ms: u64 },

    /// Server answered with a non-2xx status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Failed to parse response: {0}")]
    Decode(String),

    /// Call requires a bearer token and none is held
    #[error("Not authenticated")]
    NotAuthenticated,
}

impl ApiError {
    /// Build an HTTP error whose message comes from the status table
    pub fn http(status: u16) -> Self {
        Self::Http {
            status,
            message: status_message(status).to_string(),
        }
    }

    /// Transport-level failures: the server was never reached
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::RequestTimeout { .. })
    }

    /// HTTP status, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Human-readable message for an HTTP status
pub fn status_message(status: u16) -> &'static str {
    match status {
        400 => "The request was invalid",
        401 => "Your session has expired, please sign in again",
        403 => "You do not have permission to do that",
        404 => "The requested resource was not found",
        409 => "This email is already registered",
        422 => "Some of the submitted data is invalid",
        429 => "Too many requests, please try again later",
        500 => "The server encountered an error",
        502..=504 => "The server is temporarily unavailable",
        _ => "Unexpected response from the server",
    }
}

/// Local key-value store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt timestamp for key '{key}': {value}")]
    CorruptTimestamp { key: String, value: String },

    /// A namespaced write was attempted with no active identity
    #[error("No active identity")]
    NoIdentity,
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credentials rejected by both the remote and the local record
    #[error("{0}")]
    Rejected(String),

    /// Remote failure with no local fallback available
    #[error(transparent)]
    Remote(#[from] ApiError),

    #[error("Invalid {field}: {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// Message suitable for display next to the sign-in form
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Rejected(message) => message.clone(),
            AuthError::Remote(ApiError::Http { message, .. }) => message.clone(),
            AuthError::Remote(err) if err.is_transport() => {
                "Could not reach the server, check your connection".to_string()
            }
            AuthError::Remote(_) => "Unexpected response from the server".to_string(),
            AuthError::InvalidInput { message, .. } => message.clone(),
            AuthError::Hash(_) | AuthError::Store(_) => "Could not access local account data".to_string(),
        }
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AuthError::Hash(err.to_string())
    }
}

/// Synchronization errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// A queue item exhausted its delivery attempts and was dropped
    #[error("Queue item {item_id} ({entity_type}) dropped after {attempts} attempts: {reason}")]
    ItemFailure {
        item_id: String,
        entity_type: EntityType,
        attempts: u32,
        reason: String,
    },

    /// The full sync cycle aborted
    #[error("Sync cycle failed: {0}")]
    CycleFailure(String),

    /// The active identity changed while a cycle was running
    #[error("Identity changed during sync")]
    IdentityChanged,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
