//! Shared Error Types
//!
//! Errors for the shared data types: validation of user-supplied values
//! such as entity type names.
//!
//! # Usage
//!
//! ```rust
//! use studysync::shared::error::SharedError;
//!
//! let error = SharedError::validation("email", "Email address is required");
//! ```
use thiserror::Error;

/// Errors raised by shared types
#[derive(Debug, Error, Clone)]
pub enum SharedError {
    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}
