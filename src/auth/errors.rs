//! # Access Errors
//!
//! Error types for the access filter.

use thiserror::Error;

use super::filter::Operation;

/// Result type for access checks
pub type AccessResult<T> = Result<T, AccessError>;

/// Access filter errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The filter rejected the operation
    #[error("{operation} denied on '{key}': {reason}")]
    Denied {
        operation: Operation,
        key: String,
        reason: String,
    },

    /// A filter rule was registered with a malformed pattern
    #[error("Invalid filter rule: {0}")]
    InvalidRule(String),
}

impl AccessError {
    /// Create a denial for the given operation and key
    pub fn denied(operation: Operation, key: &str, reason: impl Into<String>) -> Self {
        Self::Denied {
            operation,
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
