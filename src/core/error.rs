//! Core Error Types
//!
//! Errors returned by the write path to the originating caller.

use thiserror::Error;

use crate::auth::AccessError;
use crate::keyspace::KeyspaceError;
use crate::realtime::RealtimeError;
use crate::storage::StorageError;

/// Core module result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Error)]
pub enum CoreError {
    /// Read or delete of an absent key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected by the access filter; nothing was changed
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Undecodable or invalid request
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Persistence layer failed
    #[error("Storage failure: {0}")]
    InternalStorageFailure(#[source] StorageError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Create a not found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Create a malformed request error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    /// Get error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::MalformedRequest(_) => "MALFORMED_REQUEST",
            Self::InternalStorageFailure(_) => "STORAGE_FAILURE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::PermissionDenied(_) => 403,
            Self::MalformedRequest(_) => 400,
            Self::InternalStorageFailure(_) => 500,
            Self::Internal(_) => 500,
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(e: StorageError) -> Self {
        Self::InternalStorageFailure(e)
    }
}

impl From<KeyspaceError> for CoreError {
    fn from(e: KeyspaceError) -> Self {
        Self::MalformedRequest(e.to_string())
    }
}

impl From<AccessError> for CoreError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Denied { .. } => Self::PermissionDenied(e.to_string()),
            AccessError::InvalidRule(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<RealtimeError> for CoreError {
    fn from(e: RealtimeError) -> Self {
        match e {
            RealtimeError::InvalidMessage(_)
            | RealtimeError::InvalidPattern(_)
            | RealtimeError::SubscriptionNotFound(_)
            | RealtimeError::TooManySubscriptions(_) => Self::MalformedRequest(e.to_string()),
            RealtimeError::SessionNotFound(_)
            | RealtimeError::ShuttingDown
            | RealtimeError::Internal(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedRequest(e.to_string())
    }
}
