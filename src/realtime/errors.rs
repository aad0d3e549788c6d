//! # Real-Time Errors
//!
//! Error types for sessions, subscriptions and the wire protocol.

use thiserror::Error;

/// Result type for real-time operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Real-time errors
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    // ==================
    // Connection Errors
    // ==================
    /// Session is not registered (disconnected or evicted)
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Server is shutting down and accepts no new sessions
    #[error("Server is shutting down")]
    ShuttingDown,

    /// Invalid message format
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    // ==================
    // Subscription Errors
    // ==================
    /// Invalid subscription pattern
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Subscription not found
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Too many subscriptions
    #[error("Too many subscriptions (max: {0})")]
    TooManySubscriptions(usize),

    // ==================
    // Internal Errors
    // ==================
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    /// Returns the close code for WebSocket
    pub fn close_code(&self) -> u16 {
        match self {
            RealtimeError::SessionNotFound(_) => 1000,
            RealtimeError::ShuttingDown => 1001,
            RealtimeError::InvalidMessage(_) => 1003,
            RealtimeError::InvalidPattern(_) => 4000,
            RealtimeError::SubscriptionNotFound(_) => 4001,
            RealtimeError::TooManySubscriptions(_) => 4002,
            RealtimeError::Internal(_) => 4500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_close_codes() {
        assert_eq!(RealtimeError::ShuttingDown.close_code(), 1001);
        assert_eq!(
            RealtimeError::InvalidMessage("x".into()).close_code(),
            1003
        );
        assert_eq!(RealtimeError::TooManySubscriptions(100).close_code(), 4002);
    }
}
