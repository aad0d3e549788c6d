//! Stored documents.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned document stored under a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique key; stable for the document's lifetime
    pub key: String,

    /// Structured payload
    pub value: Value,

    /// Per-key version, strictly increasing across every mutation of the key
    pub version: u64,

    /// Unix milliseconds of creation
    pub created: i64,

    /// Unix milliseconds of the last update, `0` until first updated
    pub updated: i64,
}

/// Current wall clock in unix milliseconds
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
