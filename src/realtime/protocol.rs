//! # Wire Protocol
//!
//! JSON text frames exchanged over a session. Requests are a closed tagged
//! union decoded once by the transport; every reply and notification is a
//! [`ServerMessage`] travelling through the session's outbound queue.
//!
//! ```text
//! -> {"type":"subscribe","id":"1","pattern":"rooms/*"}
//! <- {"type":"subscribed","id":"1","pattern":"rooms/*","snapshot":[...]}
//! -> {"type":"patch","key":"rooms/1","value":{"topic":"rust"}}
//! <- {"type":"ack","key":"rooms/1","version":2}
//! <- {"type":"change","event":{"kind":"updated","key":"rooms/1",...}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{RealtimeError, RealtimeResult};
use super::event::ChangeEvent;
use crate::storage::Document;

/// A client request with an optional correlation id echoed in the reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(flatten)]
    pub op: RequestOp,
}

/// Request variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestOp {
    /// Read a key, or every key matching a pattern
    Read { key: String },

    /// Full-document write
    #[serde(alias = "write")]
    Replace { key: String, value: Value },

    /// Partial-document write
    Patch { key: String, value: Value },

    /// Delete a key, or every key matching a pattern
    Delete { key: String },

    Subscribe { pattern: String },

    Unsubscribe { pattern: String },

    Ping,
}

/// Messages sent to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Single document read
    Document {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        document: Document,
    },

    /// Pattern read
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        documents: Vec<Document>,
    },

    /// Write committed
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        key: String,
        version: u64,
    },

    /// Delete committed
    Deleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        key: String,
        count: usize,
    },

    /// Subscription confirmed, with the documents currently matching
    Subscribed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        pattern: String,
        snapshot: Vec<Document>,
    },

    /// Unsubscription confirmed
    Unsubscribed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        pattern: String,
    },

    /// Committed change on a subscribed key
    Change { event: ChangeEvent },

    /// Clock tick (unix milliseconds)
    Time { now: i64 },

    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Request failed; only the originating session receives it
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: String,
        message: String,
    },
}

/// Decode a text frame into a request.
pub fn decode_request(text: &str) -> RealtimeResult<Request> {
    serde_json::from_str(text).map_err(|e| RealtimeError::InvalidMessage(e.to_string()))
}

/// Encode a request (used by clients and tests).
pub fn encode_request(request: &Request) -> RealtimeResult<String> {
    serde_json::to_string(request).map_err(|e| RealtimeError::Internal(e.to_string()))
}

/// Encode an outbound message into a text frame.
pub fn encode(message: &ServerMessage) -> RealtimeResult<String> {
    serde_json::to_string(message).map_err(|e| RealtimeError::Internal(e.to_string()))
}

/// Decode an outbound message (used by clients and tests).
pub fn decode(text: &str) -> RealtimeResult<ServerMessage> {
    serde_json::from_str(text).map_err(|e| RealtimeError::InvalidMessage(e.to_string()))
}
