//! # Change Events
//!
//! What the change bus publishes after a committed mutation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::Document;

/// Kind of committed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Key had no live document before this write
    Created,
    /// Existing document replaced or merged
    Updated,
    /// Document removed
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Updated => write!(f, "updated"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A committed mutation of one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub key: String,
    /// Version assigned by the store to this mutation
    pub version: u64,
    /// New value; `null` for deletions
    pub value: Value,
    pub created: i64,
    pub updated: i64,
}

impl ChangeEvent {
    /// Event for a document that was just written
    pub fn written(document: &Document) -> Self {
        let kind = if document.updated == 0 {
            ChangeKind::Created
        } else {
            ChangeKind::Updated
        };

        Self {
            kind,
            key: document.key.clone(),
            version: document.version,
            value: document.value.clone(),
            created: document.created,
            updated: document.updated,
        }
    }

    /// Event for a removed document (as returned by the store's delete)
    pub fn deleted(removed: &Document) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            key: removed.key.clone(),
            version: removed.version,
            value: Value::Null,
            created: removed.created,
            updated: removed.updated,
        }
    }
}
