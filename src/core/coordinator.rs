//! # Write Coordinator
//!
//! Single entry point for reads and writes from every transport.
//!
//! A write runs as: access filter, key and value validation, then one
//! critical section on the key that reads the stored document, computes the
//! new value (replace or merge), journals and commits it, and publishes the
//! change. Publishing inside the section keeps notifications for a key in
//! version order.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{CoreError, CoreResult};
use crate::auth::{AccessFilter, AccessRequest, AllowAll, Operation};
use crate::keyspace::{self, Pattern};
use crate::realtime::{ChangeBus, ChangeEvent, SessionId};
use crate::storage::{patch, Document, KeyStore};

/// Result of a read: one document for a key, a list for a pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReadOutcome {
    Document(Document),
    List(Vec<Document>),
}

/// Coordinates the store, the change bus and the access filter.
pub struct WriteCoordinator {
    store: Arc<KeyStore>,
    bus: Arc<ChangeBus>,
    filter: Arc<dyn AccessFilter>,
    /// Treat full writes as merges
    force_patch: bool,
}

impl WriteCoordinator {
    pub fn new(store: Arc<KeyStore>, bus: Arc<ChangeBus>, force_patch: bool) -> Self {
        Self {
            store,
            bus,
            filter: Arc::new(AllowAll),
            force_patch,
        }
    }

    /// Install an access filter consulted before every operation.
    pub fn with_filter(mut self, filter: Arc<dyn AccessFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    pub fn force_patch(&self) -> bool {
        self.force_patch
    }

    // ==================
    // Reads
    // ==================

    /// Read a key, or every key matching a pattern.
    ///
    /// A pattern read never fails with `NotFound`; documents the filter
    /// refuses are left out of the list.
    pub fn read(&self, key: &str) -> CoreResult<ReadOutcome> {
        if keyspace::is_pattern(key) {
            let pattern = Pattern::parse(key)?;
            self.authorize(AccessRequest::new(Operation::Read, key))?;
            return Ok(ReadOutcome::List(self.readable(&pattern)));
        }

        keyspace::validate_key(key)?;
        self.authorize(AccessRequest::new(Operation::Read, key))?;
        self.store
            .get(key)?
            .map(ReadOutcome::Document)
            .ok_or_else(|| CoreError::not_found(key))
    }

    /// Documents matching `pattern` that the filter lets through, by key.
    pub fn readable(&self, pattern: &Pattern) -> Vec<Document> {
        self.store
            .scan(|key| pattern.matches(key))
            .into_iter()
            .filter(|doc| {
                self.filter
                    .authorize(&AccessRequest::new(Operation::Read, &doc.key))
                    .is_ok()
            })
            .collect()
    }

    /// Number of live documents
    pub fn key_count(&self) -> usize {
        self.store.len()
    }

    // ==================
    // Writes
    // ==================

    /// Full-document write; merged instead when `force_patch` is set.
    pub fn replace(&self, key: &str, value: Value) -> CoreResult<Document> {
        self.write(key, value, self.force_patch)
    }

    /// Partial-document write, always merged into the stored document.
    pub fn patch(&self, key: &str, value: Value) -> CoreResult<Document> {
        self.write(key, value, true)
    }

    fn write(&self, key: &str, value: Value, merge: bool) -> CoreResult<Document> {
        let key = resolve_write_key(key)?;
        if value.is_null() {
            return Err(CoreError::malformed(format!("Null value for {}", key)));
        }
        self.authorize(AccessRequest::new(Operation::Write, &key).with_value(&value))?;

        let document = self.store.transact(&key, |slot| {
            let next = if merge {
                patch::merge(slot.current().map(|doc| &doc.value), &value)
            } else {
                value
            };
            let document = slot.put(next)?;
            self.notify(&ChangeEvent::written(&document));
            Ok(document)
        })?;

        debug!(key = %document.key, version = document.version, merge, "Write committed");
        Ok(document)
    }

    /// Delete a key, or every key matching a pattern. Returns the number of
    /// documents removed.
    ///
    /// For a pattern every matching key is authorized before anything is
    /// removed; each key is then deleted in its own critical section with
    /// its own notification.
    pub fn delete(&self, key: &str) -> CoreResult<usize> {
        if keyspace::is_pattern(key) {
            let pattern = Pattern::parse(key)?;
            let targets = self.store.scan(|candidate| pattern.matches(candidate));
            for doc in &targets {
                self.authorize(AccessRequest::new(Operation::Delete, &doc.key))?;
            }

            let mut deleted = 0;
            for doc in &targets {
                if self.delete_one(&doc.key)? {
                    deleted += 1;
                }
            }
            info!(pattern = %pattern, deleted, "Pattern delete");
            return Ok(deleted);
        }

        keyspace::validate_key(key)?;
        self.authorize(AccessRequest::new(Operation::Delete, key))?;
        if self.delete_one(key)? {
            Ok(1)
        } else {
            Err(CoreError::not_found(key))
        }
    }

    fn delete_one(&self, key: &str) -> CoreResult<bool> {
        let removed = self.store.transact_existing(key, |slot| {
            let removed = slot.delete()?;
            if let Some(doc) = &removed {
                self.notify(&ChangeEvent::deleted(doc));
            }
            Ok(removed)
        })?;

        match removed.flatten() {
            Some(doc) => {
                debug!(key, version = doc.version, "Delete committed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ==================
    // Subscriptions
    // ==================

    /// Subscribe a session and return a snapshot of the documents currently
    /// matching the pattern.
    ///
    /// Changes committed while the snapshot is taken may be delivered both
    /// in the snapshot and as notifications; versions order them.
    pub fn subscribe(&self, session: SessionId, pattern: &str) -> CoreResult<Vec<Document>> {
        self.authorize(AccessRequest::new(Operation::Subscribe, pattern))?;
        let compiled = self.bus.sessions().subscribe(session, pattern)?;
        Ok(self.readable(&compiled))
    }

    pub fn unsubscribe(&self, session: SessionId, pattern: &str) -> CoreResult<()> {
        self.bus.sessions().unsubscribe(session, pattern)?;
        Ok(())
    }

    /// Publish a committed change. Keys the filter refuses to `Read` are
    /// never sent to subscribers, whatever pattern they matched.
    fn notify(&self, event: &ChangeEvent) {
        let visible = self
            .filter
            .authorize(&AccessRequest::new(Operation::Read, &event.key))
            .is_ok();
        if !visible {
            debug!(key = %event.key, version = event.version, "Change withheld by filter");
            return;
        }
        self.bus.publish(event);
    }

    fn authorize(&self, request: AccessRequest<'_>) -> CoreResult<()> {
        self.filter.authorize(&request)?;
        Ok(())
    }
}

/// Key a write lands on: the key itself, or a fresh child for `parent/*`.
fn resolve_write_key(key: &str) -> CoreResult<String> {
    if let Some(parent) = keyspace::push_parent(key) {
        keyspace::validate_key(parent)?;
        return Ok(format!(
            "{}{}{}",
            parent,
            keyspace::SEPARATOR,
            Uuid::new_v4().simple()
        ));
    }
    keyspace::validate_key(key)?;
    Ok(key.to_string())
}
