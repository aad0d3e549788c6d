//! # Key Store
//!
//! Key → versioned document map with one exclusive critical section per
//! key. Slots live in a sharded map (`DashMap`); a shard lock is only held
//! long enough to fetch the slot's `Arc`, so a slow write to one key never
//! blocks other keys.
//!
//! A slot outlives deletion of its document and keeps the last version, so
//! a key that is deleted and recreated continues its version sequence.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info};

use super::document::{now_millis, Document};
use super::errors::{StorageError, StorageResult};
use super::journal::{Journal, JournalSink};
use super::record::{JournalOp, JournalRecord};

#[derive(Debug, Default)]
struct Slot {
    document: Option<Document>,
    /// Last assigned version, kept across deletes
    version: u64,
}

/// Exclusive access to one key for the duration of a [`KeyStore::transact`]
/// closure.
pub struct KeySlot<'a> {
    key: &'a str,
    slot: &'a mut Slot,
    journal: Option<&'a dyn JournalSink>,
}

impl<'a> KeySlot<'a> {
    /// Key this slot guards
    pub fn key(&self) -> &str {
        self.key
    }

    /// Live document, if any
    pub fn current(&self) -> Option<&Document> {
        self.slot.document.as_ref()
    }

    /// Last version assigned to this key (including deletes)
    pub fn version(&self) -> u64 {
        self.slot.version
    }

    /// Create or fully replace the document, bumping the version.
    pub fn put(&mut self, value: Value) -> StorageResult<Document> {
        let now = now_millis();
        let (created, updated) = match &self.slot.document {
            Some(existing) => (existing.created, now),
            None => (now, 0),
        };

        let document = Document {
            key: self.key.to_string(),
            value,
            version: self.slot.version + 1,
            created,
            updated,
        };

        if let Some(journal) = self.journal {
            let record = JournalRecord::put(&document).map_err(|e| {
                StorageError::write_failed_no_source(format!(
                    "Failed to encode value for {}: {}",
                    self.key, e
                ))
            })?;
            journal.append(&record)?;
        }

        self.slot.version = document.version;
        self.slot.document = Some(document.clone());
        Ok(document)
    }

    /// Remove the document if present.
    ///
    /// Returns the removed document stamped with the deletion's version and
    /// time, or `None` when the key held no document.
    pub fn delete(&mut self) -> StorageResult<Option<Document>> {
        if self.slot.document.is_none() {
            return Ok(None);
        }

        let version = self.slot.version + 1;
        let now = now_millis();

        if let Some(journal) = self.journal {
            journal.append(&JournalRecord::delete(self.key, version, now))?;
        }

        self.slot.version = version;
        Ok(self.slot.document.take().map(|removed| Document {
            version,
            updated: now,
            ..removed
        }))
    }
}

/// In-memory key store, optionally journaled to disk.
pub struct KeyStore {
    slots: DashMap<String, Arc<RwLock<Slot>>>,
    journal: Option<Arc<dyn JournalSink>>,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore {
    /// Create an empty, purely in-memory store
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            journal: None,
        }
    }

    /// Open a journaled store under `data_dir`, replaying existing records.
    ///
    /// After replay the journal is rewritten with one record per key when
    /// that makes it shorter. Deleted keys keep a delete record so their
    /// version sequence survives the rewrite.
    pub fn open(data_dir: &std::path::Path) -> StorageResult<Self> {
        let records = Journal::replay(data_dir)?;
        let mut store = Self::new();

        let replayed = records.len();
        for record in records {
            store.apply(record)?;
        }

        if store.slots.len() < replayed {
            let compacted = store.snapshot_records()?;
            Journal::compact(data_dir, &compacted)?;
            info!(
                data_dir = %data_dir.display(),
                before = replayed,
                after = compacted.len(),
                "Journal compacted"
            );
        }
        store.journal = Some(Arc::new(Journal::open(data_dir)?));

        info!(
            data_dir = %data_dir.display(),
            records = replayed,
            keys = store.len(),
            "Journal replayed"
        );
        Ok(store)
    }

    /// One record per slot: a put for live documents, a delete carrying the
    /// last version for tombstones. Sorted by key.
    fn snapshot_records(&self) -> StorageResult<Vec<JournalRecord>> {
        let mut records = Vec::with_capacity(self.slots.len());
        for entry in self.slots.iter() {
            let slot = entry
                .value()
                .read()
                .map_err(|_| StorageError::lock_poisoned(entry.key()))?;
            let record = match &slot.document {
                Some(document) => JournalRecord::put(document).map_err(|e| {
                    StorageError::write_failed_no_source(format!(
                        "Failed to encode value for {}: {}",
                        entry.key(),
                        e
                    ))
                })?,
                None => JournalRecord::delete(entry.key(), slot.version, 0),
            };
            records.push(record);
        }
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    /// Create an empty store writing to a custom journal sink
    pub fn with_journal(journal: Arc<dyn JournalSink>) -> Self {
        Self {
            slots: DashMap::new(),
            journal: Some(journal),
        }
    }

    fn apply(&self, record: JournalRecord) -> StorageResult<()> {
        let slot = self.slot(&record.key);
        let mut slot = slot
            .write()
            .map_err(|_| StorageError::lock_poisoned(&record.key))?;

        slot.version = record.version;
        slot.document = match record.op {
            JournalOp::Put => {
                let value = serde_json::from_slice(&record.value).map_err(|e| {
                    StorageError::corruption_at_offset(
                        0,
                        format!("Undecodable value for {}: {}", record.key, e),
                    )
                })?;
                Some(Document {
                    key: record.key,
                    value,
                    version: record.version,
                    created: record.created,
                    updated: record.updated,
                })
            }
            JournalOp::Delete => None,
        };
        Ok(())
    }

    fn slot(&self, key: &str) -> Arc<RwLock<Slot>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.slots.entry(key.to_string()).or_default().value())
    }

    /// Run `f` inside the key's exclusive critical section.
    ///
    /// Every read-compute-write sequence on a key must go through here so
    /// concurrent writers never skip or repeat a version.
    pub fn transact<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut KeySlot<'_>) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let slot = self.slot(key);
        let mut guard = slot.write().map_err(|_| StorageError::lock_poisoned(key))?;
        let mut key_slot = KeySlot {
            key,
            slot: &mut *guard,
            journal: self.journal.as_deref(),
        };
        f(&mut key_slot)
    }

    /// Like [`transact`](Self::transact), but only for keys the store has
    /// seen; returns `None` without creating a slot otherwise.
    pub fn transact_existing<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut KeySlot<'_>) -> StorageResult<R>,
    ) -> StorageResult<Option<R>> {
        if !self.slots.contains_key(key) {
            return Ok(None);
        }
        self.transact(key, f).map(Some)
    }

    /// Read the live document under `key`.
    pub fn get(&self, key: &str) -> StorageResult<Option<Document>> {
        let Some(slot) = self.slots.get(key).map(|slot| Arc::clone(slot.value())) else {
            return Ok(None);
        };
        let guard = slot.read().map_err(|_| StorageError::lock_poisoned(key))?;
        Ok(guard.document.clone())
    }

    /// Create or fully replace the document under `key`.
    pub fn put(&self, key: &str, value: Value) -> StorageResult<Document> {
        let document = self.transact(key, |slot| slot.put(value))?;
        debug!(key, version = document.version, "Document stored");
        Ok(document)
    }

    /// Delete the document under `key`; `None` if it was absent.
    pub fn delete(&self, key: &str) -> StorageResult<Option<Document>> {
        self.transact_existing(key, |slot| slot.delete())
            .map(Option::flatten)
    }

    /// Live documents whose key satisfies `filter`, sorted by key.
    pub fn scan(&self, filter: impl Fn(&str) -> bool) -> Vec<Document> {
        let slots: Vec<Arc<RwLock<Slot>>> = self
            .slots
            .iter()
            .filter(|entry| filter(entry.key()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut documents: Vec<Document> = slots
            .iter()
            .filter_map(|slot| slot.read().ok().and_then(|guard| guard.document.clone()))
            .collect();
        documents.sort_by(|a, b| a.key.cmp(&b.key));
        documents
    }

    /// Keys of all live documents, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.scan(|_| true).into_iter().map(|doc| doc.key).collect()
    }

    /// Number of live documents
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .read()
                    .map(|slot| slot.document.is_some())
                    .unwrap_or(false)
            })
            .count()
    }

    /// Check if the store holds no live document
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_get_absent_is_none() {
        let store = KeyStore::new();
        assert_eq!(store.get("missing").unwrap(), None);
        assert_eq!(store.delete("missing").unwrap(), None);
    }

    #[test]
    fn test_put_assigns_increasing_versions() {
        let store = KeyStore::new();
        let first = store.put("box", json!({"name": "a box"})).unwrap();
        assert_eq!(first.version, 1);
        assert!(first.created > 0);
        assert_eq!(first.updated, 0);

        let second = store.put("box", json!({"name": "still a box"})).unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.created, first.created);
        assert!(second.updated > 0);

        assert_eq!(store.get("box").unwrap(), Some(second));
    }

    #[test]
    fn test_delete_keeps_version_sequence() {
        let store = KeyStore::new();
        store.put("box", json!(1)).unwrap();

        let removed = store.delete("box").unwrap().unwrap();
        assert_eq!(removed.version, 2);
        assert_eq!(removed.value, json!(1));
        assert_eq!(store.get("box").unwrap(), None);
        assert_eq!(store.delete("box").unwrap(), None);

        let recreated = store.put("box", json!(2)).unwrap();
        assert_eq!(recreated.version, 3);
        assert_eq!(recreated.updated, 0);
    }

    #[test]
    fn test_scan_and_keys_sorted() {
        let store = KeyStore::new();
        store.put("b", json!(2)).unwrap();
        store.put("a", json!(1)).unwrap();
        store.put("c/1", json!(3)).unwrap();
        store.delete("b").unwrap();

        assert_eq!(store.keys(), vec!["a".to_string(), "c/1".to_string()]);
        let scanned = store.scan(|key| key.starts_with("c/"));
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].key, "c/1");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_journal_replay_restores_documents() {
        let dir = TempDir::new().unwrap();
        {
            let store = KeyStore::open(dir.path()).unwrap();
            store.put("a", json!({"x": 1})).unwrap();
            store.put("a", json!({"x": 2})).unwrap();
            store.put("b", json!("gone")).unwrap();
            store.delete("b").unwrap();
        }

        let reopened = KeyStore::open(dir.path()).unwrap();
        let a = reopened.get("a").unwrap().unwrap();
        assert_eq!(a.value, json!({"x": 2}));
        assert_eq!(a.version, 2);
        assert_eq!(reopened.get("b").unwrap(), None);

        let b = reopened.put("b", json!("back")).unwrap();
        assert_eq!(b.version, 3);
    }

    #[test]
    fn test_open_compacts_journal_to_one_record_per_key() {
        let dir = TempDir::new().unwrap();
        {
            let store = KeyStore::open(dir.path()).unwrap();
            for n in 0..10 {
                store.put("counter", json!(n)).unwrap();
            }
            store.put("gone", json!(true)).unwrap();
            store.delete("gone").unwrap();
        }
        assert_eq!(Journal::replay(dir.path()).unwrap().len(), 12);

        {
            let store = KeyStore::open(dir.path()).unwrap();
            assert_eq!(Journal::replay(dir.path()).unwrap().len(), 2);
            assert_eq!(store.get("counter").unwrap().unwrap().version, 10);
            store.put("counter", json!("after")).unwrap();
        }

        let store = KeyStore::open(dir.path()).unwrap();
        let counter = store.get("counter").unwrap().unwrap();
        assert_eq!(counter.version, 11);
        assert_eq!(counter.value, json!("after"));
        assert_eq!(store.put("gone", json!(1)).unwrap().version, 3);
        assert!(!dir.path().join(format!("{}.tmp", crate::storage::JOURNAL_FILE)).exists());
    }

    struct FlakyJournal {
        fail: AtomicBool,
    }

    impl JournalSink for FlakyJournal {
        fn append(&self, _record: &JournalRecord) -> StorageResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(StorageError::write_failed_no_source("disk unavailable"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_failed_append_leaves_key_unchanged() {
        let journal = Arc::new(FlakyJournal {
            fail: AtomicBool::new(false),
        });
        let store = KeyStore::with_journal(journal.clone());
        store.put("a", json!(1)).unwrap();

        journal.fail.store(true, Ordering::SeqCst);
        assert!(store.put("a", json!(2)).is_err());
        assert!(store.delete("a").is_err());

        let current = store.get("a").unwrap().unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.value, json!(1));
    }
}
