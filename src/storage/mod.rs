//! Document storage subsystem
//!
//! Holds the canonical state of every key: an in-memory map of versioned
//! documents with per-key critical sections, optionally backed by an
//! append-only, checksummed journal.
//!
//! # Design Principles
//!
//! - One exclusive section per key; no global lock
//! - Journal append happens before a mutation becomes visible
//! - Versions strictly increase per key, deletes included
//! - Checksums on every journal record; corruption aborts replay

mod checksum;
mod document;
mod errors;
mod journal;
pub mod patch;
mod record;
mod store;

pub use checksum::compute_checksum;
pub use document::Document;
pub use errors::{Severity, StorageError, StorageErrorCode, StorageResult};
pub use journal::{Journal, JournalSink, JOURNAL_FILE};
pub use record::{JournalOp, JournalRecord};
pub use store::{KeySlot, KeyStore};
