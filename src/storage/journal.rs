//! Append-only journal backing the key store.
//!
//! Every committed mutation is appended (and fsynced) before it becomes
//! visible in memory. On open the journal is replayed in file order; the
//! last record for a key wins. Any checksum or framing failure aborts the
//! replay.
//!
//! A failed append is rolled back to the previous file length, so the file
//! only ever holds whole, acknowledged records. If the rollback itself
//! fails the journal refuses every later append.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::error;

use super::errors::{StorageError, StorageResult};
use super::record::JournalRecord;

/// File name of the journal inside the data directory
pub const JOURNAL_FILE: &str = "katamari.journal";

/// Destination for committed mutations.
///
/// The store calls `append` inside the key's critical section; an error
/// aborts the mutation and leaves the key unchanged.
pub trait JournalSink: Send + Sync {
    fn append(&self, record: &JournalRecord) -> StorageResult<()>;
}

/// Byte-level operations an append needs from the journal file.
trait JournalFile: Send {
    fn len(&self) -> io::Result<u64>;
    fn append_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl JournalFile for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn append_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(self, bytes)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_data()
    }
}

struct Tail {
    file: Box<dyn JournalFile>,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

/// File-backed journal with fsync after every append.
pub struct Journal {
    path: PathBuf,
    tail: Mutex<Tail>,
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal").field("path", &self.path).finish()
    }
}

impl Journal {
    /// Opens or creates `<data_dir>/katamari.journal`.
    pub fn open(data_dir: &Path) -> StorageResult<Self> {
        if !data_dir.exists() {
            fs::create_dir_all(data_dir).map_err(|e| {
                StorageError::io_error(
                    format!("Failed to create data directory: {}", data_dir.display()),
                    e,
                )
            })?;
        }

        let path = data_dir.join(JOURNAL_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                StorageError::io_error(format!("Failed to open journal: {}", path.display()), e)
            })?;

        Ok(Self::with_file(path, Box::new(file)))
    }

    fn with_file(path: PathBuf, file: Box<dyn JournalFile>) -> Self {
        Self {
            path,
            tail: Mutex::new(Tail {
                file,
                poisoned: false,
            }),
        }
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a failed append left bytes that could not be removed.
    pub fn is_poisoned(&self) -> bool {
        self.tail.lock().map(|tail| tail.poisoned).unwrap_or(true)
    }

    /// Atomically replaces the journal at `<data_dir>/katamari.journal`
    /// with `records`: written to a temporary file, fsynced, then renamed
    /// over the old journal.
    pub fn compact(data_dir: &Path, records: &[JournalRecord]) -> StorageResult<()> {
        let path = data_dir.join(JOURNAL_FILE);
        let tmp = data_dir.join(format!("{}.tmp", JOURNAL_FILE));

        let mut bytes = Vec::new();
        for record in records {
            bytes.extend_from_slice(&record.serialize());
        }

        let write_tmp = || -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        write_tmp().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StorageError::write_failed(format!("Failed to compact journal: {}", path.display()), e)
        })
    }

    /// Reads every record of the journal at `<data_dir>/katamari.journal`.
    ///
    /// A missing file is an empty journal.
    pub fn replay(data_dir: &Path) -> StorageResult<Vec<JournalRecord>> {
        let path = data_dir.join(JOURNAL_FILE);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::read_failed(
                    format!("Failed to read journal: {}", path.display()),
                    e,
                ))
            }
        };

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < data.len() {
            let (record, consumed) = JournalRecord::deserialize(&data[offset..])
                .map_err(|e| StorageError::corruption_at_offset(offset as u64, e.to_string()))?;
            records.push(record);
            offset += consumed;
        }

        Ok(records)
    }
}

impl JournalSink for Journal {
    fn append(&self, record: &JournalRecord) -> StorageResult<()> {
        let bytes = record.serialize();
        let mut tail = self
            .tail
            .lock()
            .map_err(|_| StorageError::write_failed_no_source("Journal lock poisoned"))?;

        if tail.poisoned {
            return Err(StorageError::write_failed_no_source(format!(
                "Journal unusable after a failed rollback: {}",
                self.path.display()
            )));
        }

        let prev_len = tail.file.len().map_err(|e| {
            StorageError::io_error(format!("Failed to stat journal: {}", self.path.display()), e)
        })?;

        let written = match tail.file.append_bytes(&bytes) {
            Ok(()) => tail
                .file
                .sync()
                .map_err(|e| (e, "fsync failed after appending record for")),
            Err(e) => Err((e, "Failed to append record for")),
        };

        match written {
            Ok(()) => Ok(()),
            Err((cause, context)) => {
                if let Err(e) = tail.file.truncate(prev_len) {
                    tail.poisoned = true;
                    error!(
                        path = %self.path.display(),
                        error = %e,
                        "Journal rollback failed; refusing further appends"
                    );
                }
                Err(StorageError::write_failed(
                    format!("{}: {}", context, record.key),
                    cause,
                ))
            }
        }
    }
}
