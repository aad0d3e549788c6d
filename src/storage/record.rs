//! Journal record format
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE)
//! +------------------+
//! | Operation        | (u8: 1 = put, 2 = delete)
//! +------------------+
//! | Version          | (u64 LE)
//! +------------------+
//! | Created          | (i64 LE, unix ms)
//! +------------------+
//! | Updated          | (i64 LE, unix ms)
//! +------------------+
//! | Key              | (length-prefixed string)
//! +------------------+
//! | Value            | (length-prefixed JSON bytes, empty for delete)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Checksum covers all bytes except the checksum itself.

use std::io::{self, Read};

use super::checksum::compute_checksum;
use super::document::Document;

/// len + op + version + created + updated + key len + value len + checksum
pub(crate) const MIN_RECORD_SIZE: usize = 4 + 1 + 8 + 8 + 8 + 4 + 4 + 4;

/// Journaled mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalOp {
    Put,
    Delete,
}

impl JournalOp {
    fn as_byte(self) -> u8 {
        match self {
            JournalOp::Put => 1,
            JournalOp::Delete => 2,
        }
    }

    fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            1 => Ok(JournalOp::Put),
            2 => Ok(JournalOp::Delete),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown journal operation: {}", other),
            )),
        }
    }
}

/// One committed mutation as written to the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub op: JournalOp,
    pub key: String,
    pub version: u64,
    pub created: i64,
    pub updated: i64,
    /// Serialized JSON value (empty for deletes)
    pub value: Vec<u8>,
}

impl JournalRecord {
    /// Record a put of the given document
    pub fn put(document: &Document) -> serde_json::Result<Self> {
        Ok(Self {
            op: JournalOp::Put,
            key: document.key.clone(),
            version: document.version,
            created: document.created,
            updated: document.updated,
            value: serde_json::to_vec(&document.value)?,
        })
    }

    /// Record the deletion of a key at the given version
    pub fn delete(key: &str, version: u64, deleted_at: i64) -> Self {
        Self {
            op: JournalOp::Delete,
            key: key.to_string(),
            version,
            created: 0,
            updated: deleted_at,
            value: Vec::new(),
        }
    }

    fn serialize_body(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MIN_RECORD_SIZE + self.key.len() + self.value.len());

        buf.push(self.op.as_byte());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.created.to_le_bytes());
        buf.extend_from_slice(&self.updated.to_le_bytes());

        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.key.as_bytes());

        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.value);

        buf
    }

    /// Serialize the complete framed record.
    pub fn serialize(&self) -> Vec<u8> {
        let body = self.serialize_body();
        let record_length = (4 + body.len() + 4) as u32;

        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.extend_from_slice(&body);

        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());

        record
    }

    /// Deserialize a record from the front of `data`, verifying its checksum.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Record too short",
            ));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }

        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let mut checksum_bytes = [0u8; 4];
        checksum_bytes.copy_from_slice(&data[checksum_offset..record_length]);
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = compute_checksum(&data[..checksum_offset]);

        if computed_checksum != stored_checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_checksum, stored_checksum
                ),
            ));
        }

        let mut cursor = io::Cursor::new(&data[4..checksum_offset]);

        let mut op = [0u8; 1];
        cursor.read_exact(&mut op)?;
        let op = JournalOp::from_byte(op[0])?;
        let version = u64::from_le_bytes(read_array(&mut cursor)?);
        let created = i64::from_le_bytes(read_array(&mut cursor)?);
        let updated = i64::from_le_bytes(read_array(&mut cursor)?);

        let key = String::from_utf8(read_bytes(&mut cursor)?).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e))
        })?;
        let value = read_bytes(&mut cursor)?;

        Ok((
            Self {
                op,
                key,
                version,
                created,
                updated,
                value,
            },
            record_length,
        ))
    }
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = u32::from_le_bytes(read_array(reader)?) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
