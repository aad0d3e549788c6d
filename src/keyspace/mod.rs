//! # Key Space
//!
//! Keys are hierarchical, `/`-separated paths such as `rooms/1/users`.
//! Patterns use the same shape with two wildcard segments:
//!
//! - `*` matches exactly one segment
//! - `**` (last segment only) matches one or more remaining segments
//!
//! Patterns are compiled once into a [`Pattern`] and matched segment by
//! segment; they are never re-parsed on the publish path.

mod pattern;

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub use pattern::{Pattern, Segment};

/// Hierarchical separator
pub const SEPARATOR: char = '/';

/// Single-segment wildcard
pub const WILDCARD: &str = "*";

/// Trailing recursive wildcard
pub const RECURSIVE_WILDCARD: &str = "**";

/// Result type for key space operations
pub type KeyspaceResult<T> = Result<T, KeyspaceError>;

/// Key and pattern validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyspaceError {
    /// Key is empty or contains invalid segments
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Pattern is malformed
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

fn key_regex() -> &'static Regex {
    static KEY: OnceLock<Regex> = OnceLock::new();
    KEY.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_\-.:@]+(/[A-Za-z0-9_\-.:@]+)*$").expect("key regex compiles")
    })
}

fn segment_regex() -> &'static Regex {
    static SEGMENT: OnceLock<Regex> = OnceLock::new();
    SEGMENT.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-.:@]+$").expect("segment regex compiles"))
}

/// Validate a concrete (wildcard-free) key.
pub fn validate_key(key: &str) -> KeyspaceResult<()> {
    if key_regex().is_match(key) {
        Ok(())
    } else {
        Err(KeyspaceError::InvalidKey(key.to_string()))
    }
}

/// Whether the string contains a wildcard segment.
pub fn is_pattern(key: &str) -> bool {
    key.split(SEPARATOR)
        .any(|segment| segment == WILDCARD || segment == RECURSIVE_WILDCARD)
}

/// Whether the key addresses a push target (`parent/*`).
///
/// Only a single trailing `*` qualifies; any other wildcard makes the key a
/// plain pattern.
pub fn push_parent(key: &str) -> Option<&str> {
    let parent = key.strip_suffix("/*")?;
    if is_pattern(parent) {
        return None;
    }
    Some(parent)
}

pub(crate) fn is_valid_segment(segment: &str) -> bool {
    segment_regex().is_match(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("a").is_ok());
        assert!(validate_key("rooms/1/users").is_ok());
        assert!(validate_key("box-2.v1/item_3").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key("/a").is_err());
        assert!(validate_key("a/").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a/*").is_err());
        assert!(validate_key("a b").is_err());
    }

    #[test]
    fn test_is_pattern() {
        assert!(is_pattern("rooms/*"));
        assert!(is_pattern("rooms/**"));
        assert!(is_pattern("*/users"));
        assert!(!is_pattern("rooms/1"));
        assert!(!is_pattern("rooms/a*b"));
    }

    #[test]
    fn test_push_parent() {
        assert_eq!(push_parent("box/*"), Some("box"));
        assert_eq!(push_parent("a/b/*"), Some("a/b"));
        assert_eq!(push_parent("box"), None);
        assert_eq!(push_parent("*/things/*"), None);
        assert_eq!(push_parent("box/**"), None);
    }
}
