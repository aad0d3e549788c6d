//! Compiled key patterns.

use std::fmt;

use super::{
    is_valid_segment, KeyspaceError, KeyspaceResult, RECURSIVE_WILDCARD, SEPARATOR, WILDCARD,
};

/// One compiled pattern segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Matches the identical segment
    Literal(String),
    /// `*`: matches exactly one segment
    Any,
    /// `**`: matches one or more trailing segments
    AnyRecursive,
}

/// A pattern over the key hierarchy, compiled at subscribe time.
///
/// A pattern without wildcards is an exact key subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile a pattern string.
    pub fn parse(source: &str) -> KeyspaceResult<Self> {
        let invalid = |reason: &str| KeyspaceError::InvalidPattern {
            pattern: source.to_string(),
            reason: reason.to_string(),
        };

        if source.is_empty() {
            return Err(invalid("empty pattern"));
        }

        let parts: Vec<&str> = source.split(SEPARATOR).collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());

        for (position, part) in parts.iter().enumerate() {
            let segment = match *part {
                "" => return Err(invalid("empty segment")),
                WILDCARD => Segment::Any,
                RECURSIVE_WILDCARD if position == last => Segment::AnyRecursive,
                RECURSIVE_WILDCARD => return Err(invalid("'**' is only allowed as the last segment")),
                literal if is_valid_segment(literal) => Segment::Literal(literal.to_string()),
                _ => return Err(invalid("wildcards must span a whole segment")),
            };
            segments.push(segment);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The pattern as written by the client
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Compiled segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True when the pattern contains no wildcard
    pub fn is_exact(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    /// Check whether a concrete key matches this pattern.
    pub fn matches(&self, key: &str) -> bool {
        let parts: Vec<&str> = key.split(SEPARATOR).collect();

        for (position, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::AnyRecursive => return parts.len() > position,
                Segment::Any => {
                    if position >= parts.len() {
                        return false;
                    }
                }
                Segment::Literal(literal) => {
                    if parts.get(position) != Some(&literal.as_str()) {
                        return false;
                    }
                }
            }
        }

        parts.len() == self.segments.len()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
