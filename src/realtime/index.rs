//! # Pattern Index
//!
//! Maps compiled key patterns to the sessions subscribed to them.
//!
//! Patterns are stored in a segment trie: literal segments are hash-map
//! children, `*` is a single wildcard child per node, and sessions whose
//! pattern ends in `**` are parked on the node where the recursive part
//! starts. A lookup walks the key once, following at most the literal and
//! wildcard branch at each depth, so its cost depends on key depth and
//! wildcard fan-out rather than on the number of distinct patterns.
//!
//! The index holds back-references only; session lifetime belongs to the
//! session manager.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::session::SessionId;
use crate::keyspace::{Pattern, Segment, SEPARATOR};

#[derive(Debug, Default)]
struct Node {
    literal: HashMap<String, Node>,
    any: Option<Box<Node>>,
    /// Sessions whose pattern ends exactly at this node
    exact: HashSet<SessionId>,
    /// Sessions whose pattern continues with `**` from this node
    recursive: HashSet<SessionId>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.literal.is_empty()
            && self.any.is_none()
            && self.exact.is_empty()
            && self.recursive.is_empty()
    }

    fn insert(&mut self, segments: &[Segment], session: SessionId) -> bool {
        match segments.split_first() {
            None => self.exact.insert(session),
            Some((Segment::AnyRecursive, _)) => self.recursive.insert(session),
            Some((Segment::Any, rest)) => self
                .any
                .get_or_insert_with(Box::default)
                .insert(rest, session),
            Some((Segment::Literal(literal), rest)) => self
                .literal
                .entry(literal.clone())
                .or_default()
                .insert(rest, session),
        }
    }

    /// Remove and prune empty branches on the way back up.
    fn remove(&mut self, segments: &[Segment], session: SessionId) -> bool {
        match segments.split_first() {
            None => self.exact.remove(&session),
            Some((Segment::AnyRecursive, _)) => self.recursive.remove(&session),
            Some((Segment::Any, rest)) => {
                let Some(child) = self.any.as_mut() else {
                    return false;
                };
                let removed = child.remove(rest, session);
                if child.is_empty() {
                    self.any = None;
                }
                removed
            }
            Some((Segment::Literal(literal), rest)) => {
                let Some(child) = self.literal.get_mut(literal) else {
                    return false;
                };
                let removed = child.remove(rest, session);
                if child.is_empty() {
                    self.literal.remove(literal);
                }
                removed
            }
        }
    }

    fn collect(&self, parts: &[&str], out: &mut HashSet<SessionId>) {
        match parts.split_first() {
            None => out.extend(self.exact.iter().copied()),
            Some((head, rest)) => {
                out.extend(self.recursive.iter().copied());
                if let Some(child) = self.literal.get(*head) {
                    child.collect(rest, out);
                }
                if let Some(child) = &self.any {
                    child.collect(rest, out);
                }
            }
        }
    }
}

/// Read-mostly index from patterns to subscribed sessions.
#[derive(Debug, Default)]
pub struct PatternIndex {
    root: RwLock<Node>,
}

impl PatternIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under `pattern`. Returns false if already present.
    pub fn subscribe(&self, pattern: &Pattern, session: SessionId) -> bool {
        match self.root.write() {
            Ok(mut root) => root.insert(pattern.segments(), session),
            Err(_) => false,
        }
    }

    /// Drop `session` from `pattern`. Returns false if it was not present.
    pub fn unsubscribe(&self, pattern: &Pattern, session: SessionId) -> bool {
        match self.root.write() {
            Ok(mut root) => root.remove(pattern.segments(), session),
            Err(_) => false,
        }
    }

    /// Sessions with at least one pattern matching `key`.
    pub fn matching_sessions(&self, key: &str) -> HashSet<SessionId> {
        let parts: Vec<&str> = key.split(SEPARATOR).collect();
        let mut sessions = HashSet::new();
        if let Ok(root) = self.root.read() {
            root.collect(&parts, &mut sessions);
        }
        sessions
    }

    /// Check if no pattern is registered
    pub fn is_empty(&self) -> bool {
        self.root.read().map(|root| root.is_empty()).unwrap_or(true)
    }
}
