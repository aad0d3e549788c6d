//! # Access Filter
//!
//! Pluggable permission check consulted before any read, write, delete or
//! subscription touches state. A rejection aborts the request cleanly: no
//! write, no notification.
//!
//! The policy language is up to the embedder. [`FilterRules`] offers a
//! small pattern-keyed rule table; [`AllowAll`] is the default.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{AccessError, AccessResult};
use crate::keyspace::Pattern;

/// Operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Delete,
    Subscribe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => write!(f, "READ"),
            Operation::Write => write!(f, "WRITE"),
            Operation::Delete => write!(f, "DELETE"),
            Operation::Subscribe => write!(f, "SUBSCRIBE"),
        }
    }
}

/// A request presented to the filter
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub operation: Operation,
    /// Concrete key, or the pattern for subscriptions and glob operations
    pub key: &'a str,
    /// Incoming value for writes
    pub value: Option<&'a Value>,
}

impl<'a> AccessRequest<'a> {
    pub fn new(operation: Operation, key: &'a str) -> Self {
        Self {
            operation,
            key,
            value: None,
        }
    }

    pub fn with_value(mut self, value: &'a Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// Permission collaborator called before state is touched.
pub trait AccessFilter: Send + Sync {
    fn authorize(&self, request: &AccessRequest<'_>) -> AccessResult<()>;
}

/// Filter that accepts everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessFilter for AllowAll {
    fn authorize(&self, _request: &AccessRequest<'_>) -> AccessResult<()> {
        Ok(())
    }
}

type RuleCheck = Box<dyn Fn(&AccessRequest<'_>) -> AccessResult<()> + Send + Sync>;

struct Rule {
    pattern: Pattern,
    operation: Operation,
    check: RuleCheck,
}

/// Ordered rule table keyed by pattern and operation.
///
/// Every rule whose pattern matches the key and whose operation matches
/// the request runs; the first rejection wins. Keys with no matching rule
/// are allowed.
#[derive(Default)]
pub struct FilterRules {
    rules: Vec<Rule>,
}

impl FilterRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom check for `operation` on keys matching `pattern`.
    pub fn rule<F>(mut self, pattern: &str, operation: Operation, check: F) -> AccessResult<Self>
    where
        F: Fn(&AccessRequest<'_>) -> AccessResult<()> + Send + Sync + 'static,
    {
        let pattern =
            Pattern::parse(pattern).map_err(|e| AccessError::InvalidRule(e.to_string()))?;
        self.rules.push(Rule {
            pattern,
            operation,
            check: Box::new(check),
        });
        Ok(self)
    }

    /// Reject `operation` on keys matching `pattern`.
    pub fn deny(self, pattern: &str, operation: Operation) -> AccessResult<Self> {
        self.rule(pattern, operation, |request| {
            Err(AccessError::denied(
                request.operation,
                request.key,
                "rejected by filter rule",
            ))
        })
    }

    /// Reject writes and deletes on keys matching `pattern`.
    pub fn read_only(self, pattern: &str) -> AccessResult<Self> {
        self.deny(pattern, Operation::Write)?
            .deny(pattern, Operation::Delete)
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl AccessFilter for FilterRules {
    fn authorize(&self, request: &AccessRequest<'_>) -> AccessResult<()> {
        self.rules
            .iter()
            .filter(|rule| rule.operation == request.operation && rule.pattern.matches(request.key))
            .try_for_each(|rule| (rule.check)(request))
    }
}

impl fmt::Debug for FilterRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.rules
                    .iter()
                    .map(|rule| (rule.operation, rule.pattern.as_str())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_allow_all() {
        let request = AccessRequest::new(Operation::Delete, "anything");
        assert!(AllowAll.authorize(&request).is_ok());
    }

    #[test]
    fn test_read_only_rule() {
        let rules = FilterRules::new().read_only("config/*").unwrap();
        assert_eq!(rules.len(), 2);

        let write = AccessRequest::new(Operation::Write, "config/site");
        assert!(matches!(
            rules.authorize(&write),
            Err(AccessError::Denied { .. })
        ));

        let read = AccessRequest::new(Operation::Read, "config/site");
        assert!(rules.authorize(&read).is_ok());

        let elsewhere = AccessRequest::new(Operation::Write, "rooms/1");
        assert!(rules.authorize(&elsewhere).is_ok());
    }

    #[test]
    fn test_custom_rule_sees_value() {
        let rules = FilterRules::new()
            .rule("books/*", Operation::Write, |request| {
                match request.value.and_then(|v| v.get("title")) {
                    Some(_) => Ok(()),
                    None => Err(AccessError::denied(
                        request.operation,
                        request.key,
                        "title required",
                    )),
                }
            })
            .unwrap();

        let good = json!({"title": "Dune"});
        let bad = json!({"author": "Herbert"});
        let ok = AccessRequest::new(Operation::Write, "books/1").with_value(&good);
        let rejected = AccessRequest::new(Operation::Write, "books/1").with_value(&bad);

        assert!(rules.authorize(&ok).is_ok());
        assert!(rules.authorize(&rejected).is_err());
    }

    #[test]
    fn test_subscribe_rule_matches_pattern_text() {
        let rules = FilterRules::new().deny("private/**", Operation::Subscribe).unwrap();
        let request = AccessRequest::new(Operation::Subscribe, "private/*");
        assert!(rules.authorize(&request).is_err());
    }

    #[test]
    fn test_invalid_rule_pattern() {
        assert!(matches!(
            FilterRules::new().deny("a//b", Operation::Read),
            Err(AccessError::InvalidRule(_))
        ));
    }
}
