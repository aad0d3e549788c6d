//! # Patch Engine
//!
//! Structural merge of a partial document into a stored one:
//!
//! - object fields merge recursively, key by key
//! - a field set to `null` is removed from the result
//! - scalars and arrays replace the stored field wholesale
//! - with no stored document the partial is taken as the full document
//!
//! `merge` is pure: no I/O, no clock, same output for the same inputs.

use serde_json::{Map, Value};

/// Merge `incoming` into `existing`, returning the new document value.
pub fn merge(existing: Option<&Value>, incoming: &Value) -> Value {
    let mut result = existing.cloned().unwrap_or(Value::Null);
    merge_into(&mut result, incoming);
    result
}

fn merge_into(target: &mut Value, incoming: &Value) {
    let Value::Object(fields) = incoming else {
        *target = incoming.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(existing) = target {
        for (name, value) in fields {
            if value.is_null() {
                existing.remove(name);
            } else {
                merge_into(existing.entry(name.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_adds_and_overwrites_fields() {
        let stored = json!({"a": 1, "c": 3});
        let merged = merge(Some(&stored), &json!({"a": 2, "b": 2}));
        assert_eq!(merged, json!({"a": 2, "b": 2, "c": 3}));
    }

    #[test]
    fn test_merge_recurses_into_objects() {
        let stored = json!({"profile": {"name": "ada", "age": 36}, "tags": ["x"]});
        let merged = merge(Some(&stored), &json!({"profile": {"age": 37}}));
        assert_eq!(
            merged,
            json!({"profile": {"name": "ada", "age": 37}, "tags": ["x"]})
        );
    }

    #[test]
    fn test_null_removes_field() {
        let stored = json!({"a": 1, "nested": {"keep": true, "drop": 1}});
        let merged = merge(Some(&stored), &json!({"a": null, "nested": {"drop": null}}));
        assert_eq!(merged, json!({"nested": {"keep": true}}));
    }

    #[test]
    fn test_arrays_replace_wholesale() {
        let stored = json!({"items": [1, 2, 3]});
        let merged = merge(Some(&stored), &json!({"items": [9]}));
        assert_eq!(merged, json!({"items": [9]}));
    }

    #[test]
    fn test_absent_base_strips_remove_markers() {
        let merged = merge(None, &json!({"a": 1, "gone": null, "n": {"x": null, "y": 2}}));
        assert_eq!(merged, json!({"a": 1, "n": {"y": 2}}));
    }

    #[test]
    fn test_scalar_incoming_replaces_document() {
        let stored = json!({"a": 1});
        assert_eq!(merge(Some(&stored), &json!("text")), json!("text"));
        assert_eq!(merge(Some(&json!(5)), &json!({"a": 1})), json!({"a": 1}));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let stored = json!({"a": 1, "n": {"x": 1}, "list": [1]});
        let partial = json!({"b": 2, "n": {"y": 2}, "list": [2, 3], "a": null});
        let once = merge(Some(&stored), &partial);
        let twice = merge(Some(&once), &partial);
        assert_eq!(once, twice);
    }
}
