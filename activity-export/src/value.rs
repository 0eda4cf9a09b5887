//! Defensive access into schema-less API payloads.
//!
//! Upstream payloads vary in which optional fields are present, and the same
//! field may come back as a string, a number or null depending on the
//! instance version. Every accessor here returns an option or a caller
//! supplied default instead of failing.

use serde_json::{Map, Value};
use tracing::warn;

pub trait Lookup {
    /// The value under `key` when `self` is an object and the value is not null.
    fn field(&self, key: &str) -> Option<&Value>;

    /// Walk a chain of object keys. Any missing key, null or non-object along
    /// the way yields `None`.
    fn path(&self, keys: &[&str]) -> Option<&Value>;

    fn opt_str(&self, key: &str) -> Option<String> {
        self.field(key).and_then(scalar_string).filter(|s| !s.is_empty())
    }

    fn str_or(&self, key: &str, default: &str) -> String {
        self.opt_str(key).unwrap_or_else(|| default.to_owned())
    }

    fn path_str_or(&self, keys: &[&str], default: &str) -> String {
        self.path(keys)
            .and_then(scalar_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default.to_owned())
    }

    fn opt_i64(&self, key: &str) -> Option<i64> {
        self.field(key).and_then(as_i64)
    }

    fn i64_or(&self, key: &str, default: i64) -> i64 {
        self.opt_i64(key).unwrap_or(default)
    }

    fn path_i64_or(&self, keys: &[&str], default: i64) -> i64 {
        self.path(keys).and_then(as_i64).unwrap_or(default)
    }

    fn opt_f64(&self, key: &str) -> Option<f64> {
        self.field(key).and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    fn flag(&self, key: &str) -> bool {
        self.field(key).map(truthy).unwrap_or(false)
    }
}

impl Lookup for Value {
    fn field(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key).filter(|v| !v.is_null())
    }

    fn path(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().try_fold(self, |current, key| current.field(key))
    }
}

impl Lookup for Map<String, Value> {
    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|v| !v.is_null())
    }

    fn path(&self, keys: &[&str]) -> Option<&Value> {
        let (first, rest) = keys.split_first()?;
        self.field(first)?.path(rest)
    }
}

/// Render a scalar the way it should appear in a text column. Containers are
/// rendered as compact JSON, null as nothing.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose truthiness: null, false, zero and empty strings or containers are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Cut a string to at most `max` characters, for logging samples.
pub fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Parse a JSON object embedded in a string field. Some instances hand back
/// python-repr style text (single quotes, `None`, `True`), which is repaired
/// before parsing. Anything unparsable is logged and becomes an empty map.
pub fn parse_embedded_json(raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }

    let repaired = raw
        .replace('\'', "\"")
        .replace("None", "null")
        .replace("True", "true")
        .replace("False", "false");

    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(
                "Embedded metadata is not a json object: {}...",
                truncate(raw, 50)
            );
            Map::new()
        }
        Err(e) => {
            warn!("Invalid JSON in embedded metadata - {e}");
            warn!("Problematic metadata string: {}...", truncate(raw, 50));
            Map::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_field_access_tolerates_wrong_shapes() {
        let event = json!({"author": {"id": 7, "username": "ana"}, "tags": [1, 2], "gone": null});

        assert_eq!(event.path_i64_or(&["author", "id"], -1), 7);
        assert_eq!(event.path_str_or(&["author", "username"], ""), "ana");
        assert_eq!(event.path_i64_or(&["assignee", "id"], -1), -1);
        assert_eq!(event.path_str_or(&["tags", "0"], "none"), "none");
        assert_eq!(event.str_or("gone", "default"), "default");
        assert_eq!(json!([1, 2]).str_or("anything", "x"), "x");
        assert!(json!("scalar").path(&["a"]).is_none());
    }

    #[test]
    fn test_numbers_and_strings_interchange() {
        let event = json!({"id": "42", "iid": 3, "duration": 12.5, "sha": 99});

        assert_eq!(event.i64_or("id", -1), 42);
        assert_eq!(event.i64_or("iid", -1), 3);
        assert_eq!(event.opt_f64("duration"), Some(12.5));
        assert_eq!(event.str_or("sha", ""), "99");
        assert_eq!(event.opt_str("missing"), None);
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!("x")));
        assert!(truthy(&json!({"a": 1})));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("héllo wörld", 4), "héll");
        assert_eq!(truncate("abc", 50), "abc");
    }

    #[test]
    fn test_parse_embedded_json_repairs_python_repr() {
        let map = parse_embedded_json("{'owner': 'platform', 'archived': False, 'tier': None}");
        assert_eq!(map.get("owner"), Some(&json!("platform")));
        assert_eq!(map.get("archived"), Some(&json!(false)));
        assert_eq!(map.get("tier"), Some(&json!(null)));
    }

    #[test]
    fn test_parse_embedded_json_defaults_on_garbage() {
        assert!(parse_embedded_json("{not json at all").is_empty());
        assert!(parse_embedded_json("[1, 2]").is_empty());
        assert!(parse_embedded_json("").is_empty());
    }
}
