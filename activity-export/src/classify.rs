use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::value::{scalar_string, Lookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Others,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Others => "others",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// `words` match as written. `verbs` also match their past tense, so "remove"
// covers "removed" and "add" covers "added".
fn keyword_rule(words: &str, verbs: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{words}|(?:{verbs})(?:e?d)?)\b"))
        .expect("hard-coded regular expression to be valid")
}

static RULES: Lazy<[(Operation, [Regex; 2]); 3]> = Lazy::new(|| {
    [
        (
            Operation::Create,
            [
                keyword_rule("new|inserted|registered|generate", "add"),
                keyword_rule("generation|generated", "create"),
            ],
        ),
        (
            Operation::Update,
            [
                keyword_rule("modify|modified", "change|edit|alter"),
                keyword_rule("revision|revised", "update"),
            ],
        ),
        (
            Operation::Delete,
            [
                keyword_rule("destroyed|eliminated|dropped|unregister", "remove"),
                keyword_rule("deletion|deregister", "delete"),
            ],
        ),
    ]
});

/// Classify an event as create/update/delete from keyword matches.
///
/// Candidates are checked in three steps, first match wins:
/// the keys of the mapping at `nested_path`, the values of `direct_keys`,
/// then the values found at `nested_path`. Within a step the rule sets are
/// tried in the order create, update, delete.
pub fn classify(event: &Value, direct_keys: &[&str], nested_path: &[&str]) -> Operation {
    let nested = if nested_path.is_empty() {
        None
    } else {
        event.path(nested_path)
    };

    let nested_keys: Vec<String> = match nested {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };
    if let Some(op) = match_any(&nested_keys) {
        return op;
    }

    let direct_values: Vec<String> = direct_keys
        .iter()
        .filter_map(|key| event.field(key))
        .flat_map(candidates)
        .collect();
    if let Some(op) = match_any(&direct_values) {
        return op;
    }

    let nested_values: Vec<String> = nested.map(candidates).unwrap_or_default();
    match_any(&nested_values).unwrap_or(Operation::Others)
}

/// The strings a value contributes: mapping values, sequence items, or the
/// scalar itself.
fn candidates(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map.values().filter_map(scalar_string).collect(),
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other).into_iter().collect(),
    }
}

fn match_any(values: &[String]) -> Option<Operation> {
    let normalized: Vec<String> = values
        .iter()
        .filter(|v| !v.is_empty())
        .map(|v| v.replace('_', " "))
        .collect();
    if normalized.is_empty() {
        return None;
    }
    RULES.iter().find_map(|(op, patterns)| {
        normalized
            .iter()
            .any(|v| patterns.iter().any(|p| p.is_match(v)))
            .then_some(*op)
    })
}
