//! Per-field merge policies

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a field is combined when a candidate is merged into an existing item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Union of both lists, deduplicated by string equality, first-seen order kept
    UnionList,
    /// Keep the old string unless the new one differs and is longer
    PreferLonger,
    /// Take the new value
    Overwrite,
}

impl MergePolicy {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnionList => "union_list",
            Self::PreferLonger => "prefer_longer",
            Self::Overwrite => "overwrite",
        }
    }

    /// Pick a policy from the shapes of the two values.
    ///
    /// Used for fields a category schema does not declare.
    pub fn infer(old: &Value, new: &Value) -> Self {
        match (old, new) {
            (Value::Array(_), Value::Array(_)) => Self::UnionList,
            (Value::String(_), Value::String(_)) => Self::PreferLonger,
            _ => Self::Overwrite,
        }
    }

    /// Combine an old and a new value under this policy.
    ///
    /// A null on either side yields the other value. When the values do not have
    /// the shape the policy expects, the new value wins.
    pub fn apply(&self, old: &Value, new: &Value) -> Value {
        if new.is_null() {
            return old.clone();
        }
        if old.is_null() {
            return new.clone();
        }

        match (self, old, new) {
            (Self::UnionList, Value::Array(old_items), Value::Array(new_items)) => {
                let mut seen: Vec<String> = Vec::with_capacity(old_items.len() + new_items.len());
                let mut merged = Vec::with_capacity(old_items.len() + new_items.len());
                for item in old_items.iter().chain(new_items.iter()) {
                    let key = string_form(item);
                    if !seen.contains(&key) {
                        seen.push(key);
                        merged.push(item.clone());
                    }
                }
                Value::Array(merged)
            }
            (Self::PreferLonger, Value::String(old_text), Value::String(new_text)) => {
                if old_text != new_text && new_text.chars().count() > old_text.chars().count() {
                    new.clone()
                } else {
                    old.clone()
                }
            }
            _ => new.clone(),
        }
    }
}

impl std::fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// String used for list deduplication
fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
