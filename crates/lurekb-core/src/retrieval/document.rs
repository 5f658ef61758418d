//! Canonical document text for embedding
//!
//! Each item is rendered to labelled lines: category, name, aliases, then the
//! declared fields in schema order, then any undeclared fields by key. The
//! rendering is tied to the category's template version so that index entries
//! built from an older layout are refreshed.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::knowledge::KnowledgeData;
use crate::schema::{Category, SchemaRegistry};

/// Characters kept in an index entry's text preview
pub const PREVIEW_CHARS: usize = 500;

/// Render item data to the text that gets embedded
pub fn render_document(registry: &SchemaRegistry, category: Category, data: &KnowledgeData) -> String {
    let mut lines = vec![
        format!("Category: {}", category.label()),
        format!("Name: {}", data.name),
    ];
    if !data.aliases.is_empty() {
        lines.push(format!("Aliases: {}", data.aliases.join(", ")));
    }

    let declared: Vec<&str> = registry
        .schema(category)
        .map(|schema| schema.fields.iter().map(|f| f.name).collect())
        .unwrap_or_default();

    for field in &declared {
        if let Some(text) = data.field(field).and_then(render_value) {
            lines.push(format!("{}: {}", field_label(field), text));
        }
    }
    for (field, value) in &data.fields {
        if declared.contains(&field.as_str()) {
            continue;
        }
        if let Some(text) = render_value(value) {
            lines.push(format!("{}: {}", field_label(field), text));
        }
    }

    lines.join("\n")
}

/// SHA-256 hex digest of a document text
pub fn text_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// First [`PREVIEW_CHARS`] characters of a text
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

fn render_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Array(values) => values
            .iter()
            .filter_map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| render_value(v).map(|v| format!("{} {}", field_label(k), v)))
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// `best_season` -> `Best season`
fn field_label(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
