//! Candidate normalisation and field-level merging

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::types::{
    KnowledgeData, KnowledgeMeta, KnowledgeSource, KnowledgeStatus, clamp_confidence, union_tags,
};
use crate::error::{Error, Result};
use crate::schema::{Category, SchemaRegistry};

const RESERVED_FIELDS: &[&str] = &["name", "aliases", "_meta"];

/// Validate a candidate record and turn it into item data.
///
/// `_meta` is ignored, null fields are dropped and aliases are normalised
/// against the trimmed name.
pub(crate) fn candidate_data(
    registry: &SchemaRegistry,
    category: Category,
    record: &Value,
) -> Result<KnowledgeData> {
    registry.check(record, category)?;

    let object = record
        .as_object()
        .ok_or_else(|| Error::validation(category.as_str(), "record must be a JSON object"))?;
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .ok_or_else(|| Error::validation(category.as_str(), "missing required field 'name'"))?;

    let aliases = match object.get("aliases") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(alias)) => vec![alias.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(other) => {
            warn!(name, aliases = %other, "Ignoring malformed aliases");
            Vec::new()
        }
    };

    let mut data = KnowledgeData::new(name).with_aliases(normalize_aliases(name, aliases));
    for (field, value) in object {
        if RESERVED_FIELDS.contains(&field.as_str()) || value.is_null() {
            continue;
        }
        data.fields.insert(field.clone(), value.clone());
    }
    Ok(data)
}

/// Trim, drop blanks and the name itself, dedup ignoring case
pub(crate) fn normalize_aliases(name: &str, aliases: impl IntoIterator<Item = String>) -> Vec<String> {
    let name = name.trim().to_lowercase();
    let mut seen: Vec<String> = Vec::new();
    let mut normalized = Vec::new();
    for alias in aliases {
        let alias = alias.trim();
        let key = alias.to_lowercase();
        if alias.is_empty() || key == name || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        normalized.push(alias.to_string());
    }
    normalized
}

/// Merge incoming data into an existing item, keeping its canonical name
pub(crate) fn merge_data(
    registry: &SchemaRegistry,
    category: Category,
    old: &KnowledgeData,
    new: &KnowledgeData,
) -> KnowledgeData {
    let mut merged = old.clone();
    merged.aliases = normalize_aliases(
        &old.name,
        old.aliases.iter().chain(new.aliases.iter()).cloned(),
    );

    for (field, incoming) in &new.fields {
        let value = match old.fields.get(field) {
            Some(existing) => registry
                .field_policy(category, field, existing, incoming)
                .apply(existing, incoming),
            None => incoming.clone(),
        };
        merged.fields.insert(field.clone(), value);
    }
    merged
}

/// Inputs to a metadata merge
pub(crate) struct MetaUpdate<'a> {
    pub source: KnowledgeSource,
    pub confidence: Option<f64>,
    pub verified: bool,
    pub tags: &'a [String],
    pub changed_by: &'a str,
    pub now: DateTime<Utc>,
}

/// Metadata after merging a candidate into an existing item
pub(crate) fn merge_meta(old: &KnowledgeMeta, update: &MetaUpdate<'_>) -> KnowledgeMeta {
    let incoming = clamp_confidence(
        update
            .confidence
            .unwrap_or_else(|| update.source.default_confidence()),
    );

    let mut meta = old.clone();
    meta.version = old.version + 1;
    meta.parent_version = Some(old.version);
    meta.updated_at = update.now;
    meta.source = update.source;
    meta.confidence = old.confidence.max(incoming);
    meta.status = KnowledgeStatus::Active;
    if update.verified && !old.verified {
        meta.verified = true;
        meta.verified_by = Some(update.changed_by.to_string());
        meta.verified_at = Some(update.now);
    }
    union_tags(&mut meta.tags, update.tags.iter().cloned());
    meta
}
