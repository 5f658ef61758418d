//! Version ledger
//!
//! Append-only history of every accepted versioned mutation. Each record holds a
//! full snapshot of the item's data and metadata at that version, so any past
//! state can be inspected without replaying changes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::knowledge::types::timestamp;
use crate::knowledge::{KnowledgeData, KnowledgeMeta};
use crate::schema::Category;

/// Author recorded when the caller does not name one
pub const DEFAULT_AUTHOR: &str = "system";

/// Snapshot of an item at one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u32,
    /// Item content without `_meta`
    pub data: KnowledgeData,
    pub meta: KnowledgeMeta,
    /// Change note
    #[serde(default)]
    pub changes: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub changed_at: DateTime<Utc>,
    #[serde(default = "default_author")]
    pub changed_by: String,
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_string()
}

/// Per-item version histories keyed by `"<collection key>:<name>"`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionLedger {
    histories: BTreeMap<String, Vec<VersionRecord>>,
}

impl VersionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger key of an item
    pub fn key(category: Category, name: &str) -> String {
        format!("{}:{}", category.collection_key(), name)
    }

    /// Append a record to an item's history
    pub fn record(
        &mut self,
        category: Category,
        data: &KnowledgeData,
        meta: &KnowledgeMeta,
        changes: impl Into<String>,
        changed_by: impl Into<String>,
    ) -> &VersionRecord {
        let history = self
            .histories
            .entry(Self::key(category, &data.name))
            .or_default();
        history.push(VersionRecord {
            version: meta.version,
            data: data.clone(),
            meta: meta.clone(),
            changes: changes.into(),
            changed_at: meta.updated_at,
            changed_by: changed_by.into(),
        });
        &history[history.len() - 1]
    }

    /// History of an item in chronological order
    pub fn history(&self, category: Category, name: &str) -> &[VersionRecord] {
        self.histories
            .get(&Self::key(category, name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Most recent record of an item
    pub fn latest(&self, category: Category, name: &str) -> Option<&VersionRecord> {
        self.history(category, name).last()
    }

    /// Number of items with a history
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// Total number of records across all items
    pub fn record_count(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.histories.keys().map(String::as_str)
    }
}
