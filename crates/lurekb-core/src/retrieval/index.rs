//! Persisted semantic index
//!
//! One entry per indexed item, holding the embedding together with the hash of
//! the document text and the template version it was rendered with. An entry
//! is current while both still match the item.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::Category;
use crate::storage::{read_optional, write_atomic};

/// Stored embedding for an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub category: Category,
    pub name: String,
    /// Preview of the embedded document text
    pub text: String,
    /// Hash of the full document text
    pub text_hash: String,
    pub template_version: u32,
    pub embedding: Vec<f32>,
}

/// Embedding index over the knowledge collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticIndex {
    /// Model that produced the embeddings
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: Vec<IndexEntry>,
}

impl SemanticIndex {
    /// Load an index file; a missing file yields an empty index
    pub async fn load(path: &Path) -> Result<Self> {
        let Some(bytes) = read_optional(path).await? else {
            return Ok(Self::default());
        };
        let index: Self = serde_json::from_slice(&bytes)
            .map_err(|e| Error::persistence(path, format!("invalid index document: {}", e)))?;
        debug!(path = %path.display(), entries = index.entries.len(), "Loaded semantic index");
        Ok(index)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes).await
    }

    pub fn entry(&self, category: Category, name: &str) -> Option<&IndexEntry> {
        self.entries
            .iter()
            .find(|e| e.category == category && e.name == name)
    }

    /// Whether the stored entry was built from this exact text and layout
    pub fn is_current(
        &self,
        category: Category,
        name: &str,
        text_hash: &str,
        template_version: u32,
    ) -> bool {
        self.entry(category, name).is_some_and(|e| {
            e.text_hash == text_hash && e.template_version == template_version
        })
    }

    /// Entries most similar to `query`, at or above `threshold`, best first
    pub fn search(
        &self,
        query: &[f32],
        threshold: f32,
        category: Option<Category>,
        limit: usize,
    ) -> Vec<(&IndexEntry, f32)> {
        let mut results: Vec<(&IndexEntry, f32)> = self
            .entries
            .iter()
            .filter(|e| category.is_none_or(|wanted| wanted == e.category))
            .filter_map(|e| {
                let similarity = cosine_similarity(query, &e.embedding);
                (similarity >= threshold).then_some((e, similarity))
            })
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        results
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
