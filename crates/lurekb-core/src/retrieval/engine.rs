//! Retrieval engine
//!
//! Combines keyword scoring over the live collection with cosine similarity
//! over the semantic index. Keyword search always works; semantic search needs
//! an embedding backend, and hybrid search falls back to keyword results when
//! the backend is missing or failing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::document::{preview, render_document, text_hash};
use super::embedder::Embedder;
use super::index::{IndexEntry, SemanticIndex};
use super::keyword::keyword_rank;
use crate::error::{Error, Result};
use crate::knowledge::{KnowledgeItem, KnowledgeStore};
use crate::ledger::VersionLedger;
use crate::schema::Category;

/// How a search hit was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Semantic,
    Keyword,
    /// Found by both
    Hybrid,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub category: Category,
    pub item: KnowledgeItem,
    pub score: f64,
    pub kind: MatchKind,
}

impl SearchHit {
    fn key(&self) -> String {
        VersionLedger::key(self.category, self.item.name())
    }
}

/// Configuration for hybrid ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Weight of the semantic score; keyword gets the remainder
    pub semantic_weight: f64,
    /// Minimum cosine similarity for a semantic hit
    pub similarity_threshold: f32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            similarity_threshold: 0.3,
        }
    }
}

/// Result of an index build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub indexed: usize,
    /// Unchanged since the last build
    pub skipped: usize,
    pub failed: usize,
    /// Entries in the index after the build
    pub total: usize,
}

impl std::fmt::Display for IndexReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Indexed {} items ({} unchanged, {} failed), {} entries total",
            self.indexed, self.skipped, self.failed, self.total
        )
    }
}

/// Fuse semantic and keyword hits into one ranking.
///
/// Scores are weighted and summed per item; items found by both are tagged
/// [`MatchKind::Hybrid`].
pub fn fuse(
    semantic: Vec<SearchHit>,
    keyword: Vec<SearchHit>,
    semantic_weight: f64,
    top_k: usize,
) -> Vec<SearchHit> {
    let keyword_weight = 1.0 - semantic_weight;
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<SearchHit> = Vec::with_capacity(semantic.len() + keyword.len());

    for mut hit in semantic {
        hit.score *= semantic_weight;
        hit.kind = MatchKind::Semantic;
        positions.insert(hit.key(), fused.len());
        fused.push(hit);
    }

    for mut hit in keyword {
        let weighted = hit.score * keyword_weight;
        match positions.get(&hit.key()) {
            Some(&index) => {
                fused[index].score += weighted;
                fused[index].kind = MatchKind::Hybrid;
            }
            None => {
                hit.score = weighted;
                hit.kind = MatchKind::Keyword;
                positions.insert(hit.key(), fused.len());
                fused.push(hit);
            }
        }
    }

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(top_k);
    fused
}

/// Keyword, semantic and hybrid search over a knowledge store
pub struct RetrievalEngine {
    store: Arc<KnowledgeStore>,
    embedder: Option<Arc<dyn Embedder>>,
    config: HybridConfig,
    index: RwLock<SemanticIndex>,
    index_path: Option<PathBuf>,
    build_lock: Mutex<()>,
}

impl RetrievalEngine {
    /// Create an engine with keyword search only and an in-memory index
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            store,
            embedder: None,
            config: HybridConfig::default(),
            index: RwLock::new(SemanticIndex::default()),
            index_path: None,
            build_lock: Mutex::new(()),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_config(mut self, config: HybridConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist the index at `path`, loading whatever is already there
    pub async fn with_index_path(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        *self.index.get_mut() = SemanticIndex::load(&path).await?;
        self.index_path = Some(path);
        Ok(self)
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// Whether an embedding backend is configured
    pub fn is_semantic_available(&self) -> bool {
        self.embedder.is_some()
    }

    /// Number of entries in the semantic index
    pub async fn index_len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Keyword search over the live collection
    pub async fn keyword_search(
        &self,
        query: &str,
        category: Option<Category>,
        top_k: usize,
    ) -> Vec<SearchHit> {
        let collection = self.store.snapshot().await;
        let hits = keyword_rank(&collection, query, category, top_k);
        debug!(query = %query, results = hits.len(), "Keyword search completed");
        hits
    }

    /// Semantic search; builds the index on first use if it is empty
    pub async fn semantic_search(
        &self,
        query: &str,
        category: Option<Category>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let embedder = self.require_embedder()?;
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        if self.index.read().await.is_empty() {
            self.rebuild_index(false).await?;
        }

        let query_embedding = embedder.embed(query).await?;

        let matches: Vec<(Category, String, f32)> = {
            let index = self.index.read().await;
            index
                .search(
                    &query_embedding,
                    self.config.similarity_threshold,
                    category,
                    top_k,
                )
                .into_iter()
                .map(|(entry, similarity)| (entry.category, entry.name.clone(), similarity))
                .collect()
        };

        let collection = self.store.snapshot().await;
        let hits: Vec<SearchHit> = matches
            .into_iter()
            .filter_map(|(category, name, similarity)| {
                collection.get(category, &name).map(|item| SearchHit {
                    category,
                    item: item.clone(),
                    score: similarity as f64,
                    kind: MatchKind::Semantic,
                })
            })
            .collect();

        debug!(query = %query, results = hits.len(), "Semantic search completed");
        Ok(hits)
    }

    /// Hybrid search
    ///
    /// Any failure of the semantic leg, a missing backend included, degrades
    /// the query to keyword hits weighted as they would be in a fused ranking.
    pub async fn hybrid_search(
        &self,
        query: &str,
        category: Option<Category>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let candidates = top_k.saturating_mul(2);
        let keyword = self.keyword_search(query, category, candidates).await;

        let semantic = match self.semantic_search(query, category, candidates).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(code = e.code(), error = %e, "Semantic search failed, using keyword results");
                Vec::new()
            }
        };

        let hits = fuse(semantic, keyword, self.config.semantic_weight, top_k);
        debug!(query = %query, results = hits.len(), "Hybrid search completed");
        Ok(hits)
    }

    /// Embed items whose document text or template changed since the last
    /// build, or every item when `force` is set
    pub async fn rebuild_index(&self, force: bool) -> Result<IndexReport> {
        let embedder = self.require_embedder()?;
        let _build = self.build_lock.lock().await;

        let collection = self.store.snapshot().await;
        let registry = self.store.registry();
        let previous = self.index.read().await.clone();
        let same_model = previous.model.as_deref() == Some(embedder.model());

        let mut report = IndexReport::default();
        let mut entries = Vec::with_capacity(collection.len());

        for (category, item) in collection.iter() {
            let text = render_document(registry, category, &item.data);
            let hash = text_hash(&text);
            let template_version = registry.template_version(category);

            if !force
                && same_model
                && previous.is_current(category, item.name(), &hash, template_version)
            {
                if let Some(existing) = previous.entry(category, item.name()) {
                    entries.push(existing.clone());
                    report.skipped += 1;
                    continue;
                }
            }

            match embedder.embed(&text).await {
                Ok(embedding) => {
                    entries.push(IndexEntry {
                        category,
                        name: item.name().to_string(),
                        text: preview(&text),
                        text_hash: hash,
                        template_version,
                        embedding,
                    });
                    report.indexed += 1;
                }
                Err(e) => {
                    warn!(category = %category, name = %item.name(), error = %e, "Failed to embed item");
                    report.failed += 1;
                }
            }
        }

        let index = SemanticIndex {
            model: Some(embedder.model().to_string()),
            updated_at: Some(Utc::now()),
            entries,
        };
        report.total = index.len();

        if let Some(path) = &self.index_path {
            index.save(path).await?;
        }
        *self.index.write().await = index;

        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            failed = report.failed,
            "Rebuilt semantic index"
        );
        Ok(report)
    }

    fn require_embedder(&self) -> Result<&Arc<dyn Embedder>> {
        self.embedder
            .as_ref()
            .ok_or_else(|| Error::BackendUnavailable("no embedding backend configured".to_string()))
    }
}
