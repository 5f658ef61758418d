//! Retrieval engine
//!
//! - `keyword`: substring scoring, always available
//! - `document`: canonical item text used for embeddings
//! - `embedder`: embedding backends
//! - `index`: persisted embedding index
//! - `engine`: keyword, semantic and hybrid search

pub mod document;
pub mod embedder;
pub mod engine;
pub mod index;
pub mod keyword;

pub use embedder::{DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL, Embedder, HttpEmbedder};
pub use engine::{HybridConfig, IndexReport, MatchKind, RetrievalEngine, SearchHit, fuse};
pub use index::{IndexEntry, SemanticIndex, cosine_similarity};
pub use keyword::{keyword_rank, keyword_score};
