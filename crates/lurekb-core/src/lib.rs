//! lurekb Core Library
//!
//! This crate provides the core functionality for lurekb, a versioned
//! fishing-knowledge store:
//! - Schema registry (categories, field templates, merge policies)
//! - Knowledge store (create/merge, feedback, verification, audit, backups)
//! - Version ledger (append-only per-item history)
//! - Storage (whole-document JSON with optimistic concurrency)
//! - Retrieval (keyword, semantic and hybrid search)

pub mod config;
pub mod error;
pub mod knowledge;
pub mod ledger;
pub mod retrieval;
pub mod schema;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::knowledge::{
        AddOptions, KnowledgeItem, KnowledgeSource, KnowledgeStatus, KnowledgeStore, MergeOutcome,
    };
    pub use crate::retrieval::{MatchKind, RetrievalEngine, SearchHit};
    pub use crate::schema::{Category, SchemaRegistry};
    pub use crate::storage::{JsonFileRepository, KnowledgeRepository};
}
