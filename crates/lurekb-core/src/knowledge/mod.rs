//! Knowledge store
//!
//! Items, their metadata and lifecycle, and the store that creates, merges,
//! verifies and audits them.

mod merge;
pub mod store;
pub mod types;

pub use store::{AddOptions, KnowledgeStore};
pub use types::{
    AuditEntry, BatchFailure, BatchReport, FeedbackOutcome, KnowledgeCollection, KnowledgeData,
    KnowledgeItem, KnowledgeMeta, KnowledgeSource, KnowledgeStats, KnowledgeStatus, MergeAction,
    MergeOutcome,
};
