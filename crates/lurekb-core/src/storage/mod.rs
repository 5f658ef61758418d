//! Storage layer - whole-document JSON persistence
//!
//! The knowledge store persists through the [`KnowledgeRepository`] trait. Two
//! backends are provided:
//!
//! - `json_file`: knowledge and ledger documents on disk, written via temp file
//!   and rename, with optimistic detection of concurrent writers
//! - `memory`: in-process documents for tests and embedding
//!
//! # Usage
//!
//! ```ignore
//! use lurekb_core::storage::JsonFileRepository;
//!
//! let repository = JsonFileRepository::in_dir("./data");
//! let state = repository.load().await?;
//! ```

pub mod json_file;
pub mod memory;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::knowledge::KnowledgeCollection;
use crate::ledger::VersionLedger;
use crate::schema::Category;

pub use json_file::JsonFileRepository;
pub use memory::InMemoryRepository;

/// Default knowledge document file name
pub const KNOWLEDGE_FILE: &str = "knowledge.json";

/// Default ledger document file name
pub const LEDGER_FILE: &str = "knowledge_versions.json";

/// Default semantic index file name
pub const INDEX_FILE: &str = "knowledge_index.json";

/// Documents read from a repository
#[derive(Debug, Clone, Default)]
pub struct StoredState {
    pub collection: KnowledgeCollection,
    pub ledger: VersionLedger,
    /// Items that were stored without a `_meta` block
    pub legacy_items: Vec<(Category, String)>,
}

/// Locations of a completed backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupReport {
    pub knowledge_path: PathBuf,
    pub ledger_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for BackupReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Backed up knowledge to {} and history to {}",
            self.knowledge_path.display(),
            self.ledger_path.display()
        )
    }
}

/// Persistence backend for the knowledge store
///
/// Both documents are loaded and saved as a unit.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Load both documents; missing documents load as empty
    async fn load(&self) -> Result<StoredState>;

    /// Replace both documents
    ///
    /// Fails with [`Error::StaleSnapshot`] if a document changed since it was
    /// last loaded or saved through this repository.
    async fn save(&self, collection: &KnowledgeCollection, ledger: &VersionLedger) -> Result<()>;

    /// Write timestamped copies of both documents without touching live data
    async fn backup(
        &self,
        collection: &KnowledgeCollection,
        ledger: &VersionLedger,
    ) -> Result<BackupReport>;

    /// Human-readable location of the documents
    fn describe(&self) -> String;
}

/// SHA-256 revision of a document
pub fn revision(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Items in a raw knowledge document that carry no `_meta` block
pub(crate) fn legacy_items(document: &serde_json::Value) -> Vec<(Category, String)> {
    let Some(categories) = document.as_object() else {
        return Vec::new();
    };

    let mut legacy = Vec::new();
    for (key, items) in categories {
        let (Ok(category), Some(items)) = (key.parse::<Category>(), items.as_array()) else {
            continue;
        };
        for item in items {
            if item.get("_meta").is_none() {
                if let Some(name) = item.get("name").and_then(|n| n.as_str()) {
                    legacy.push((category, name.to_string()));
                }
            }
        }
    }
    legacy
}

/// Write `bytes` to `path` through a sibling temp file and a rename
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| Error::persistence(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&temp_path, bytes).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(Error::persistence(path, e));
    }
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(Error::persistence(path, e));
    }
    Ok(())
}

/// Read a file, `None` if it does not exist
pub(crate) async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::persistence(path, e)),
    }
}
