//! File-backed repository
//!
//! Knowledge and ledger documents are pretty-printed JSON files. Every load and
//! save records the SHA-256 revision of each file; a save is refused when the
//! file on disk no longer has the recorded revision, which means another writer
//! got there first.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    BackupReport, KNOWLEDGE_FILE, KnowledgeRepository, LEDGER_FILE, StoredState, legacy_items,
    read_optional, revision, write_atomic,
};
use crate::error::{Error, Result};
use crate::knowledge::KnowledgeCollection;
use crate::ledger::VersionLedger;

#[derive(Debug, Default)]
struct Revisions {
    knowledge: Option<String>,
    ledger: Option<String>,
}

/// Repository over a knowledge file and a ledger file
#[derive(Debug)]
pub struct JsonFileRepository {
    knowledge_path: PathBuf,
    ledger_path: PathBuf,
    revisions: Mutex<Revisions>,
}

impl JsonFileRepository {
    /// Create a repository over explicit file paths
    pub fn new(knowledge_path: impl Into<PathBuf>, ledger_path: impl Into<PathBuf>) -> Self {
        Self {
            knowledge_path: knowledge_path.into(),
            ledger_path: ledger_path.into(),
            revisions: Mutex::new(Revisions::default()),
        }
    }

    /// Create a repository using the default file names inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(KNOWLEDGE_FILE), dir.join(LEDGER_FILE))
    }

    pub fn knowledge_path(&self) -> &Path {
        &self.knowledge_path
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    async fn ensure_unchanged(&self, path: &Path, recorded: &Option<String>) -> Result<()> {
        let current = read_optional(path).await?.map(|bytes| revision(&bytes));
        if &current != recorded {
            warn!(path = %path.display(), "Document changed on disk since last load");
            return Err(Error::StaleSnapshot {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl KnowledgeRepository for JsonFileRepository {
    async fn load(&self) -> Result<StoredState> {
        let mut revisions = self.revisions.lock().await;
        let mut state = StoredState::default();

        let knowledge_bytes = read_optional(&self.knowledge_path).await?;
        if let Some(bytes) = &knowledge_bytes {
            let document: serde_json::Value = serde_json::from_slice(bytes)
                .map_err(|e| Error::persistence(&self.knowledge_path, e))?;
            state.legacy_items = legacy_items(&document);
            state.collection = serde_json::from_value(document).map_err(|e| {
                Error::persistence(&self.knowledge_path, format!("invalid knowledge document: {}", e))
            })?;
        }

        let ledger_bytes = read_optional(&self.ledger_path).await?;
        if let Some(bytes) = &ledger_bytes {
            state.ledger = serde_json::from_slice(bytes).map_err(|e| {
                Error::persistence(&self.ledger_path, format!("invalid ledger document: {}", e))
            })?;
        }

        revisions.knowledge = knowledge_bytes.as_deref().map(revision);
        revisions.ledger = ledger_bytes.as_deref().map(revision);

        debug!(
            path = %self.knowledge_path.display(),
            items = state.collection.len(),
            histories = state.ledger.len(),
            legacy = state.legacy_items.len(),
            "Loaded knowledge documents"
        );

        Ok(state)
    }

    async fn save(&self, collection: &KnowledgeCollection, ledger: &VersionLedger) -> Result<()> {
        let mut revisions = self.revisions.lock().await;

        self.ensure_unchanged(&self.knowledge_path, &revisions.knowledge)
            .await?;
        self.ensure_unchanged(&self.ledger_path, &revisions.ledger)
            .await?;

        let knowledge_bytes = to_pretty_json(collection)?;
        let ledger_bytes = to_pretty_json(ledger)?;

        // Ledger first: a failed knowledge write then leaves extra history,
        // never a version without its record.
        write_atomic(&self.ledger_path, &ledger_bytes).await?;
        revisions.ledger = Some(revision(&ledger_bytes));

        write_atomic(&self.knowledge_path, &knowledge_bytes).await?;
        revisions.knowledge = Some(revision(&knowledge_bytes));

        debug!(
            path = %self.knowledge_path.display(),
            items = collection.len(),
            "Saved knowledge documents"
        );
        Ok(())
    }

    async fn backup(
        &self,
        collection: &KnowledgeCollection,
        ledger: &VersionLedger,
    ) -> Result<BackupReport> {
        let created_at = Utc::now();
        let stamp = created_at.format("%Y%m%d_%H%M%S").to_string();

        let knowledge_path =
            write_backup(&self.knowledge_path, &stamp, &to_pretty_json(collection)?).await?;
        let ledger_path = write_backup(&self.ledger_path, &stamp, &to_pretty_json(ledger)?).await?;

        info!(
            knowledge = %knowledge_path.display(),
            ledger = %ledger_path.display(),
            "Created backup"
        );

        Ok(BackupReport {
            knowledge_path,
            ledger_path,
            created_at,
        })
    }

    fn describe(&self) -> String {
        self.knowledge_path.display().to_string()
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

/// Backup file name for `original`, e.g. `knowledge.backup_20250401_080000.json`
pub fn backup_file_name(original: &Path, stamp: &str, attempt: u32) -> String {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "knowledge".to_string());
    if attempt == 0 {
        format!("{}.backup_{}.json", stem, stamp)
    } else {
        format!("{}.backup_{}_{}.json", stem, stamp, attempt)
    }
}

/// Write a backup next to `original`, never replacing an existing file
async fn write_backup(original: &Path, stamp: &str, bytes: &[u8]) -> Result<PathBuf> {
    let dir = original
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::persistence(dir, e))?;

    let mut attempt = 0;
    loop {
        let path = dir.join(backup_file_name(original, stamp, attempt));
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        match opened {
            Ok(mut file) => {
                file.write_all(bytes)
                    .await
                    .map_err(|e| Error::persistence(&path, e))?;
                file.flush().await.map_err(|e| Error::persistence(&path, e))?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(Error::persistence(&path, e)),
        }
    }
}
