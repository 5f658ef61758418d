//! In-memory repository

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{BackupReport, KnowledgeRepository, StoredState};
use crate::error::{Error, Result};
use crate::knowledge::KnowledgeCollection;
use crate::ledger::VersionLedger;

/// Repository that keeps documents in process memory
///
/// Saves can be made to fail on demand to exercise error paths.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    documents: Mutex<(KnowledgeCollection, VersionLedger)>,
    backups: Mutex<Vec<(KnowledgeCollection, VersionLedger)>>,
    fail_saves: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing documents
    pub fn with_documents(collection: KnowledgeCollection, ledger: VersionLedger) -> Self {
        Self {
            documents: Mutex::new((collection, ledger)),
            ..Self::default()
        }
    }

    /// Make subsequent saves fail with a persistence error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Currently stored documents
    pub async fn documents(&self) -> (KnowledgeCollection, VersionLedger) {
        self.documents.lock().await.clone()
    }

    /// Number of backups taken
    pub async fn backup_count(&self) -> usize {
        self.backups.lock().await.len()
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryRepository {
    async fn load(&self) -> Result<StoredState> {
        let (collection, ledger) = self.documents.lock().await.clone();
        Ok(StoredState {
            collection,
            ledger,
            legacy_items: Vec::new(),
        })
    }

    async fn save(&self, collection: &KnowledgeCollection, ledger: &VersionLedger) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::persistence("memory", "saves are disabled"));
        }
        *self.documents.lock().await = (collection.clone(), ledger.clone());
        Ok(())
    }

    async fn backup(
        &self,
        collection: &KnowledgeCollection,
        ledger: &VersionLedger,
    ) -> Result<BackupReport> {
        let mut backups = self.backups.lock().await;
        backups.push((collection.clone(), ledger.clone()));
        let n = backups.len();
        Ok(BackupReport {
            knowledge_path: PathBuf::from(format!("memory/knowledge.backup_{}.json", n)),
            ledger_path: PathBuf::from(format!("memory/knowledge_versions.backup_{}.json", n)),
            created_at: Utc::now(),
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
