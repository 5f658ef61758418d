//! Knowledge store
//!
//! The store owns the authoritative in-memory snapshot of the collection and
//! its version ledger. Mutations are serialised behind a single async write
//! lock: each one works on a copy of the snapshot, persists both documents and
//! only then swaps the copy in, so a failed save leaves memory untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::merge::{MetaUpdate, candidate_data, merge_data, merge_meta};
use super::types::{
    AuditEntry, BatchFailure, BatchReport, FeedbackOutcome, KnowledgeCollection, KnowledgeData,
    KnowledgeItem, KnowledgeMeta, KnowledgeSource, KnowledgeStats, KnowledgeStatus, MergeAction,
    MergeOutcome,
};
use crate::error::{Error, Result};
use crate::ledger::{DEFAULT_AUTHOR, VersionLedger, VersionRecord};
use crate::schema::{Category, SchemaRegistry};
use crate::storage::{BackupReport, KnowledgeRepository};

/// Feedback count from which an item can be deprecated
const DEPRECATE_MIN_FEEDBACK: u32 = 5;
/// Positive rate below which an item is deprecated
const DEPRECATE_MAX_RATE: f64 = 0.3;
/// Feedback count from which an item can be sent back to review
const REVIEW_MIN_FEEDBACK: u32 = 3;
/// Positive rate below which an item is sent back to review
const REVIEW_MAX_RATE: f64 = 0.5;

const NOTE_CREATED: &str = "initial version";
const NOTE_UPDATED: &str = "data update";

/// Options for `add_or_merge`
#[derive(Debug, Clone)]
pub struct AddOptions {
    /// Overrides the source's default confidence
    pub confidence: Option<f64>,
    pub verified: bool,
    /// Ledger note; defaults depend on whether the item is new
    pub note: Option<String>,
    pub tags: Vec<String>,
    pub changed_by: String,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            confidence: None,
            verified: false,
            note: None,
            tags: Vec::new(),
            changed_by: DEFAULT_AUTHOR.to_string(),
        }
    }
}

impl AddOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_author(mut self, changed_by: impl Into<String>) -> Self {
        self.changed_by = changed_by.into();
        self
    }
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    collection: KnowledgeCollection,
    ledger: VersionLedger,
    legacy_items: Vec<(Category, String)>,
}

/// Versioned knowledge store
pub struct KnowledgeStore {
    repository: Arc<dyn KnowledgeRepository>,
    registry: SchemaRegistry,
    state: RwLock<StoreState>,
}

impl KnowledgeStore {
    /// Open a store, loading both documents from the repository
    pub async fn open(
        repository: Arc<dyn KnowledgeRepository>,
        registry: SchemaRegistry,
    ) -> Result<Self> {
        let stored = repository.load().await?;
        if !stored.legacy_items.is_empty() {
            warn!(
                count = stored.legacy_items.len(),
                "Knowledge items without metadata found; run a legacy migration"
            );
        }

        info!(
            location = %repository.describe(),
            items = stored.collection.len(),
            "Opened knowledge store"
        );

        Ok(Self {
            repository,
            registry,
            state: RwLock::new(StoreState {
                collection: stored.collection,
                ledger: stored.ledger,
                legacy_items: stored.legacy_items,
            }),
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Add a candidate record, merging it into an existing item when its name
    /// matches an existing name or alias in the category
    pub async fn add_or_merge(
        &self,
        record: &Value,
        category: Category,
        source: KnowledgeSource,
        options: &AddOptions,
    ) -> Result<MergeOutcome> {
        if let Some(confidence) = options.confidence {
            if !confidence.is_finite() {
                return Err(Error::InvalidInput(format!(
                    "confidence must be a number, got {}",
                    confidence
                )));
            }
        }
        let candidate = candidate_data(&self.registry, category, record)?;

        let outcome = self
            .mutate(|state, now| {
                apply_candidate(&self.registry, state, category, candidate, source, options, now)
            })
            .await?;

        info!(
            category = %outcome.category,
            name = %outcome.name,
            action = outcome.action.as_str(),
            version = outcome.version,
            "Stored knowledge item"
        );
        Ok(outcome)
    }

    /// Add several records, reporting recoverable failures per record
    ///
    /// Persistence failures abort the batch; records applied before the
    /// failure stay applied.
    pub async fn add_batch(
        &self,
        records: &[Value],
        category: Category,
        source: KnowledgeSource,
        options: &AddOptions,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for (index, record) in records.iter().enumerate() {
            match self.add_or_merge(record, category, source, options).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) if e.is_recoverable() => {
                    debug!(index, error = %e, "Rejected batch record");
                    report.failures.push(BatchFailure {
                        index,
                        name: record
                            .get("name")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            category = %category,
            created = report.created(),
            merged = report.merged(),
            rejected = report.failures.len(),
            "Applied knowledge batch"
        );
        Ok(report)
    }

    /// Record user feedback and re-evaluate the item's status
    ///
    /// Feedback is not a versioned mutation.
    pub async fn submit_feedback(
        &self,
        category: Category,
        name: &str,
        positive: bool,
    ) -> Result<FeedbackOutcome> {
        let outcome = self
            .mutate(|state, now| {
                let index = state
                    .collection
                    .position(category, name)
                    .ok_or_else(|| Error::not_found(category.as_str(), name))?;
                let item = &mut state.collection.items_mut(category)[index];
                let meta = &mut item.meta;

                let previous_status = meta.status;
                meta.feedback_count += 1;
                if positive {
                    meta.positive_feedback += 1;
                } else {
                    meta.negative_feedback += 1;
                }
                meta.updated_at = now;

                let total = meta.feedback_total();
                let rate = meta.positive_rate();
                if total >= DEPRECATE_MIN_FEEDBACK && rate < DEPRECATE_MAX_RATE {
                    meta.status = KnowledgeStatus::Deprecated;
                } else if total >= REVIEW_MIN_FEEDBACK && rate < REVIEW_MAX_RATE {
                    meta.status = KnowledgeStatus::Pending;
                }

                Ok(FeedbackOutcome {
                    category,
                    name: item.data.name.clone(),
                    feedback_count: meta.feedback_count,
                    positive_feedback: meta.positive_feedback,
                    negative_feedback: meta.negative_feedback,
                    positive_rate: rate,
                    previous_status,
                    status: meta.status,
                })
            })
            .await?;

        if outcome.status_changed() {
            info!(
                category = %category,
                name = %outcome.name,
                from = %outcome.previous_status,
                to = %outcome.status,
                "Feedback changed item status"
            );
        }
        Ok(outcome)
    }

    /// Mark an item as verified by `verified_by`
    ///
    /// Verification is versioned: it bumps the version and appends a ledger
    /// record.
    pub async fn verify(
        &self,
        category: Category,
        name: &str,
        verified_by: &str,
    ) -> Result<MergeOutcome> {
        let outcome = self
            .mutate(|state, now| {
                let index = state
                    .collection
                    .position(category, name)
                    .ok_or_else(|| Error::not_found(category.as_str(), name))?;
                ensure_baseline(state, category, index);

                let item = &mut state.collection.items_mut(category)[index];
                let meta = &mut item.meta;
                meta.parent_version = Some(meta.version);
                meta.version += 1;
                meta.verified = true;
                meta.verified_by = Some(verified_by.to_string());
                meta.verified_at = Some(now);
                meta.confidence = 1.0;
                meta.status = KnowledgeStatus::Active;
                meta.updated_at = now;

                let outcome = MergeOutcome {
                    action: MergeAction::Verified,
                    category,
                    name: item.data.name.clone(),
                    version: meta.version,
                    confidence: meta.confidence,
                    dropped_aliases: Vec::new(),
                };
                let (data, meta) = (item.data.clone(), item.meta.clone());
                state.ledger.record(
                    category,
                    &data,
                    &meta,
                    format!("verified by {}", verified_by),
                    verified_by,
                );
                Ok(outcome)
            })
            .await?;

        info!(category = %category, name = %outcome.name, by = verified_by, "Verified knowledge item");
        Ok(outcome)
    }

    /// Items below `threshold` confidence or not yet verified, lowest first
    pub async fn low_confidence_items(&self, threshold: f64) -> Vec<AuditEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<AuditEntry> = state
            .collection
            .iter()
            .filter(|(_, item)| item.meta.confidence < threshold || !item.meta.verified)
            .map(|(category, item)| AuditEntry::from_item(category, item))
            .collect();
        entries.sort_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries
    }

    /// Aggregate statistics
    pub async fn stats(&self) -> KnowledgeStats {
        KnowledgeStats::from_collection(&self.state.read().await.collection)
    }

    /// Write timestamped copies of both documents
    pub async fn backup(&self) -> Result<BackupReport> {
        let (collection, ledger) = {
            let state = self.state.read().await;
            (state.collection.clone(), state.ledger.clone())
        };
        self.repository.backup(&collection, &ledger).await
    }

    /// Item whose canonical name matches (case-insensitive)
    pub async fn get(&self, category: Category, name: &str) -> Option<KnowledgeItem> {
        self.state.read().await.collection.get(category, name).cloned()
    }

    /// Item whose name or alias matches (case-insensitive)
    pub async fn find(&self, category: Category, name: &str) -> Option<KnowledgeItem> {
        self.state.read().await.collection.find(category, name).cloned()
    }

    pub async fn list(&self, category: Category) -> Vec<KnowledgeItem> {
        self.state.read().await.collection.items(category).to_vec()
    }

    /// Version history of an item, looked up by name or alias
    pub async fn history(&self, category: Category, name: &str) -> Vec<VersionRecord> {
        let state = self.state.read().await;
        let canonical = state
            .collection
            .find(category, name)
            .map(|item| item.data.name.as_str())
            .unwrap_or(name);
        state.ledger.history(category, canonical).to_vec()
    }

    /// Copy of the current collection
    pub async fn snapshot(&self) -> KnowledgeCollection {
        self.state.read().await.collection.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.collection.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of items still waiting for a legacy migration
    pub async fn legacy_count(&self) -> usize {
        self.state.read().await.legacy_items.len()
    }

    /// Discard the in-memory snapshot and load both documents again
    pub async fn reload(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = self.repository.load().await?;
        *state = StoreState {
            collection: stored.collection,
            ledger: stored.ledger,
            legacy_items: stored.legacy_items,
        };
        debug!(items = state.collection.len(), "Reloaded knowledge store");
        Ok(())
    }

    /// Give items stored without metadata a fresh metadata block and an
    /// initial ledger record, after taking a backup
    pub async fn migrate_legacy(&self) -> Result<usize> {
        let mut guard = self.state.write().await;
        if guard.legacy_items.is_empty() {
            return Ok(0);
        }

        let backup = self
            .repository
            .backup(&guard.collection, &guard.ledger)
            .await?;
        info!(backup = %backup.knowledge_path.display(), "Backed up before legacy migration");

        let now = Utc::now();
        let mut next = guard.clone();
        let legacy = std::mem::take(&mut next.legacy_items);
        let mut migrated = 0;
        for (category, name) in legacy {
            let Some(index) = next.collection.position(category, &name) else {
                continue;
            };
            let item = &mut next.collection.items_mut(category)[index];
            item.meta = KnowledgeMeta::new(KnowledgeSource::Manual, None, now);
            let (data, meta) = (item.data.clone(), item.meta.clone());
            if next.ledger.history(category, &data.name).is_empty() {
                next.ledger
                    .record(category, &data, &meta, NOTE_CREATED, DEFAULT_AUTHOR);
            }
            migrated += 1;
        }

        self.repository.save(&next.collection, &next.ledger).await?;
        *guard = next;

        info!(migrated, "Migrated legacy knowledge items");
        Ok(migrated)
    }

    /// Apply a mutation to a copy of the snapshot, persist it, then swap it in
    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut StoreState, DateTime<Utc>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let outcome = apply(&mut next, Utc::now())?;
        self.repository.save(&next.collection, &next.ledger).await?;
        *guard = next;
        Ok(outcome)
    }
}

fn apply_candidate(
    registry: &SchemaRegistry,
    state: &mut StoreState,
    category: Category,
    mut candidate: KnowledgeData,
    source: KnowledgeSource,
    options: &AddOptions,
    now: DateTime<Utc>,
) -> Result<MergeOutcome> {
    let existing = state.collection.match_position(category, &candidate.name);
    let (aliases, dropped_aliases) = claim_aliases(
        &state.collection,
        category,
        existing,
        std::mem::take(&mut candidate.aliases),
    );
    candidate.aliases = aliases;

    let Some(index) = existing else {
        let mut meta = KnowledgeMeta::new(source, options.confidence, now)
            .with_tags(options.tags.clone());
        if options.verified {
            meta.verified = true;
            meta.verified_by = Some(options.changed_by.clone());
            meta.verified_at = Some(now);
        }

        state.ledger.record(
            category,
            &candidate,
            &meta,
            options.note.as_deref().unwrap_or(NOTE_CREATED),
            options.changed_by.as_str(),
        );
        let outcome = MergeOutcome {
            action: MergeAction::Created,
            category,
            name: candidate.name.clone(),
            version: meta.version,
            confidence: meta.confidence,
            dropped_aliases,
        };
        state
            .collection
            .items_mut(category)
            .push(KnowledgeItem::new(candidate, meta));
        return Ok(outcome);
    };

    ensure_baseline(state, category, index);

    let current = state.collection.items(category)[index].clone();
    let data = merge_data(registry, category, &current.data, &candidate);
    let meta = merge_meta(
        &current.meta,
        &MetaUpdate {
            source,
            confidence: options.confidence,
            verified: options.verified,
            tags: &options.tags,
            changed_by: &options.changed_by,
            now,
        },
    );

    state.ledger.record(
        category,
        &data,
        &meta,
        options.note.as_deref().unwrap_or(NOTE_UPDATED),
        options.changed_by.as_str(),
    );
    let outcome = MergeOutcome {
        action: MergeAction::Merged,
        category,
        name: data.name.clone(),
        version: meta.version,
        confidence: meta.confidence,
        dropped_aliases,
    };
    state.collection.items_mut(category)[index] = KnowledgeItem::new(data, meta);
    Ok(outcome)
}

/// Split incoming aliases into those free to use and those already owned by
/// another item in the category
fn claim_aliases(
    collection: &KnowledgeCollection,
    category: Category,
    owner: Option<usize>,
    aliases: Vec<String>,
) -> (Vec<String>, Vec<String>) {
    let items = collection.items(category);
    aliases.into_iter().partition(|alias| {
        let taken_by = items
            .iter()
            .enumerate()
            .find(|(index, item)| Some(*index) != owner && item.matches_name(alias));
        match taken_by {
            Some((_, item)) => {
                warn!(
                    category = %category,
                    alias = %alias,
                    owner = %item.data.name,
                    "Dropping alias that belongs to another item"
                );
                false
            }
            None => true,
        }
    })
}

/// Record the current state of an item that has no history yet, so the
/// history length keeps matching the version
fn ensure_baseline(state: &mut StoreState, category: Category, index: usize) {
    let item = &state.collection.items(category)[index];
    if state.ledger.history(category, &item.data.name).is_empty() {
        let (data, meta) = (item.data.clone(), item.meta.clone());
        state
            .ledger
            .record(category, &data, &meta, NOTE_CREATED, DEFAULT_AUTHOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryRepository;
    use serde_json::json;

    async fn setup_store() -> (KnowledgeStore, Arc<InMemoryRepository>) {
        let repository = Arc::new(InMemoryRepository::new());
        let store = KnowledgeStore::open(repository.clone(), SchemaRegistry::builtin())
            .await
            .unwrap();
        (store, repository)
    }

    fn mandarin() -> Value {
        json!({
            "name": "Mandarin fish",
            "aliases": ["Chinese perch"],
            "habits": "Ambush predator near rocks",
            "best_season": ["spring", "autumn"]
        })
    }

    #[tokio::test]
    async fn test_add_creates_item() {
        let (store, repository) = setup_store().await;

        let outcome = store
            .add_or_merge(&mandarin(), Category::Fish, KnowledgeSource::Collected, &AddOptions::new())
            .await
            .unwrap();

        assert_eq!(outcome.action, MergeAction::Created);
        assert_eq!(outcome.version, 1);
        assert_eq!(outcome.confidence, 0.7);

        let item = store.get(Category::Fish, "mandarin fish").await.unwrap();
        assert_eq!(item.meta.status, KnowledgeStatus::Active);
        assert_eq!(item.meta.source, KnowledgeSource::Collected);

        let history = store.history(Category::Fish, "Mandarin fish").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].changes, "initial version");

        let (saved, _) = repository.documents().await;
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_record_is_rejected_without_mutation() {
        let (store, _) = setup_store().await;

        let err = store
            .add_or_merge(&json!({"habits": "x"}), Category::Fish, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_merge_by_alias_keeps_canonical_name() {
        let (store, _) = setup_store().await;
        store
            .add_or_merge(&mandarin(), Category::Fish, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap();

        let outcome = store
            .add_or_merge(
                &json!({"name": "CHINESE PERCH", "best_season": ["summer"]}),
                Category::Fish,
                KnowledgeSource::LlmGenerated,
                &AddOptions::new().with_note("added summer"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.action, MergeAction::Merged);
        assert_eq!(outcome.name, "Mandarin fish");
        assert_eq!(outcome.version, 2);
        // Confidence never drops below what the item already had
        assert_eq!(outcome.confidence, 0.9);

        let item = store.get(Category::Fish, "Mandarin fish").await.unwrap();
        assert_eq!(item.data.field("best_season"), Some(&json!(["spring", "autumn", "summer"])));
        assert_eq!(item.meta.source, KnowledgeSource::LlmGenerated);
        assert_eq!(item.meta.parent_version, Some(1));

        let history = store.history(Category::Fish, "Chinese perch").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].changes, "added summer");
    }

    #[tokio::test]
    async fn test_alias_owned_by_other_item_is_dropped() {
        let (store, _) = setup_store().await;
        store
            .add_or_merge(&mandarin(), Category::Fish, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap();

        let outcome = store
            .add_or_merge(
                &json!({"name": "Largemouth bass", "aliases": ["Chinese Perch", "Bucketmouth"]}),
                Category::Fish,
                KnowledgeSource::Manual,
                &AddOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.action, MergeAction::Created);
        assert_eq!(outcome.dropped_aliases, vec!["Chinese Perch".to_string()]);
        let bass = store.get(Category::Fish, "Largemouth bass").await.unwrap();
        assert_eq!(bass.aliases(), ["Bucketmouth"]);
    }

    #[tokio::test]
    async fn test_same_name_in_other_category_is_separate() {
        let (store, _) = setup_store().await;
        let record = json!({"name": "Drop shot"});
        store
            .add_or_merge(&record, Category::Rig, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap();
        let outcome = store
            .add_or_merge(&record, Category::Technique, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap();

        assert_eq!(outcome.action, MergeAction::Created);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_confidence_override_is_clamped_and_validated() {
        let (store, _) = setup_store().await;
        let outcome = store
            .add_or_merge(
                &json!({"name": "Spoon"}),
                Category::Lure,
                KnowledgeSource::Collected,
                &AddOptions::new().with_confidence(1.4),
            )
            .await
            .unwrap();
        assert_eq!(outcome.confidence, 1.0);

        let err = store
            .add_or_merge(
                &json!({"name": "Jig"}),
                Category::Lure,
                KnowledgeSource::Collected,
                &AddOptions::new().with_confidence(f64::NAN),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E800");
    }

    #[tokio::test]
    async fn test_feedback_unknown_item() {
        let (store, _) = setup_store().await;
        let err = store
            .submit_feedback(Category::Fish, "Nessie", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_feedback_is_not_versioned() {
        let (store, _) = setup_store().await;
        store
            .add_or_merge(&mandarin(), Category::Fish, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap();

        let outcome = store
            .submit_feedback(Category::Fish, "Mandarin fish", true)
            .await
            .unwrap();
        assert_eq!(outcome.feedback_count, 1);
        assert!(!outcome.status_changed());

        let item = store.get(Category::Fish, "Mandarin fish").await.unwrap();
        assert_eq!(item.meta.version, 1);
        assert_eq!(item.meta.positive_feedback, 1);
        assert_eq!(store.history(Category::Fish, "Mandarin fish").await.len(), 1);
    }

    #[tokio::test]
    async fn test_two_negatives_out_of_three_sends_item_to_review() {
        let (store, _) = setup_store().await;
        store
            .add_or_merge(&mandarin(), Category::Fish, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap();

        store.submit_feedback(Category::Fish, "Mandarin fish", true).await.unwrap();
        store.submit_feedback(Category::Fish, "Mandarin fish", false).await.unwrap();
        let outcome = store
            .submit_feedback(Category::Fish, "Mandarin fish", false)
            .await
            .unwrap();

        assert_eq!(outcome.status, KnowledgeStatus::Pending);
        assert_eq!(outcome.previous_status, KnowledgeStatus::Active);
    }

    #[tokio::test]
    async fn test_verify_is_versioned() {
        let (store, _) = setup_store().await;
        store
            .add_or_merge(
                &mandarin(),
                Category::Fish,
                KnowledgeSource::LlmGenerated,
                &AddOptions::new(),
            )
            .await
            .unwrap();

        let outcome = store
            .verify(Category::Fish, "Mandarin fish", "guide")
            .await
            .unwrap();
        assert_eq!(outcome.action, MergeAction::Verified);
        assert_eq!(outcome.version, 2);

        let item = store.get(Category::Fish, "Mandarin fish").await.unwrap();
        assert!(item.meta.verified);
        assert_eq!(item.meta.confidence, 1.0);
        assert_eq!(item.meta.verified_by.as_deref(), Some("guide"));

        let history = store.history(Category::Fish, "Mandarin fish").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].changes, "verified by guide");
        assert_eq!(history[1].changed_by, "guide");
    }

    #[tokio::test]
    async fn test_failed_save_leaves_memory_untouched() {
        let (store, repository) = setup_store().await;
        store
            .add_or_merge(&mandarin(), Category::Fish, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap();

        repository.set_fail_saves(true);
        let err = store
            .add_or_merge(
                &json!({"name": "Mandarin fish", "tips": "Slow drag along the bottom"}),
                Category::Fish,
                KnowledgeSource::Manual,
                &AddOptions::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E400");
        assert!(!err.is_recoverable());

        let item = store.get(Category::Fish, "Mandarin fish").await.unwrap();
        assert_eq!(item.meta.version, 1);
        assert!(item.data.field("tips").is_none());
        assert_eq!(store.history(Category::Fish, "Mandarin fish").await.len(), 1);

        let err = store
            .submit_feedback(Category::Fish, "Mandarin fish", false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E400");
        let item = store.get(Category::Fish, "Mandarin fish").await.unwrap();
        assert_eq!(item.meta.feedback_count, 0);
    }

    #[tokio::test]
    async fn test_add_batch_reports_failures() {
        let (store, _) = setup_store().await;
        let records = vec![
            json!({"name": "Texas rig", "components": ["worm", "bullet weight"]}),
            json!({"components": ["no name"]}),
            json!({"name": "texas rig", "components": ["EWG hook"]}),
            json!({"name": "Drop shot"}),
        ];

        let report = store
            .add_batch(&records, Category::Rig, KnowledgeSource::Collected, &AddOptions::new())
            .await
            .unwrap();

        assert_eq!(report.created(), 2);
        assert_eq!(report.merged(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].code, "E001");

        let rig = store.get(Category::Rig, "Texas rig").await.unwrap();
        assert_eq!(
            rig.data.field("components"),
            Some(&json!(["worm", "bullet weight", "EWG hook"]))
        );
    }

    #[tokio::test]
    async fn test_low_confidence_audit() {
        let (store, _) = setup_store().await;
        store
            .add_or_merge(&json!({"name": "Perch"}), Category::Fish, KnowledgeSource::LlmGenerated, &AddOptions::new())
            .await
            .unwrap();
        store
            .add_or_merge(&json!({"name": "Pike"}), Category::Fish, KnowledgeSource::Expert, &AddOptions::new())
            .await
            .unwrap();
        store
            .add_or_merge(&json!({"name": "Spoon"}), Category::Lure, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap();
        store.verify(Category::Fish, "Pike", "guide").await.unwrap();

        let entries = store.low_confidence_items(0.8).await;
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Perch", "Spoon"]);
        assert_eq!(entries[0].source, KnowledgeSource::LlmGenerated);
    }

    #[tokio::test]
    async fn test_backup_does_not_mutate() {
        let (store, repository) = setup_store().await;
        store
            .add_or_merge(&mandarin(), Category::Fish, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap();

        let before = store.snapshot().await;
        store.backup().await.unwrap();
        assert_eq!(store.snapshot().await, before);
        assert_eq!(repository.backup_count().await, 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let (store, _) = setup_store().await;
        store
            .add_or_merge(&mandarin(), Category::Fish, KnowledgeSource::Manual, &AddOptions::new())
            .await
            .unwrap();
        store
            .add_or_merge(&json!({"name": "Texas rig"}), Category::Rig, KnowledgeSource::Expert, &AddOptions::new())
            .await
            .unwrap();
        store.verify(Category::Rig, "Texas rig", "guide").await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.verified_items, 1);
        assert_eq!(stats.by_category.get(&Category::Rig), Some(&1));
        assert!((stats.average_confidence - 0.95).abs() < 1e-9);
    }
}
