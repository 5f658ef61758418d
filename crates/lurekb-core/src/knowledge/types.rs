//! Knowledge data types
//!
//! This module defines the items held by the knowledge store, their inline
//! metadata block and the reports returned by store operations.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::schema::Category;

/// Where a piece of knowledge came from
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeSource {
    /// Written or confirmed by a domain expert
    Expert,
    /// Entered by hand
    #[default]
    Manual,
    /// Gathered by a collector
    Collected,
    /// Drafted by a language model
    LlmGenerated,
    /// Derived from user feedback
    UserFeedback,
    /// Imported from another knowledge base
    Imported,
}

impl KnowledgeSource {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expert => "expert",
            Self::Manual => "manual",
            Self::Collected => "collected",
            Self::LlmGenerated => "llm_generated",
            Self::UserFeedback => "user_feedback",
            Self::Imported => "imported",
        }
    }

    /// Confidence assigned when the caller does not supply one
    pub fn default_confidence(&self) -> f64 {
        match self {
            Self::Expert => 1.0,
            Self::Manual => 0.9,
            Self::Collected => 0.7,
            Self::LlmGenerated => 0.6,
            Self::UserFeedback => 0.8,
            Self::Imported => 0.7,
        }
    }

    /// Get all sources
    pub fn all() -> &'static [KnowledgeSource] {
        &[
            Self::Expert,
            Self::Manual,
            Self::Collected,
            Self::LlmGenerated,
            Self::UserFeedback,
            Self::Imported,
        ]
    }
}

impl FromStr for KnowledgeSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|source| source.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("unknown knowledge source '{}'", s)))
    }
}

impl std::fmt::Display for KnowledgeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a knowledge item
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeStatus {
    Draft,
    /// Waiting for review, usually after negative feedback
    Pending,
    #[default]
    Active,
    /// Mostly negative feedback
    Deprecated,
    Archived,
}

impl KnowledgeStatus {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Archived => "archived",
        }
    }

    /// Get all statuses
    pub fn all() -> &'static [KnowledgeStatus] {
        &[
            Self::Draft,
            Self::Pending,
            Self::Active,
            Self::Deprecated,
            Self::Archived,
        ]
    }
}

impl std::fmt::Display for KnowledgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Timestamp parsing for documents written by older tools.
///
/// Accepts RFC 3339 and also naive ISO 8601 timestamps such as
/// `2024-05-01T10:00:00.123456`, which are read as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, de::Error as _};

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{}'", raw)))
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{}'", raw))),
            None => Ok(None),
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_confidence() -> f64 {
    1.0
}

/// Inline metadata block stored under `_meta` on every item
///
/// Missing keys take their defaults, so partial blocks written by older
/// tools still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMeta {
    /// Starts at 1 and grows by one per versioned mutation
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub source: KnowledgeSource,
    /// Always within [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub verified_by: Option<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feedback_count: u32,
    #[serde(default)]
    pub positive_feedback: u32,
    #[serde(default)]
    pub negative_feedback: u32,
    #[serde(default)]
    pub status: KnowledgeStatus,
    #[serde(default)]
    pub parent_version: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for KnowledgeMeta {
    /// Metadata given to items that were stored before metadata existed
    fn default() -> Self {
        Self::new(KnowledgeSource::Manual, None, Utc::now())
    }
}

impl KnowledgeMeta {
    /// Metadata for a freshly created item
    pub fn new(source: KnowledgeSource, confidence: Option<f64>, now: DateTime<Utc>) -> Self {
        Self {
            version: 1,
            created_at: now,
            updated_at: now,
            source,
            confidence: clamp_confidence(confidence.unwrap_or_else(|| source.default_confidence())),
            verified: false,
            verified_by: None,
            verified_at: None,
            feedback_count: 0,
            positive_feedback: 0,
            negative_feedback: 0,
            status: KnowledgeStatus::Active,
            parent_version: None,
            tags: Vec::new(),
        }
    }

    /// Add tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        union_tags(&mut self.tags, tags);
        self
    }

    /// Positive plus negative votes
    ///
    /// Lifecycle rules use this rather than `feedback_count`, which older
    /// documents may lack or disagree with.
    pub fn feedback_total(&self) -> u32 {
        self.positive_feedback + self.negative_feedback
    }

    /// Share of positive feedback, 1.0 when nothing was submitted yet
    pub fn positive_rate(&self) -> f64 {
        match self.feedback_total() {
            0 => 1.0,
            total => self.positive_feedback as f64 / total as f64,
        }
    }
}

/// Clamp a confidence into [0, 1]
pub(crate) fn clamp_confidence(confidence: f64) -> f64 {
    confidence.clamp(0.0, 1.0)
}

/// Append tags not already present, keeping first-seen order
pub(crate) fn union_tags(tags: &mut Vec<String>, incoming: impl IntoIterator<Item = String>) {
    for tag in incoming {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
}

/// The domain content of an item, everything except `_meta`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeData {
    /// Canonical name, unique within its category
    pub name: String,
    /// Alternative names
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Category-specific fields
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl KnowledgeData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Get a category-specific field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether `query` equals the name or one of the aliases, ignoring case
    pub fn matches_name(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        self.name.to_lowercase() == query
            || self.aliases.iter().any(|alias| alias.to_lowercase() == query)
    }
}

/// A single knowledge item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    #[serde(flatten)]
    pub data: KnowledgeData,
    #[serde(rename = "_meta", default)]
    pub meta: KnowledgeMeta,
}

impl KnowledgeItem {
    pub fn new(data: KnowledgeData, meta: KnowledgeMeta) -> Self {
        Self { data, meta }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.data.aliases
    }

    pub fn matches_name(&self, query: &str) -> bool {
        self.data.matches_name(query)
    }
}

/// All items, grouped by category in document order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeCollection {
    categories: BTreeMap<Category, Vec<KnowledgeItem>>,
}

impl KnowledgeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items of a category
    pub fn items(&self, category: Category) -> &[KnowledgeItem] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn items_mut(&mut self, category: Category) -> &mut Vec<KnowledgeItem> {
        self.categories.entry(category).or_default()
    }

    /// Iterate over every item with its category
    pub fn iter(&self) -> impl Iterator<Item = (Category, &KnowledgeItem)> {
        self.categories
            .iter()
            .flat_map(|(category, items)| items.iter().map(move |item| (*category, item)))
    }

    /// Item whose name matches exactly (case-insensitive)
    pub fn get(&self, category: Category, name: &str) -> Option<&KnowledgeItem> {
        self.position(category, name)
            .map(|index| &self.items(category)[index])
    }

    /// Item whose name or alias matches (case-insensitive)
    pub fn find(&self, category: Category, name: &str) -> Option<&KnowledgeItem> {
        self.items(category).iter().find(|item| item.matches_name(name))
    }

    /// Index of the item whose canonical name matches.
    ///
    /// Case is ignored on purpose, so `verify fish perch` finds "Perch".
    /// Aliases never match here; see [`Self::match_position`].
    pub(crate) fn position(&self, category: Category, name: &str) -> Option<usize> {
        let name = name.trim().to_lowercase();
        self.items(category)
            .iter()
            .position(|item| item.name().to_lowercase() == name)
    }

    pub(crate) fn match_position(&self, category: Category, name: &str) -> Option<usize> {
        self.items(category).iter().position(|item| item.matches_name(name))
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What `add_or_merge` or `verify` did to an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeAction {
    Created,
    Merged,
    Verified,
}

impl MergeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Merged => "merged",
            Self::Verified => "verified",
        }
    }
}

/// Result of a versioned mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub action: MergeAction,
    pub category: Category,
    /// Canonical name of the affected item
    pub name: String,
    pub version: u32,
    pub confidence: f64,
    /// Incoming aliases dropped because another item already owns them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_aliases: Vec<String>,
}

impl std::fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.action {
            MergeAction::Created => "Added",
            MergeAction::Merged => "Updated",
            MergeAction::Verified => "Verified",
        };
        write!(
            f,
            "{} {} '{}' (v{}, confidence {:.2})",
            verb, self.category, self.name, self.version, self.confidence
        )?;
        if !self.dropped_aliases.is_empty() {
            write!(f, ", dropped aliases: {}", self.dropped_aliases.join(", "))?;
        }
        Ok(())
    }
}

/// Result of a feedback submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub category: Category,
    pub name: String,
    pub feedback_count: u32,
    pub positive_feedback: u32,
    pub negative_feedback: u32,
    pub positive_rate: f64,
    pub previous_status: KnowledgeStatus,
    pub status: KnowledgeStatus,
}

impl FeedbackOutcome {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.status
    }
}

impl std::fmt::Display for FeedbackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Feedback recorded for {} '{}': {}/{} positive ({:.0}%)",
            self.category,
            self.name,
            self.positive_feedback,
            self.positive_feedback + self.negative_feedback,
            self.positive_rate * 100.0
        )?;
        if self.status_changed() {
            write!(f, ", status {} -> {}", self.previous_status, self.status)?;
        }
        Ok(())
    }
}

/// An item flagged by the confidence audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub category: Category,
    pub name: String,
    pub version: u32,
    pub confidence: f64,
    pub verified: bool,
    pub source: KnowledgeSource,
    pub status: KnowledgeStatus,
    pub feedback_count: u32,
    pub positive_feedback: u32,
    pub negative_feedback: u32,
}

impl AuditEntry {
    pub(crate) fn from_item(category: Category, item: &KnowledgeItem) -> Self {
        let meta = &item.meta;
        Self {
            category,
            name: item.name().to_string(),
            version: meta.version,
            confidence: meta.confidence,
            verified: meta.verified,
            source: meta.source,
            status: meta.status,
            feedback_count: meta.feedback_count,
            positive_feedback: meta.positive_feedback,
            negative_feedback: meta.negative_feedback,
        }
    }
}

/// Aggregate statistics over the collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_items: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub by_source: BTreeMap<KnowledgeSource, usize>,
    pub by_status: BTreeMap<KnowledgeStatus, usize>,
    pub verified_items: usize,
    /// verified / total, 0.0 for an empty collection
    pub verified_ratio: f64,
    /// Mean confidence, 0.0 for an empty collection
    pub average_confidence: f64,
}

impl KnowledgeStats {
    pub(crate) fn from_collection(collection: &KnowledgeCollection) -> Self {
        let mut stats = Self::default();
        let mut confidence_sum = 0.0;

        for (category, item) in collection.iter() {
            stats.total_items += 1;
            *stats.by_category.entry(category).or_default() += 1;
            *stats.by_source.entry(item.meta.source).or_default() += 1;
            *stats.by_status.entry(item.meta.status).or_default() += 1;
            if item.meta.verified {
                stats.verified_items += 1;
            }
            confidence_sum += item.meta.confidence;
        }

        if stats.total_items > 0 {
            stats.verified_ratio = stats.verified_items as f64 / stats.total_items as f64;
            stats.average_confidence = confidence_sum / stats.total_items as f64;
        }
        stats
    }
}

impl std::fmt::Display for KnowledgeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Knowledge base statistics")?;
        writeln!(f, "  Total items:        {}", self.total_items)?;
        writeln!(
            f,
            "  Verified:           {} ({:.1}%)",
            self.verified_items,
            self.verified_ratio * 100.0
        )?;
        writeln!(f, "  Average confidence: {:.2}", self.average_confidence)?;

        writeln!(f, "By category:")?;
        for category in Category::all() {
            let count = self.by_category.get(category).copied().unwrap_or(0);
            if count > 0 {
                writeln!(f, "  {:<16}{}", category.label(), count)?;
            }
        }
        writeln!(f, "By source:")?;
        for (source, count) in &self.by_source {
            writeln!(f, "  {:<16}{}", source.as_str(), count)?;
        }
        write!(f, "By status:")?;
        for (status, count) in &self.by_status {
            write!(f, "\n  {:<16}{}", status.as_str(), count)?;
        }
        Ok(())
    }
}

/// A record of a batch that could not be applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Position of the record in the batch
    pub index: usize,
    pub name: Option<String>,
    pub code: String,
    pub message: String,
}

/// Result of `add_batch`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<MergeOutcome>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn created(&self) -> usize {
        self.count(MergeAction::Created)
    }

    pub fn merged(&self) -> usize {
        self.count(MergeAction::Merged)
    }

    fn count(&self, action: MergeAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} rejected",
            self.created(),
            self.merged(),
            self.failures.len()
        )
    }
}
