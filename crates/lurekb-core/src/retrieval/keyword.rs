//! Keyword scoring
//!
//! Case-insensitive substring matching with fixed, additive weights. Scores are
//! not normalised.

use serde_json::Value;

use super::{MatchKind, SearchHit};
use crate::knowledge::{KnowledgeCollection, KnowledgeItem};
use crate::schema::Category;

/// Query inside the name, or the name inside the query
pub const NAME_WEIGHT: f64 = 0.8;
/// First alias containing the query
pub const ALIAS_WEIGHT: f64 = 0.6;
/// Each other text field containing the query
pub const TEXT_FIELD_WEIGHT: f64 = 0.3;
/// Each other list field with an element containing the query
pub const LIST_FIELD_WEIGHT: f64 = 0.2;

/// Keyword score of one item; 0.0 for a blank query
pub fn keyword_score(item: &KnowledgeItem, query: &str) -> f64 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;

    let name = item.name().to_lowercase();
    if !name.is_empty() && (name.contains(&query) || query.contains(&name)) {
        score += NAME_WEIGHT;
    }

    if item
        .aliases()
        .iter()
        .any(|alias| alias.to_lowercase().contains(&query))
    {
        score += ALIAS_WEIGHT;
    }

    for value in item.data.fields.values() {
        match value {
            Value::String(text) if text.to_lowercase().contains(&query) => {
                score += TEXT_FIELD_WEIGHT;
            }
            Value::Array(values) => {
                let hit = values
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|v| v.to_lowercase().contains(&query));
                if hit {
                    score += LIST_FIELD_WEIGHT;
                }
            }
            _ => {}
        }
    }

    score
}

/// Rank items by keyword score, best first
pub fn keyword_rank(
    collection: &KnowledgeCollection,
    query: &str,
    category: Option<Category>,
    limit: usize,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = collection
        .iter()
        .filter(|(c, _)| category.is_none_or(|wanted| wanted == *c))
        .filter_map(|(c, item)| {
            let score = keyword_score(item, query);
            (score > 0.0).then(|| SearchHit {
                category: c,
                item: item.clone(),
                score,
                kind: MatchKind::Keyword,
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    hits
}
