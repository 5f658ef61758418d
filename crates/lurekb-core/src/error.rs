//! Error types for lurekb

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using lurekb's Error
pub type Result<T> = std::result::Result<T, Error>;

/// lurekb error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Record errors (E001-E099)
    #[error("Validation failed for {category} record: {reason}")]
    Validation { category: String, reason: String },

    #[error("Knowledge item '{name}' not found in {category}. Run `lurekb search {name}` to look it up.")]
    NotFound { category: String, name: String },

    #[error("Unknown category '{0}'. Run `lurekb schema` to see all categories.")]
    UnknownCategory(String),

    // Retrieval errors (E100-E199)
    #[error("Semantic search unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Network error: {0}. Check the embedding endpoint is reachable.")]
    Network(#[from] reqwest::Error),

    // Persistence errors (E400-E499)
    #[error("Persistence error on {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("{} changed on disk since it was loaded. Reload the store and retry.", path.display())]
    StaleSnapshot { path: PathBuf },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    Config(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a validation error for the given category
    pub fn validation(category: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            category: category.into(),
            reason: reason.into(),
        }
    }

    /// Build a not-found error for the given category and name
    pub fn not_found(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Build a persistence error for an I/O failure on `path`
    pub fn persistence(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "E001",
            Self::NotFound { .. } => "E002",
            Self::UnknownCategory(_) => "E003",
            Self::BackendUnavailable(_) => "E100",
            Self::EmbeddingFailed(_) => "E101",
            Self::Network(_) => "E102",
            Self::Persistence { .. } => "E400",
            Self::StaleSnapshot { .. } => "E401",
            Self::Serialization(_) => "E402",
            Self::Config(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Validation { category, .. } => Some(format!("lurekb schema {}", category)),
            Self::NotFound { name, .. } => Some(format!("lurekb search {}", name)),
            Self::UnknownCategory(_) => Some("lurekb schema".to_string()),
            Self::BackendUnavailable(_) => {
                Some("lurekb config set embedding.provider openai".to_string())
            }
            Self::StaleSnapshot { .. } => Some("Reload the knowledge store and retry".to_string()),
            _ => None,
        }
    }

    /// Whether the caller can carry on after this error.
    ///
    /// Recoverable errors never leave a partial mutation behind; the rest are
    /// fatal to the call that produced them.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::NotFound { .. }
                | Self::UnknownCategory(_)
                | Self::BackendUnavailable(_)
                | Self::InvalidInput(_)
        )
    }
}
