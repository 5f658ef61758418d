//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retrieval::{DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL, HttpEmbedder, HybridConfig};
use crate::storage::{INDEX_FILE, KNOWLEDGE_FILE, LEDGER_FILE};

/// Environment variables checked for the embedding API key, in order
pub const API_KEY_ENV_VARS: &[&str] = &["LUREKB_EMBEDDING_API_KEY", "OPENAI_API_KEY"];

/// lurekb configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the documents; the platform data dir when unset
    pub data_dir: Option<PathBuf>,
    pub knowledge_file: String,
    pub ledger_file: String,
    pub index_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub semantic_weight: f64,
    pub similarity_threshold: f32,
    pub top_k: usize,
    /// Confidence below which `audit` lists an item
    pub audit_threshold: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Keyword search only
    #[default]
    None,
    /// Any OpenAI-compatible `/embeddings` endpoint
    Openai,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Openai => "openai",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            knowledge_file: KNOWLEDGE_FILE.to_string(),
            ledger_file: LEDGER_FILE.to_string(),
            index_file: INDEX_FILE.to_string(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let hybrid = HybridConfig::default();
        Self {
            semantic_weight: hybrid.semantic_weight,
            similarity_threshold: hybrid.similarity_threshold,
            top_k: 5,
            audit_threshold: 0.8,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            api_key: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the data directory (`LUREKB_DATA_DIR` wins over the file)
    pub fn resolved_data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Ok(custom_dir) = env::var("LUREKB_DATA_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        Ok(dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join("lurekb"))
    }

    pub fn knowledge_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.resolved_data_dir()?.join(&self.knowledge_file))
    }

    pub fn ledger_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.resolved_data_dir()?.join(&self.ledger_file))
    }

    pub fn index_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.resolved_data_dir()?.join(&self.index_file))
    }
}

impl RetrievalConfig {
    pub fn hybrid_config(&self) -> HybridConfig {
        HybridConfig {
            semantic_weight: self.semantic_weight,
            similarity_threshold: self.similarity_threshold,
        }
    }
}

impl EmbeddingConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(API_KEY_ENV_VARS
            .iter()
            .find_map(|var| env::var(var).ok().filter(|key| !key.is_empty())))
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                let chars: Vec<char> = key.chars().collect();
                if chars.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix: String = chars[chars.len() - 4..].iter().collect();
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "Embedding API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }

    /// Build the configured embedding backend, `None` for keyword-only setups
    pub fn build_embedder(&self) -> anyhow::Result<Option<HttpEmbedder>> {
        match self.provider {
            EmbeddingProvider::None => Ok(None),
            EmbeddingProvider::Openai => {
                let embedder = HttpEmbedder::new(
                    self.base_url.clone(),
                    self.model.clone(),
                    self.resolved_api_key()?,
                    Duration::from_secs(self.timeout_secs),
                )
                .context("Failed to create embedding client")?;
                Ok(Some(embedder))
            }
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("LUREKB_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("lurekb")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or the defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let raw: toml::Table = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        let stores_key = raw
            .get("embedding")
            .and_then(|section| section.get("api_key"))
            .is_some();
        if stores_key {
            return Err(anyhow!(
                "{} contains embedding.api_key. Remove it and set {} instead.",
                path.display(),
                API_KEY_ENV_VARS.join(" or ")
            ));
        }

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.embedding.enforce_env_only()?;

        if !(0.0..=1.0).contains(&self.retrieval.semantic_weight) {
            return Err(anyhow!("retrieval.semantic_weight must be between 0.0 and 1.0"));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(anyhow!(
                "retrieval.similarity_threshold must be between -1.0 and 1.0"
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(anyhow!("retrieval.top_k must be at least 1"));
        }
        Ok(())
    }

    /// Configuration keys accepted by `get` and `set`
    pub fn keys() -> &'static [&'static str] {
        &[
            "storage.data_dir",
            "storage.knowledge_file",
            "storage.ledger_file",
            "storage.index_file",
            "retrieval.semantic_weight",
            "retrieval.similarity_threshold",
            "retrieval.top_k",
            "retrieval.audit_threshold",
            "embedding.provider",
            "embedding.model",
            "embedding.base_url",
            "embedding.timeout_secs",
            "embedding.api_key",
        ]
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Storage settings
            "storage.data_dir" => Ok(self.storage.resolved_data_dir()?.display().to_string()),
            "storage.knowledge_file" => Ok(self.storage.knowledge_file.clone()),
            "storage.ledger_file" => Ok(self.storage.ledger_file.clone()),
            "storage.index_file" => Ok(self.storage.index_file.clone()),

            // Retrieval settings
            "retrieval.semantic_weight" => Ok(self.retrieval.semantic_weight.to_string()),
            "retrieval.similarity_threshold" => {
                Ok(self.retrieval.similarity_threshold.to_string())
            }
            "retrieval.top_k" => Ok(self.retrieval.top_k.to_string()),
            "retrieval.audit_threshold" => Ok(self.retrieval.audit_threshold.to_string()),

            // Embedding settings
            "embedding.provider" => Ok(self.embedding.provider.as_str().to_string()),
            "embedding.model" => Ok(self.embedding.model.clone()),
            "embedding.base_url" => Ok(self.embedding.base_url.clone()),
            "embedding.timeout_secs" => Ok(self.embedding.timeout_secs.to_string()),

            // API key (special handling - show redacted)
            "embedding.api_key" => match self.embedding.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(format!("(not set - use {} env var)", API_KEY_ENV_VARS.join(" or "))),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `lurekb config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            // Storage settings
            "storage.data_dir" => {
                self.storage.data_dir = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "storage.knowledge_file" => self.storage.knowledge_file = file_name(key, value)?,
            "storage.ledger_file" => self.storage.ledger_file = file_name(key, value)?,
            "storage.index_file" => self.storage.index_file = file_name(key, value)?,

            // Retrieval settings
            "retrieval.semantic_weight" => {
                let weight: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid semantic_weight value: {}", value))?;
                if !(0.0..=1.0).contains(&weight) {
                    return Err(anyhow!("Semantic weight must be between 0.0 and 1.0"));
                }
                self.retrieval.semantic_weight = weight;
            }
            "retrieval.similarity_threshold" => {
                let threshold: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid similarity_threshold value: {}", value))?;
                if !(-1.0..=1.0).contains(&threshold) {
                    return Err(anyhow!("Similarity threshold must be between -1.0 and 1.0"));
                }
                self.retrieval.similarity_threshold = threshold;
            }
            "retrieval.top_k" => {
                let top_k: usize = value
                    .parse()
                    .with_context(|| format!("Invalid top_k value: {}", value))?;
                if top_k == 0 {
                    return Err(anyhow!("top_k must be at least 1"));
                }
                self.retrieval.top_k = top_k;
            }
            "retrieval.audit_threshold" => {
                let threshold: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid audit_threshold value: {}", value))?;
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(anyhow!("Audit threshold must be between 0.0 and 1.0"));
                }
                self.retrieval.audit_threshold = threshold;
            }

            // Embedding settings
            "embedding.provider" => {
                self.embedding.provider = match value.trim().to_lowercase().as_str() {
                    "none" => EmbeddingProvider::None,
                    "openai" => EmbeddingProvider::Openai,
                    _ => {
                        return Err(anyhow!(
                            "Invalid embedding provider: {}. Valid options: none, openai",
                            value
                        ));
                    }
                };
            }
            "embedding.model" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("Embedding model must not be empty"));
                }
                self.embedding.model = value.trim().to_string();
            }
            "embedding.base_url" => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(anyhow!("Base URL must start with http:// or https://"));
                }
                self.embedding.base_url = value.trim_end_matches('/').to_string();
            }
            "embedding.timeout_secs" => {
                self.embedding.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            // API key cannot be set via config
            "embedding.api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the {} environment variable instead.",
                    API_KEY_ENV_VARS.join(" or ")
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `lurekb config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        Self::keys()
            .iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }
}

fn file_name(key: &str, value: &str) -> anyhow::Result<String> {
    let value = value.trim();
    if value.is_empty() || value.contains('/') || value.contains('\\') {
        return Err(anyhow!("{} must be a plain file name", key));
    }
    Ok(value.to_string())
}
