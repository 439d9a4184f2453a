//! Configuration management for docindex
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::store::RetrievalMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Ingestion behaviour
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Retrieval pipeline settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Reranker chain, applied in declaration order
    #[serde(default)]
    pub rerankers: Vec<RerankerConfig>,

    /// LLM relevance scorer
    #[serde(default)]
    pub scorer: ScorerConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend name: "http", "hashing" or "fastembed"
    #[serde(default = "default_embedding_backend")]
    pub backend: String,

    /// Base URL of the embedding service (http backend)
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Owner recorded when the caller does not name one
    #[serde(default)]
    pub default_user: Option<String>,

    /// Treat an identical file under another name as already indexed
    #[serde(default)]
    pub match_content_hash: bool,

    /// Maximum characters per chunk for the plain-text loader
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// File types accepted by indices created with `indices create`
    #[serde(default = "default_supported_file_types")]
    pub supported_file_types: String,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks returned after reranking
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// vector, text or hybrid
    #[serde(default)]
    pub mode: RetrievalMode,

    /// Diversify the first round with maximal marginal relevance
    #[serde(default)]
    pub mmr: bool,

    /// Pull in sibling chunks from the pages of retrieved results
    #[serde(default)]
    pub get_extra_table: bool,

    /// Candidate widening factor for the first retrieval round
    #[serde(default = "default_first_round_multiplier")]
    pub first_round_multiplier: usize,
}

/// One stage of the reranker chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Backend name: "http", "min-score" or "fastembed"
    #[serde(default = "default_reranker_backend")]
    pub backend: String,

    /// Model name/identifier for cross-encoder reranker
    #[serde(default = "default_reranker_model")]
    pub model: String,

    /// Base URL of the rerank service (http backend)
    #[serde(default = "default_reranker_url")]
    pub url: String,

    /// Number of results kept after this stage
    #[serde(default = "default_reranker_top_k")]
    pub top_k: usize,

    /// Results scoring below this are dropped (min-score backend)
    #[serde(default = "default_reranker_min_score")]
    pub min_score: f32,
}

/// LLM relevance scorer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Annotate results with an LLM relevance score
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible chat endpoint
    #[serde(default = "default_scorer_url")]
    pub url: String,

    /// Chat model used for scoring
    #[serde(default = "default_scorer_model")]
    pub model: String,

    /// Environment variable holding the API key, if any
    #[serde(default = "default_scorer_api_key_env")]
    pub api_key_env: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for docindex data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the catalog database
    pub db_file: PathBuf,

    /// Path to the document store database
    pub docstore_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            collection_name: default_collection_name(),
            embedding: EmbeddingConfig::default(),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerankers: Vec::new(),
            scorer: ScorerConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            default_user: None,
            match_content_hash: false,
            max_chunk_chars: default_max_chunk_chars(),
            supported_file_types: default_supported_file_types(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            mode: RetrievalMode::default(),
            mmr: false,
            get_extra_table: false,
            first_round_multiplier: default_first_round_multiplier(),
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            backend: default_reranker_backend(),
            model: default_reranker_model(),
            url: default_reranker_url(),
            top_k: default_reranker_top_k(),
            min_score: default_reranker_min_score(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_scorer_url(),
            model: default_scorer_model(),
            api_key_env: default_scorer_api_key_env(),
        }
    }
}

impl PathsConfig {
    fn rooted_at(base: PathBuf, config_file: PathBuf) -> Self {
        Self {
            config_file,
            db_file: base.join("catalog.db"),
            docstore_file: base.join("docstore.db"),
            base_dir: base,
        }
    }
}

impl Config {
    /// Get the default base directory for docindex (~/.docindex)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docindex")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig::rooted_at(base.clone(), base.join("config.toml"));
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        config.paths = PathsConfig::rooted_at(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Owner used when the caller does not pass one
    pub fn effective_user(&self, user: Option<String>) -> Option<String> {
        user.or_else(|| self.indexing.default_user.clone())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be positive".to_string(),
            ));
        }

        if self.indexing.max_chunk_chars == 0 {
            return Err(Error::Config(
                "indexing.max_chunk_chars must be positive".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be positive".to_string()));
        }

        if self.retrieval.first_round_multiplier == 0 {
            return Err(Error::Config(
                "retrieval.first_round_multiplier must be >= 1".to_string(),
            ));
        }

        for (position, reranker) in self.rerankers.iter().enumerate() {
            if reranker.top_k == 0 {
                return Err(Error::Config(format!(
                    "rerankers[{}].top_k must be positive",
                    position
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.collection_name, "docindex_chunks");
        assert_eq!(config.retrieval.mode, RetrievalMode::Hybrid);
        assert!(config.rerankers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.collection_name = "test_collection".to_string();
        config.rerankers.push(RerankerConfig {
            backend: "min-score".to_string(),
            min_score: 0.25,
            ..Default::default()
        });

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load(&config.paths.config_file).unwrap();
        assert_eq!(loaded.collection_name, "test_collection");
        assert_eq!(loaded.rerankers.len(), 1);
        assert_eq!(loaded.rerankers[0].backend, "min-score");
        assert_eq!(loaded.paths.db_file, tmp.path().join("catalog.db"));
        assert_eq!(loaded.paths.docstore_file, tmp.path().join("docstore.db"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            collection_name = "papers"

            [retrieval]
            mode = "text"
            mmr = true
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval.mode, RetrievalMode::Text);
        assert!(config.retrieval.mmr);
        assert_eq!(config.retrieval.top_k, default_top_k());
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());

        config.retrieval.top_k = 5;
        config.retrieval.first_round_multiplier = 0;
        assert!(config.validate().is_err());

        config.retrieval.first_round_multiplier = 1;
        assert!(config.validate().is_ok());
    }
}
