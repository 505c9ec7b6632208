//! Configuration management for clipbrain
//!
//! Loads the TOML configuration, applies profile and environment overrides and
//! validates the result before any component is constructed from it.

use crate::error::{BrainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retry: RetryConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub analytics: AnalyticsConfig,
    pub learning: LearningConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
    pub pool_size: u32,
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

/// Retry policy applied to every embedding call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Videos indexed concurrently during a bulk reindex
    pub max_concurrency: usize,
    /// Reuse the stored embedding when a fragment's text hash is unchanged
    pub reuse_unchanged_embeddings: bool,
}

/// Ranking weights used when the owner has no account context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub similarity: f64,
    pub retention: f64,
    pub saves: f64,
    pub follows: f64,
    pub for_you: f64,
    pub recency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            similarity: 0.5,
            retention: 0.2,
            saves: 0.15,
            follows: 0.1,
            for_you: 0.05,
            recency: 0.1,
        }
    }
}

/// Search and ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched per requested hit
    pub oversample_factor: usize,
    pub max_top_k: usize,
    /// Max cosine similarity between diversified hits
    pub diversity_threshold: f32,
    pub recency_halflife_days: f64,
    pub weights: ScoringWeights,
}

/// Analytics derivation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub min_corpus_videos: usize,
    pub cluster_similarity_threshold: f32,
    pub min_cluster_size: usize,
    pub max_top_videos: usize,
    pub trend_margin: f64,
    pub prediction_neighbors: usize,
    pub confidence_floor: f64,
    pub insight_confidence_floor: f64,
    pub anomaly_std_devs: f64,
}

/// Bounds for the outcome feedback loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    pub learning_rate: f64,
    pub min_weight: f64,
    pub max_weight: f64,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diversity_threshold: Option<f32>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BrainError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BrainError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| BrainError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| BrainError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(concurrency) = overrides.max_concurrency {
            self.indexing.max_concurrency = concurrency;
        }
        if let Some(threshold) = overrides.diversity_threshold {
            self.retrieval.diversity_threshold = threshold;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: CLIPBRAIN_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("CLIPBRAIN_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__TIMEOUT_MS" => {
                self.embedding.timeout_ms = parse_env(path, value)?;
            }
            "INDEXING__MAX_CONCURRENCY" => {
                self.indexing.max_concurrency = parse_env(path, value)?;
            }
            "RETRY__MAX_RETRIES" => {
                self.retry.max_retries = parse_env(path, value)?;
            }
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| BrainError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("clipbrain").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| BrainError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".clipbrain"))
    }

    /// Resolved database path, with a leading `~/` expanded
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(expand_home(&self.storage.data_dir)?.join(&self.storage.database_file))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| BrainError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| BrainError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| BrainError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.clipbrain"),
                database_file: "brain.sqlite".to_string(),
                pool_size: 8,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                timeout_ms: 10_000,
            },
            retry: RetryConfig {
                max_retries: 3,
                base_delay_ms: 200,
                max_delay_ms: 5_000,
            },
            indexing: IndexingConfig {
                max_concurrency: 4,
                reuse_unchanged_embeddings: true,
            },
            retrieval: RetrievalConfig {
                oversample_factor: 4,
                max_top_k: 100,
                diversity_threshold: 0.92,
                recency_halflife_days: 30.0,
                weights: ScoringWeights::default(),
            },
            analytics: AnalyticsConfig {
                min_corpus_videos: 5,
                cluster_similarity_threshold: 0.80,
                min_cluster_size: 3,
                max_top_videos: 5,
                trend_margin: 0.25,
                prediction_neighbors: 10,
                confidence_floor: 40.0,
                insight_confidence_floor: 50.0,
                anomaly_std_devs: 2.0,
            },
            learning: LearningConfig {
                learning_rate: 0.05,
                min_weight: 0.1,
                max_weight: 0.8,
            },
            profiles: HashMap::new(),
        }
    }
}
