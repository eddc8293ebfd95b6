//! Configuration management
//!
//! Handles configuration from environment variables and TOML files with
//! sensible defaults for development. Thresholds and policies live here,
//! not in code: acceptable false-positive rates are a product decision.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// External model / classifier settings
    pub classifier: ClassifierConfig,

    /// Confidence scoring thresholds
    pub scoring: ScoringConfig,

    /// Duplicate detection settings
    pub dedup: DedupConfig,

    /// Batch orchestration settings
    pub batch: BatchConfig,

    /// Similarity query defaults
    pub similarity: SimilarityConfig,

    /// Relationship graph policy
    pub graph: GraphConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(provider) = std::env::var("MODEL_PROVIDER") {
            config.classifier.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.classifier.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.classifier.ollama_url = url;
        }
        if let Ok(model) = std::env::var("CLASSIFY_MODEL") {
            config.classifier.model = model;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.classifier.embedding_model = model;
        }

        if let Ok(value) = std::env::var("ACCEPT_THRESHOLD") {
            config.scoring.accept_threshold = parse_value("ACCEPT_THRESHOLD", &value)?;
        }
        if let Ok(value) = std::env::var("REVIEW_THRESHOLD") {
            config.scoring.review_threshold = parse_value("REVIEW_THRESHOLD", &value)?;
        }

        if let Ok(value) = std::env::var("DEDUP_SIMILARITY_THRESHOLD") {
            config.dedup.similarity_threshold = parse_value("DEDUP_SIMILARITY_THRESHOLD", &value)?;
        }

        if let Ok(value) = std::env::var("BATCH_REQUESTS_PER_MINUTE") {
            config.batch.requests_per_minute = parse_value("BATCH_REQUESTS_PER_MINUTE", &value)?;
        }
        if let Ok(value) = std::env::var("BATCH_SUB_BATCH_SIZE") {
            config.batch.sub_batch_size = parse_value("BATCH_SUB_BATCH_SIZE", &value)?;
        }
        if let Ok(value) = std::env::var("BATCH_WORKERS") {
            config.batch.worker_count = parse_value("BATCH_WORKERS", &value)?;
        }
        if let Ok(path) = std::env::var("CHECKPOINT_PATH") {
            config.batch.checkpoint_path = PathBuf::from(path);
        }

        if let Ok(policy) = std::env::var("EDGE_POLICY") {
            config.graph.edge_policy = policy.parse()?;
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        // Always use env for sensitive values
        if env_config.classifier.openai_api_key.is_some() {
            self.classifier.openai_api_key = env_config.classifier.openai_api_key;
        }
        if env_config.classifier.provider != ClassifierConfig::default().provider {
            self.classifier.provider = env_config.classifier.provider;
        }

        Ok(self)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// External model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Model provider to use for the external tier
    pub provider: ModelProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Classification model name
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Classification cache capacity (entries)
    pub cache_capacity: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::OpenAi,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            timeout_secs: 30,
            cache_capacity: 10_000,
        }
    }
}

/// Supported external model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    OpenAi,
    Ollama,
}

impl std::str::FromStr for ModelProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "MODEL_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Confidence scoring thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// At or above this confidence a classification is auto-accepted
    pub accept_threshold: f32,

    /// Below this confidence the type is forced to unknown. Between the
    /// two thresholds the result is accepted but flagged for review.
    pub review_threshold: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.75,
            review_threshold: 0.45,
        }
    }
}

/// Duplicate detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Minimum string similarity to consider two names duplicates.
    /// Conservative default: merging two distinct people is a worse error
    /// than leaving two records for the same person.
    pub similarity_threshold: f64,

    /// Maximum match candidates returned per query
    pub max_candidates: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.93,
            max_candidates: 5,
        }
    }
}

/// Batch orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Ceiling for outbound model/embedding calls
    pub requests_per_minute: u32,

    /// Entities per sub-batch; a checkpoint is written after each
    pub sub_batch_size: usize,

    /// Bounded worker pool size
    pub worker_count: usize,

    /// Maximum retry attempts for transient failures
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds (doubles per attempt)
    pub backoff_base_ms: u64,

    /// Longest a worker will wait on the rate limiter before the entity
    /// is deferred to the next sub-batch
    pub limiter_wait_ms: u64,

    /// Checkpoint file location
    pub checkpoint_path: PathBuf,

    /// Permit restarting from scratch when the checkpoint is corrupt.
    /// Off by default: a silent restart re-spends external-call quota.
    pub allow_fresh_start: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 120,
            sub_batch_size: 25,
            worker_count: 4,
            max_attempts: 3,
            backoff_base_ms: 500,
            limiter_wait_ms: 10_000,
            checkpoint_path: PathBuf::from("entigraph-checkpoint.json"),
            allow_fresh_start: false,
        }
    }
}

/// Similarity query defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Default number of neighbors returned
    pub top_k: usize,

    /// Results below this similarity are dropped
    pub min_similarity: f32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_similarity: 0.25,
        }
    }
}

/// Relationship graph policy
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphConfig {
    /// How edge invariant violations are handled
    pub edge_policy: EdgePolicy,
}

/// What to do with an edge that fails construction-time validation.
/// Violations are always surfaced, never silently dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Abort ingestion on the first invalid edge
    Strict,
    /// Log the violation, count it, and continue
    #[default]
    LogAndSkip,
}

impl std::str::FromStr for EdgePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "log_and_skip" | "log-and-skip" => Ok(Self::LogAndSkip),
            _ => Err(ConfigError::InvalidValue {
                key: "EDGE_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
