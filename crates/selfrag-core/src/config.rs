//! Self-RAG Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with defaults matching the reference pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Vector search configuration
    pub vector: VectorConfig,

    /// Self-RAG loop configuration
    pub self_rag: SelfRagConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
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
        self.apply_env()?;
        Ok(self)
    }

    /// Check values that would make a run meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.self_rag.validate()
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(model) = std::env::var("GRADER_MODEL") {
            self.llm.grader_model = Some(model);
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }

        // Qdrant
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.vector.qdrant_url = url;
        }
        if let Ok(collection) = std::env::var("QDRANT_COLLECTION") {
            self.vector.collection = collection;
        }

        // Loop bounds
        if let Ok(top_k) = std::env::var("SELF_RAG_TOP_K") {
            self.self_rag.top_k = parse_env("SELF_RAG_TOP_K", top_k)?;
        }
        if let Ok(steps) = std::env::var("SELF_RAG_MAX_STEPS") {
            self.self_rag.max_steps = parse_env("SELF_RAG_MAX_STEPS", steps)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model used for answer generation
    pub model: String,

    /// Model used by the gates and the query rewriter (defaults to `model`)
    pub grader_model: Option<String>,

    /// Embedding model name
    pub embedding_model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Model name used for grading calls
    pub fn grader_model(&self) -> &str {
        self.grader_model.as_deref().unwrap_or(&self.model)
    }

    /// OpenAI API key, required by the OpenAI completer and embedder
    pub fn require_openai_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired("OPENAI_API_KEY".to_string()))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            grader_model: None,
            embedding_model: "text-embedding-3-large".to_string(),
            max_tokens: 512,
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Vector search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Qdrant collection name
    pub collection: String,

    /// Vector dimension (must match embedding model)
    pub vector_dimension: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "pdf_test_collection".to_string(),
            vector_dimension: 3072, // text-embedding-3-large
        }
    }
}

/// Self-RAG loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfRagConfig {
    /// Passages retrieved per query
    pub top_k: usize,

    /// Minimum relevance score (1-10) for the context to pass
    pub relevance_threshold: u8,

    /// Helpfulness score that counts as helpful
    pub helpfulness_pass_score: u8,

    /// Regenerations allowed after a hallucination verdict
    pub max_regenerations: u32,

    /// Query rewrites allowed after an unhelpful verdict
    pub max_rewrites: u32,

    /// Total node executions allowed per run
    pub max_steps: u32,

    /// Wall-clock budget for each external call, in seconds
    pub call_timeout_secs: u64,

    /// Term substitutions offered to the query rewriter
    pub glossary: Vec<String>,
}

impl SelfRagConfig {
    /// Per-call timeout as a duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Reject configurations that cannot produce a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(invalid("self_rag.top_k", self.top_k));
        }
        if !(1..=10).contains(&self.relevance_threshold) {
            return Err(invalid(
                "self_rag.relevance_threshold",
                self.relevance_threshold,
            ));
        }
        if self.max_steps == 0 {
            return Err(invalid("self_rag.max_steps", self.max_steps));
        }
        if self.call_timeout_secs == 0 {
            return Err(invalid(
                "self_rag.call_timeout_secs",
                self.call_timeout_secs,
            ));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl Default for SelfRagConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            relevance_threshold: 7,
            helpfulness_pass_score: 1,
            max_regenerations: 3,
            max_rewrites: 2,
            // two full rewrite cycles plus regenerations
            max_steps: 24,
            call_timeout_secs: 60,
            glossary: vec!["person-referring expressions -> resident".to_string()],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
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

impl From<ConfigError> for crate::SelfRagError {
    fn from(err: ConfigError) -> Self {
        crate::SelfRagError::ConfigError(err.to_string())
    }
}
