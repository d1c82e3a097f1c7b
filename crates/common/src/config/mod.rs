//! Configuration management for OncoRAG services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Query embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Evidence store (Qdrant) configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Retrieval and context budget configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Generation engine configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Answer cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Query/answer translation configuration
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Bulk ingestion configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds (generation can take tens of seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: encoder, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Path to the encoder's tokenizer.json
    #[serde(default = "default_tokenizer_path")]
    pub tokenizer_path: String,

    /// Inference endpoint returning the encoder's last hidden state
    #[serde(default = "default_encoder_url")]
    pub encoder_url: String,

    /// Model name (informational, reported in logs and metrics)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Tokenizer truncation and padding length
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries against the encoder endpoint
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Qdrant REST URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Optional Qdrant API key
    pub api_key: Option<String>,

    /// Collection holding the evidence passages
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Expected vector dimension of the collection
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Number of nearest neighbours requested
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for a hit to count as evidence
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// Per-passage character cap inside the context window
    #[serde(default = "default_per_passage_chars")]
    pub per_passage_chars: usize,

    /// Global character cap of the context window
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Generation provider: completion, mock
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// Base URL of an OpenAI-compatible completion server (llama.cpp)
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with each request
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Optional bearer token
    pub api_key: Option<String>,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling threshold
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Repetition penalty
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum number of cached answers
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslationConfig {
    /// Translate queries in and answers out
    #[serde(default)]
    pub enabled: bool,

    /// LibreTranslate-compatible endpoint
    #[serde(default = "default_translation_endpoint")]
    pub endpoint: String,

    /// Optional API key
    pub api_key: Option<String>,

    /// Language of incoming queries and outgoing answers
    #[serde(default = "default_user_lang")]
    pub user_lang: String,

    /// Language the model answers in
    #[serde(default = "default_model_lang")]
    pub model_lang: String,

    /// Request timeout in seconds
    #[serde(default = "default_translation_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Directory scanned for source documents
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Points per upsert request
    #[serde(default = "default_ingestion_batch_size")]
    pub batch_size: usize,

    /// File extension of source documents
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 600 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_embedding_provider() -> String { "encoder".to_string() }
fn default_tokenizer_path() -> String { "models/biobert-v1.1/tokenizer.json".to_string() }
fn default_encoder_url() -> String { "http://encoder:8080/hidden-states".to_string() }
fn default_embedding_model() -> String { DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { DEFAULT_EMBEDDING_DIMENSION }
fn default_max_length() -> usize { 512 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_store_url() -> String { "http://qdrant:6333".to_string() }
fn default_collection() -> String { DEFAULT_COLLECTION.to_string() }
fn default_store_timeout() -> u64 { 10 }
fn default_top_k() -> usize { 5 }
fn default_score_threshold() -> f32 { 0.4 }
fn default_per_passage_chars() -> usize { 700 }
fn default_max_context_chars() -> usize { 5000 }
fn default_generation_provider() -> String { "completion".to_string() }
fn default_generation_endpoint() -> String { "http://llm:8080/v1".to_string() }
fn default_generation_model() -> String { "JSL-Med-Phi-3.5-Mini-v3.i1-Q4_K_M".to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_temperature() -> f32 { 0.3 }
fn default_top_p() -> f32 { 0.9 }
fn default_repeat_penalty() -> f32 { 1.1 }
fn default_generation_timeout() -> u64 { 300 }
fn default_cache_capacity() -> usize { 100 }
fn default_translation_endpoint() -> String { "http://translate:5000".to_string() }
fn default_user_lang() -> String { "ru".to_string() }
fn default_model_lang() -> String { "en".to_string() }
fn default_translation_timeout() -> u64 { 15 }
fn default_source_dir() -> String { "/data/files".to_string() }
fn default_ingestion_batch_size() -> usize { 16 }
fn default_extension() -> String { "txt".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "oncorag".to_string() }
fn default_rate_limit() -> u32 { 5 }
fn default_burst() -> u32 { 10 }
fn default_enabled() -> bool { false }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__SCORE_THRESHOLD=0.5
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject configurations that would break store/encoder agreement
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension != self.store.dimension {
            return Err(ConfigError::Message(format!(
                "embedding.dimension ({}) must equal store.dimension ({})",
                self.embedding.dimension, self.store.dimension
            )));
        }
        if !(0.0..=1.0).contains(&self.retrieval.score_threshold) {
            return Err(ConfigError::Message(format!(
                "retrieval.score_threshold must be within [0, 1], got {}",
                self.retrieval.score_threshold
            )));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Message("cache.capacity must be at least 1".into()));
        }
        if self.rate_limit.enabled && (self.rate_limit.requests_per_second == 0 || self.rate_limit.burst == 0) {
            return Err(ConfigError::Message(
                "rate_limit.requests_per_second and rate_limit.burst must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            tokenizer_path: default_tokenizer_path(),
            encoder_url: default_encoder_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            max_length: default_max_length(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            api_key: None,
            collection: default_collection(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_store_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            per_passage_chars: default_per_passage_chars(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            endpoint: default_generation_endpoint(),
            model: default_generation_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_translation_endpoint(),
            api_key: None,
            user_lang: default_user_lang(),
            model_lang: default_model_lang(),
            timeout_secs: default_translation_timeout(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            batch_size: default_ingestion_batch_size(),
            extension: default_extension(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            cache: CacheConfig::default(),
            translation: TranslationConfig::default(),
            ingestion: IngestionConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
