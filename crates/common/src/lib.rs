//! OncoRAG Common Library
//!
//! Shared code for the OncoRAG services including:
//! - Query embedding (tokenization + masked mean pooling)
//! - Evidence store client (Qdrant)
//! - Context assembly, prompt building and response normalization
//! - Generation engine adapter
//! - The answer pipeline and its LRU answer cache
//! - Error types, configuration, metrics and translation

pub mod cache;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod generation;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod testing;
pub mod translation;

// Re-export commonly used types
pub use cache::AnswerCache;
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use generation::GenerationEngine;
pub use pipeline::{Answer, AnswerOutcome, RagPipeline};
pub use store::{EvidenceHit, EvidenceStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "dmis-lab/biobert-v1.1";

/// Embedding dimension shared by the encoder and the evidence collection
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Name of the evidence collection
pub const DEFAULT_COLLECTION: &str = "medical_texts_local";
