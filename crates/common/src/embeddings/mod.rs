//! Query embedding
//!
//! Provides a unified interface over embedding backends:
//! - `PooledEmbedder`: tokenizer + transformer encoder + masked mean pooling
//! - `MockEmbedder`: random vectors for development without a model

mod encoder;
mod pooling;
mod tokenize;

pub use encoder::{HttpEncoder, PooledEmbedder, TokenEncoder};
pub use pooling::{mean_pool, MASK_FLOOR};
pub use tokenize::{QueryTokenizer, TokenizedInput};

use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Embedding failures. None of these ever degrade into a zero vector.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Failed to load tokenizer: {0}")]
    TokenizerLoad(String),

    #[error("Failed to tokenize text: {0}")]
    Tokenize(String),

    #[error("Encoder request failed: {0}")]
    Encoder(String),

    #[error("Encoder ran out of memory: {0}")]
    OutOfMemory(String),

    #[error("Encoder output shape mismatch: {0}")]
    Shape(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("Unknown embedding provider: {0}")]
    UnknownProvider(String),
}

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Release accelerator memory held after inference
    fn reclaim_memory(&self) {}
}

/// Mock embedder for development without an encoder
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        Ok((0..self.dimension).map(|_| rng.gen::<f32>()).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.provider.as_str() {
        "encoder" => {
            let tokenizer = QueryTokenizer::from_file(&config.tokenizer_path, config.max_length)?;
            let encoder = HttpEncoder::new(
                config.encoder_url.clone(),
                Duration::from_secs(config.timeout_secs),
                config.max_retries,
            )?;
            Ok(Arc::new(PooledEmbedder::new(
                tokenizer,
                Arc::new(encoder),
                config.model.clone(),
                config.dimension,
            )))
        }
        "mock" => {
            tracing::warn!("Using mock embedder, retrieval results will be meaningless");
            Ok(Arc::new(MockEmbedder::new(config.dimension)))
        }
        other => Err(EmbeddingError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new(768);
        let embedding = embedder.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 768);
    }

    #[tokio::test]
    async fn test_mock_batch() {
        let embedder = MockEmbedder::new(768);
        let texts = vec!["text1".to_string(), "text2".to_string()];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 768);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(EmbeddingError::UnknownProvider(_))
        ));
    }
}
