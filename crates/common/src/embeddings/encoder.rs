//! Transformer encoder backends and the pooled query embedder

use super::{mean_pool, Embedder, EmbeddingError, QueryTokenizer, TokenizedInput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Runs the transformer and returns its last hidden layer
#[async_trait]
pub trait TokenEncoder: Send + Sync {
    /// One row of hidden-size floats per input position
    async fn last_hidden_state(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Release device memory held by the last inference
    fn reclaim_memory(&self) {}
}

/// Encoder served over HTTP by an inference server
///
/// Request: `{"input_ids": [[..]], "attention_mask": [[..]], "token_type_ids": [[..]]}`
/// Response: `{"last_hidden_state": [[[..]]]}` (batch x tokens x hidden)
pub struct HttpEncoder {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct EncodeRequest<'a> {
    input_ids: [&'a [u32]; 1],
    attention_mask: [&'a [u32]; 1],
    token_type_ids: [&'a [u32]; 1],
}

#[derive(Deserialize)]
struct EncodeResponse {
    last_hidden_state: Vec<Vec<Vec<f32>>>,
}

impl HttpEncoder {
    pub fn new(url: String, timeout: Duration, max_retries: u32) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Encoder(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            max_retries: max_retries.max(1),
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (2_u64.pow(attempt)));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(input).await {
                Ok(hidden) => return Ok(hidden),
                // Out-of-memory is not retried
                Err(e @ EmbeddingError::OutOfMemory(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Encoder request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EmbeddingError::Encoder("Unknown error after retries".to_string())))
    }

    async fn make_request(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EncodeRequest {
            input_ids: [input.input_ids.as_slice()],
            attention_mask: [input.attention_mask.as_slice()],
            token_type_ids: [input.token_type_ids.as_slice()],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Encoder(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if body.to_lowercase().contains("out of memory") {
                return Err(EmbeddingError::OutOfMemory(body));
            }
            return Err(EmbeddingError::Encoder(format!("API error {}: {}", status, body)));
        }

        let result: EncodeResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Encoder(format!("Failed to parse response: {}", e)))?;

        result
            .last_hidden_state
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Shape("empty batch in encoder response".to_string()))
    }
}

#[async_trait]
impl TokenEncoder for HttpEncoder {
    async fn last_hidden_state(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.request_with_retry(input).await
    }
}

/// Tokenize, encode, then mean-pool over real tokens
pub struct PooledEmbedder {
    tokenizer: QueryTokenizer,
    encoder: Arc<dyn TokenEncoder>,
    model: String,
    dimension: usize,
}

impl PooledEmbedder {
    pub fn new(tokenizer: QueryTokenizer, encoder: Arc<dyn TokenEncoder>, model: String, dimension: usize) -> Self {
        Self {
            tokenizer,
            encoder,
            model,
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for PooledEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = self.tokenizer.encode(text)?;
        let hidden = self.encoder.last_hidden_state(&input).await?;
        let pooled = mean_pool(&hidden, &input.attention_mask)?;

        if pooled.len() != self.dimension {
            return Err(EmbeddingError::Dimension {
                expected: self.dimension,
                actual: pooled.len(),
            });
        }

        tracing::debug!(
            real_tokens = input.real_tokens(),
            dimension = pooled.len(),
            "Query embedded"
        );
        Ok(pooled)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn reclaim_memory(&self) {
        self.encoder.reclaim_memory();
    }
}

#[cfg(test)]
mod tests {
    use super::super::tokenize::tests::WORD_LEVEL_TOKENIZER;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encoder returning `position + 1` in every hidden unit
    struct RampEncoder {
        hidden_size: usize,
        reclaimed: AtomicUsize,
    }

    #[async_trait]
    impl TokenEncoder for RampEncoder {
        async fn last_hidden_state(&self, input: &TokenizedInput) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok((0..input.len())
                .map(|pos| vec![(pos + 1) as f32; self.hidden_size])
                .collect())
        }

        fn reclaim_memory(&self) {
            self.reclaimed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingEncoder;

    #[async_trait]
    impl TokenEncoder for FailingEncoder {
        async fn last_hidden_state(&self, _input: &TokenizedInput) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::OutOfMemory("CUDA out of memory".to_string()))
        }
    }

    fn embedder(encoder: Arc<dyn TokenEncoder>, dimension: usize) -> PooledEmbedder {
        let tokenizer = QueryTokenizer::from_bytes(WORD_LEVEL_TOKENIZER.as_bytes(), 512).unwrap();
        PooledEmbedder::new(tokenizer, encoder, "test-encoder".to_string(), dimension)
    }

    #[tokio::test]
    async fn test_dimension_for_any_length() {
        let encoder = Arc::new(RampEncoder {
            hidden_size: 768,
            reclaimed: AtomicUsize::new(0),
        });
        let embedder = embedder(encoder, 768);

        let long = vec!["lung"; 2000].join(" ");
        for text in ["", "stage", long.as_str()] {
            let vector = embedder.embed(text).await.unwrap();
            assert_eq!(vector.len(), 768);
        }
    }

    #[tokio::test]
    async fn test_pooling_averages_real_tokens_only() {
        let encoder = Arc::new(RampEncoder {
            hidden_size: 4,
            reclaimed: AtomicUsize::new(0),
        });
        let embedder = embedder(encoder, 4);

        // Only the first three rows (1, 2, 3) are real tokens
        let vector = embedder.embed("stage lung cancer").await.unwrap();
        assert_eq!(vector, vec![2.0; 4]);
    }

    #[tokio::test]
    async fn test_wrong_hidden_size_is_error() {
        let encoder = Arc::new(RampEncoder {
            hidden_size: 384,
            reclaimed: AtomicUsize::new(0),
        });
        let embedder = embedder(encoder, 768);

        let result = embedder.embed("stage").await;
        assert!(matches!(
            result,
            Err(EmbeddingError::Dimension {
                expected: 768,
                actual: 384
            })
        ));
    }

    #[tokio::test]
    async fn test_encoder_failure_propagates() {
        let embedder = embedder(Arc::new(FailingEncoder), 768);
        assert!(matches!(
            embedder.embed("stage").await,
            Err(EmbeddingError::OutOfMemory(_))
        ));
    }

    #[test]
    fn test_reclaim_reaches_encoder() {
        let encoder = Arc::new(RampEncoder {
            hidden_size: 4,
            reclaimed: AtomicUsize::new(0),
        });
        let embedder = embedder(encoder.clone(), 4);
        embedder.reclaim_memory();
        assert_eq!(encoder.reclaimed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_encode_request_shape() {
        let input = TokenizedInput {
            input_ids: vec![101, 7, 102],
            attention_mask: vec![1, 1, 1],
            token_type_ids: vec![0, 0, 0],
        };
        let request = EncodeRequest {
            input_ids: [input.input_ids.as_slice()],
            attention_mask: [input.attention_mask.as_slice()],
            token_type_ids: [input.token_type_ids.as_slice()],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["input_ids"], serde_json::json!([[101, 7, 102]]));
        assert_eq!(json["attention_mask"], serde_json::json!([[1, 1, 1]]));
    }
}
