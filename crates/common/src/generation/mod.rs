//! Text generation engines
//!
//! Provides:
//! - `GenerationEngine`: completes a fully rendered prompt
//! - `CompletionEngine`: OpenAI-compatible `/completions` server (llama.cpp, vLLM)
//! - `MockEngine`: canned responses for development

use crate::config::GenerationConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Generation failures
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation server returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("generation response had no choices")]
    EmptyResponse,

    #[error("unknown generation provider: {0}")]
    UnknownProvider(String),
}

/// Decoding parameters sent with every prompt
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,

    /// Never echo the prompt back
    pub echo: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.3,
            top_p: 0.9,
            repeat_penalty: 1.1,
            echo: false,
        }
    }
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            repeat_penalty: config.repeat_penalty,
            echo: false,
        }
    }
}

/// Trait for prompt completion
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Complete `prompt`, returning the raw text of the first choice
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, GenerationError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible text completion client
pub struct CompletionEngine {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(flatten)]
    params: &'a GenerationParams,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

impl CompletionEngine {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/completions", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl GenerationEngine for CompletionEngine {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, GenerationError> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            params,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, body });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(format!("Failed to parse response: {}", e)))?;

        first_choice(completion)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn first_choice(response: CompletionResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.text.trim().to_string())
        .ok_or(GenerationError::EmptyResponse)
}

/// Mock engine for development
pub struct MockEngine;

#[async_trait]
impl GenerationEngine for MockEngine {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, GenerationError> {
        let question = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Question: "))
            .unwrap_or("the question");
        Ok(format!(
            "This is a mock answer about {}. Configure a generation endpoint for real output.",
            question.trim()
        ))
    }

    fn model_name(&self) -> &str {
        "mock-generation"
    }
}

/// Create a generation engine based on configuration
pub fn create_engine(config: &GenerationConfig) -> Result<Arc<dyn GenerationEngine>, GenerationError> {
    match config.provider.as_str() {
        "completion" => Ok(Arc::new(CompletionEngine::new(config)?)),
        "mock" => {
            tracing::warn!("Using mock generation engine");
            Ok(Arc::new(MockEngine))
        }
        other => Err(GenerationError::UnknownProvider(other.to_string())),
    }
}
