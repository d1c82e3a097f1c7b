//! Query and answer translation
//!
//! The pipeline works in the model language. Translation is a best-effort
//! pre/post step: any failure returns the original text.

use crate::config::TranslationConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Translation failures
#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Request(String),

    #[error("translation server returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Trait for text translation
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslationError>;
}

/// Translate, falling back to the input on failure
pub async fn translate_or_original(translator: &dyn Translator, text: &str, source: &str, target: &str) -> String {
    if text.trim().is_empty() || source == target {
        return text.to_string();
    }

    match translator.translate(text, source, target).await {
        Ok(translated) if !translated.trim().is_empty() => translated,
        Ok(_) => text.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, source, target, "Translation failed, using original text");
            text.to_string()
        }
    }
}

/// Returns text unchanged
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String, TranslationError> {
        Ok(text.to_string())
    }
}

/// LibreTranslate-compatible HTTP translator
pub struct HttpTranslator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

impl HttpTranslator {
    pub fn new(config: &TranslationConfig) -> Result<Self, TranslationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TranslationError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/translate", config.endpoint.trim_end_matches('/')),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslationError> {
        let request = TranslateRequest {
            q: text,
            source,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslationError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::Api { status, body });
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::Request(format!("Failed to parse response: {}", e)))?;
        Ok(parsed.translated_text)
    }
}

/// Create a translator based on configuration
pub fn create_translator(config: &TranslationConfig) -> Result<Arc<dyn Translator>, TranslationError> {
    if config.enabled {
        Ok(Arc::new(HttpTranslator::new(config)?))
    } else {
        Ok(Arc::new(PassthroughTranslator))
    }
}
