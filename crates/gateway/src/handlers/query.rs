//! Oncology query handler
//!
//! The body is one question, sent as a JSON string, as `{"query": "..."}`,
//! or as plain text. The response is the answer as a JSON string.

use axum::{extract::State, Json};
use serde::Deserialize;
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use oncorag_common::{
    errors::{AppError, Result},
    translation::translate_or_original,
};

/// Longest accepted question, in characters
pub const MAX_QUERY_CHARS: usize = 4000;
// `validator` length bounds are u64; same value as MAX_QUERY_CHARS.
const MAX_QUERY_CHARS_U64: u64 = MAX_QUERY_CHARS as u64;

/// Query request
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = MAX_QUERY_CHARS_U64))]
    pub query: String,
}

/// Accept the three supported body shapes
pub fn parse_body(body: &str) -> Result<QueryRequest> {
    let trimmed = body.trim();

    let request = if trimmed.starts_with('"') {
        QueryRequest {
            query: serde_json::from_str::<String>(trimmed).map_err(|e| AppError::InvalidFormat {
                message: format!("Invalid JSON string: {}", e),
            })?,
        }
    } else if trimmed.starts_with('{') {
        serde_json::from_str::<QueryRequest>(trimmed).map_err(|e| AppError::InvalidFormat {
            message: format!("Invalid query object: {}", e),
        })?
    } else {
        QueryRequest {
            query: trimmed.to_string(),
        }
    };

    let request = QueryRequest {
        query: request.query.trim().to_string(),
    };

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("query".to_string()),
    })?;

    Ok(request)
}

/// Answer one oncology question
pub async fn oncology_query(State(state): State<AppState>, body: String) -> Result<Json<String>> {
    let start = Instant::now();
    let request = parse_body(&body)?;

    let languages = &state.config.translation;
    let query = translate_or_original(
        state.translator.as_ref(),
        &request.query,
        &languages.user_lang,
        &languages.model_lang,
    )
    .await;

    let answer = state.pipeline.answer(&query).await?;

    let text = translate_or_original(
        state.translator.as_ref(),
        &answer.text,
        &languages.model_lang,
        &languages.user_lang,
    )
    .await;

    tracing::info!(
        outcome = answer.outcome.as_str(),
        cached = answer.cached,
        evidence = answer.evidence_count,
        processing_time_ms = start.elapsed().as_millis() as u64,
        "Query answered"
    );

    Ok(Json(text))
}
