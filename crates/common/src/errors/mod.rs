//! Error types for OncoRAG services
//!
//! Provides:
//! - A top-level `AppError` for the serving boundary and startup paths
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling
//!
//! Component errors (`EmbeddingError`, `StoreError`, `GenerationError`,
//! `TranslationError`) live next to their components and convert into
//! `AppError` here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embeddings::EmbeddingError;
use crate::generation::GenerationError;
use crate::store::StoreError;
use crate::translation::TranslationError;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Rate limiting (6xxx)
    RateLimited,

    // Evidence store errors (7xxx)
    SchemaMismatch,
    StoreUnavailable,

    // External model errors (8xxx)
    EmbeddingError,
    GenerationError,
    TranslationError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Store (7xxx)
            ErrorCode::SchemaMismatch => 7001,
            ErrorCode::StoreUnavailable => 7002,

            // External (8xxx)
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::GenerationError => 8003,
            ErrorCode::TranslationError => 8004,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Evidence store errors
    #[error("Evidence collection schema mismatch: expected dimension {expected}, found {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Evidence store unavailable: {message}")]
    StoreUnavailable { message: String },

    // External model errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            AppError::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            AppError::Embedding(_) => ErrorCode::EmbeddingError,
            AppError::Generation(_) => ErrorCode::GenerationError,
            AppError::Translation(_) => ErrorCode::TranslationError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidFormat { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::SchemaMismatch { .. } | AppError::Configuration { .. } | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Embedding(_)
            | AppError::Generation(_)
            | AppError::Translation(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether this error must stop the process rather than a single request
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::SchemaMismatch { .. } | AppError::Configuration { .. })
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Schema { expected, actual } => AppError::SchemaMismatch { expected, actual },
            other => AppError::StoreUnavailable {
                message: other.to_string(),
            },
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_is_fatal() {
        let err: AppError = StoreError::Schema {
            expected: 768,
            actual: 384,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::SchemaMismatch);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_transport_error_maps_to_unavailable() {
        let err: AppError = StoreError::Transport {
            message: "connection refused".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::StoreUnavailable);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "query is empty".into(),
            field: Some("query".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_error_codes_are_grouped() {
        assert_eq!(ErrorCode::SchemaMismatch.as_code() / 1000, 7);
        assert_eq!(ErrorCode::GenerationError.as_code() / 1000, 8);
    }
}
