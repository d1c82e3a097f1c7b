//! Ingestion service error types

use oncorag_common::embeddings::EmbeddingError;
use oncorag_common::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("No non-empty .{extension} files found in {dir}")]
    NoSourceFiles { dir: String, extension: String },

    #[error("Embedding error for {filename}: {source}")]
    Embedding {
        filename: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<oncorag_common::errors::AppError> for IngestionError {
    fn from(e: oncorag_common::errors::AppError) -> Self {
        IngestionError::Config(e.to_string())
    }
}
