//! Ingestion processor
//!
//! Embeds source documents and upserts them into the evidence collection in
//! fixed-size batches, retrying transient store failures.

use crate::errors::IngestionError;
use crate::scanner::SourceDocument;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use oncorag_common::embeddings::Embedder;
use oncorag_common::metrics;
use oncorag_common::store::{point_id, EvidencePayload, EvidencePoint, QdrantSession, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Destination for vectorized points
#[async_trait]
pub trait PointSink: Send + Sync {
    async fn upsert(&self, points: &[EvidencePoint]) -> Result<(), StoreError>;
}

#[async_trait]
impl PointSink for QdrantSession {
    async fn upsert(&self, points: &[EvidencePoint]) -> Result<(), StoreError> {
        QdrantSession::upsert(self, points).await
    }
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    /// Points written to the store
    pub processed: usize,

    /// Documents that could not be embedded
    pub failed_documents: usize,

    /// Batches dropped after retries were exhausted
    pub failed_batches: usize,
}

/// Vectorizes documents into a point sink
pub struct Vectorizer<S: PointSink> {
    embedder: Arc<dyn Embedder>,
    sink: S,
    batch_size: usize,
    max_elapsed: Duration,
}

impl<S: PointSink> Vectorizer<S> {
    pub fn new(embedder: Arc<dyn Embedder>, sink: S, batch_size: usize) -> Self {
        Self {
            embedder,
            sink,
            batch_size: batch_size.max(1),
            max_elapsed: Duration::from_secs(60),
        }
    }

    /// Upper bound on time spent retrying one batch
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Process every document, batch by batch
    ///
    /// Failed documents and batches are logged and skipped.
    #[instrument(skip(self, documents), fields(documents = documents.len(), batch_size = self.batch_size))]
    pub async fn run(&self, documents: &[SourceDocument]) -> IngestionReport {
        let mut report = IngestionReport::default();
        let batches = documents.len().div_ceil(self.batch_size);

        for (index, batch) in documents.chunks(self.batch_size).enumerate() {
            let points = self.vectorize(batch, &mut report).await;
            // Encoder memory is released before the write, whatever happened above
            self.embedder.reclaim_memory();

            if points.is_empty() {
                continue;
            }

            match self.upsert_with_retry(&points).await {
                Ok(()) => {
                    report.processed += points.len();
                    metrics::record_upsert(points.len());
                    info!(batch = index + 1, batches, points = points.len(), "Batch upserted");
                }
                Err(e) => {
                    report.failed_batches += 1;
                    error!(batch = index + 1, batches, error = %e, "Batch upsert failed");
                }
            }
        }

        info!(
            processed = report.processed,
            failed_documents = report.failed_documents,
            failed_batches = report.failed_batches,
            "Ingestion complete"
        );
        report
    }

    async fn vectorize(&self, batch: &[SourceDocument], report: &mut IngestionReport) -> Vec<EvidencePoint> {
        let mut points = Vec::with_capacity(batch.len());

        for document in batch {
            match self.embedder.embed(&document.text).await {
                Ok(vector) => points.push(EvidencePoint {
                    id: point_id(&document.filename),
                    vector,
                    payload: EvidencePayload::local(document.filename.clone(), document.text.clone()),
                }),
                Err(source) => {
                    report.failed_documents += 1;
                    let e = IngestionError::Embedding {
                        filename: document.filename.clone(),
                        source,
                    };
                    warn!(error = %e, "Skipping document");
                }
            }
        }

        points
    }

    async fn upsert_with_retry(&self, points: &[EvidencePoint]) -> Result<(), StoreError> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        };

        retry(policy, || async {
            self.sink.upsert(points).await.map_err(|e| match e {
                StoreError::Transport { .. } => {
                    warn!(error = %e, "Upsert failed, retrying");
                    backoff::Error::transient(e)
                }
                other => backoff::Error::permanent(other),
            })
        })
        .await
    }
}
