//! Evidence store client
//!
//! Provides:
//! - `EvidenceStore` / `StoreSession`: the capability seam over a vector store
//! - `EvidenceClient`: typed accessor that verifies the collection schema on
//!   connect, runs thresholded top-k search and closes its session when dropped
//! - Stable point ids for ingestion

mod qdrant;

pub use qdrant::{EvidencePayload, EvidencePoint, QdrantSession, QdrantStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{debug, warn};

/// Source tag written by local ingestion
pub const LOCAL_SOURCE_TAG: &str = "local_processing";

/// Store failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// Stored vectors do not match the encoder. Fatal, never retried.
    #[error("collection vector size is {actual}, expected {expected}")]
    Schema { expected: usize, actual: usize },

    #[error("collection '{0}' does not exist")]
    MissingCollection(String),

    #[error("store transport error: {message}")]
    Transport { message: String },

    #[error("unexpected store response: {message}")]
    Decode { message: String },

    #[error("store connection already closed")]
    Closed,
}

impl StoreError {
    pub fn is_schema(&self) -> bool {
        matches!(self, StoreError::Schema { .. })
    }
}

/// One retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceHit {
    /// Cosine similarity, higher is more relevant
    pub score: f32,

    /// Passage text
    pub text: String,

    /// Source identifier (filename, or point id when absent)
    pub source: String,
}

/// Backend able to open sessions against the evidence collection
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Open a new session
    async fn open(&self) -> Result<Box<dyn StoreSession>, StoreError>;

    /// Human-readable target, for logs
    fn describe(&self) -> String;
}

/// One open session against the evidence collection
#[async_trait]
pub trait StoreSession: Send + Sync {
    /// Vector size configured on the collection
    async fn vector_size(&self) -> Result<usize, StoreError>;

    /// Up to `limit` nearest neighbours by cosine similarity
    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<EvidenceHit>, StoreError>;

    /// Release the underlying connection. Must be idempotent.
    fn close(&mut self);
}

/// Result of a search at the client boundary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    /// Hits at or above threshold, best first
    pub hits: Vec<EvidenceHit>,

    /// The store failed and the result was replaced by "no evidence"
    pub degraded: bool,
}

/// Typed accessor over a verified store session
///
/// The session is closed when the client is dropped, on every exit path.
pub struct EvidenceClient {
    session: Option<Box<dyn StoreSession>>,
    dimension: usize,
}

impl EvidenceClient {
    /// Open a session and verify the collection's vector size
    pub async fn connect(store: &dyn EvidenceStore, dimension: usize) -> Result<Self, StoreError> {
        let session = store.open().await?;
        // Wrap first so the session is closed even when verification fails
        let client = Self {
            session: Some(session),
            dimension,
        };
        client.verify_collection().await?;
        debug!(store = %store.describe(), dimension, "Evidence store connected");
        Ok(client)
    }

    /// Assert the stored vector size equals the encoder's
    pub async fn verify_collection(&self) -> Result<(), StoreError> {
        let actual = self.session()?.vector_size().await?;
        if actual != self.dimension {
            return Err(StoreError::Schema {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Thresholded top-k search
    ///
    /// Store errors are logged and turned into an empty, degraded outcome.
    pub async fn search(&self, vector: &[f32], k: usize, threshold: f32) -> SearchOutcome {
        let session = match self.session() {
            Ok(session) => session,
            Err(e) => return degraded(e),
        };

        match session.nearest(vector, k, threshold).await {
            Ok(hits) => SearchOutcome {
                hits: rank_and_filter(hits, k, threshold),
                degraded: false,
            },
            Err(e) => degraded(e),
        }
    }

    /// Close the session now instead of at drop
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            debug!("Evidence store session released");
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> Result<&dyn StoreSession, StoreError> {
        self.session.as_deref().ok_or(StoreError::Closed)
    }
}

impl Drop for EvidenceClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn degraded(error: StoreError) -> SearchOutcome {
    warn!(error = %error, "Evidence search failed, continuing without evidence");
    SearchOutcome {
        hits: Vec::new(),
        degraded: true,
    }
}

/// Keep hits with `score >= threshold` and non-empty text, best first, at most `k`
pub fn rank_and_filter(mut hits: Vec<EvidenceHit>, k: usize, threshold: f32) -> Vec<EvidenceHit> {
    hits.retain(|hit| hit.score >= threshold && !hit.text.is_empty());
    // Stable sort keeps store order among equal scores
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(k);
    hits
}

/// Stable 32-bit point id derived from a source filename
///
/// First 8 hex digits of the SHA-256 of the name.
pub fn point_id(filename: &str) -> u64 {
    let digest = Sha256::digest(filename.as_bytes());
    u64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;

    fn hit(score: f32, text: &str) -> EvidenceHit {
        EvidenceHit {
            score,
            text: text.to_string(),
            source: format!("{}.txt", text),
        }
    }

    #[test]
    fn test_rank_and_filter() {
        let hits = vec![hit(0.5, "b"), hit(0.39, "low"), hit(0.9, "a"), hit(0.4, "edge")];
        let ranked = rank_and_filter(hits, 5, 0.4);
        let texts: Vec<_> = ranked.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "edge"]);
    }

    #[test]
    fn test_rank_and_filter_drops_empty_text_and_limits() {
        let hits = vec![hit(0.9, ""), hit(0.8, "a"), hit(0.7, "b"), hit(0.6, "c")];
        let ranked = rank_and_filter(hits, 2, 0.4);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].text, "a");
    }

    #[test]
    fn test_point_id_is_stable_and_32_bit() {
        let a = point_id("lung_cancer_guidelines.txt");
        assert_eq!(a, point_id("lung_cancer_guidelines.txt"));
        assert_ne!(a, point_id("breast_cancer_guidelines.txt"));
        assert!(a <= u64::from(u32::MAX));
    }

    #[tokio::test]
    async fn test_connect_rejects_dimension_mismatch() {
        let store = FakeStore::new(384, vec![]);
        let result = EvidenceClient::connect(&store, 768).await;
        assert!(matches!(
            result,
            Err(StoreError::Schema {
                expected: 768,
                actual: 384
            })
        ));
        // The session opened for verification is still released
        assert_eq!(store.opened(), 1);
        assert_eq!(store.closed(), 1);
    }

    #[tokio::test]
    async fn test_search_degrades_on_transport_error() {
        let store = FakeStore::new(768, vec![hit(0.9, "a")]).failing_search();
        let client = EvidenceClient::connect(&store, 768).await.unwrap();
        let outcome = client.search(&[0.0; 768], 5, 0.4).await;
        assert!(outcome.degraded);
        assert!(outcome.hits.is_empty());
    }

    #[tokio::test]
    async fn test_drop_closes_session() {
        let store = FakeStore::new(768, vec![]);
        {
            let client = EvidenceClient::connect(&store, 768).await.unwrap();
            assert!(client.is_open());
        }
        assert_eq!(store.closed(), 1);
    }
}
