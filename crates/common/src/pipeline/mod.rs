//! Answer pipeline
//!
//! Sequences one query through embedding, evidence search, context assembly,
//! prompting, generation and normalization:
//!
//! `Idle -> ConnectionAcquired -> EvidenceRetrieved -> ContextBuilt ->
//! Generated -> Normalized -> ConnectionReleased`
//!
//! Every invocation opens its own store session inside an `InvocationScope`.
//! Dropping the scope closes the session and reclaims encoder memory, so both
//! happen on success, on the short-circuit paths, on errors and when the
//! caller drops the future.

use crate::cache::{AnswerCache, CachedAnswer};
use crate::config::AppConfig;
use crate::context::{build_prompt, normalize, ContextAssembler};
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::generation::{GenerationEngine, GenerationParams};
use crate::metrics::{self, AnswerTimer};
use crate::store::{EvidenceClient, EvidenceHit, EvidenceStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Answer returned when no evidence clears the threshold
pub const NO_RELEVANT_DOCUMENTS: &str = "No relevant documents found";

/// Prefix of the user-visible message for a failed generation
pub const GENERATION_ERROR_PREFIX: &str = "Generation error";

/// How an answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Generated from evidence and normalized
    Grounded,
    /// No hit cleared the score threshold
    NoEvidence,
    /// The store failed and was treated as no evidence
    RetrievalDegraded,
    /// The query could not be embedded
    EmbeddingFailed,
    /// The language model call failed
    GenerationFailed,
}

impl AnswerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerOutcome::Grounded => "grounded",
            AnswerOutcome::NoEvidence => "no_evidence",
            AnswerOutcome::RetrievalDegraded => "retrieval_degraded",
            AnswerOutcome::EmbeddingFailed => "embedding_failed",
            AnswerOutcome::GenerationFailed => "generation_failed",
        }
    }

    /// Whether the answer may be memoized
    fn is_cacheable(&self) -> bool {
        matches!(self, AnswerOutcome::Grounded | AnswerOutcome::NoEvidence)
    }
}

/// Final answer for one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub outcome: AnswerOutcome,

    /// Served from the answer cache
    pub cached: bool,

    pub evidence_count: usize,
    pub truncated: bool,
    pub artifacts_stripped: bool,
}

impl Answer {
    fn fallback(text: impl Into<String>, outcome: AnswerOutcome) -> Self {
        Self {
            text: text.into(),
            outcome,
            cached: false,
            evidence_count: 0,
            truncated: false,
            artifacts_stripped: false,
        }
    }

    fn from_cache(entry: CachedAnswer) -> Self {
        let outcome = if entry.evidence_count > 0 {
            AnswerOutcome::Grounded
        } else {
            AnswerOutcome::NoEvidence
        };
        Self {
            text: entry.text,
            outcome,
            cached: true,
            evidence_count: entry.evidence_count,
            truncated: entry.truncated,
            artifacts_stripped: entry.artifacts_stripped,
        }
    }

    fn to_cache(&self) -> CachedAnswer {
        CachedAnswer {
            text: self.text.clone(),
            evidence_count: self.evidence_count,
            truncated: self.truncated,
            artifacts_stripped: self.artifacts_stripped,
        }
    }
}

/// Stages of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    ConnectionAcquired,
    EvidenceRetrieved,
    ContextBuilt,
    Generated,
    Normalized,
    ConnectionReleased,
}

/// Retrieval and generation settings
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub top_k: usize,
    pub score_threshold: f32,
    pub assembler: ContextAssembler,
    pub generation: GenerationParams,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: 0.4,
            assembler: ContextAssembler::default(),
            generation: GenerationParams::default(),
        }
    }
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            score_threshold: config.retrieval.score_threshold,
            assembler: ContextAssembler::from(&config.retrieval),
            generation: GenerationParams::from(&config.generation),
        }
    }
}

/// Resources held by one invocation, released on drop
struct InvocationScope<'a> {
    embedder: &'a dyn Embedder,
    client: Option<EvidenceClient>,
    stage: PipelineStage,
}

impl<'a> InvocationScope<'a> {
    fn new(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder,
            client: None,
            stage: PipelineStage::Idle,
        }
    }

    fn advance(&mut self, stage: PipelineStage) {
        debug!(from = ?self.stage, to = ?stage, "Pipeline stage");
        self.stage = stage;
    }

    /// Take ownership of a connected client so it is closed with the scope
    fn acquire(&mut self, client: EvidenceClient) -> &EvidenceClient {
        self.advance(PipelineStage::ConnectionAcquired);
        self.client.insert(client)
    }
}

impl Drop for InvocationScope<'_> {
    fn drop(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.close();
        }
        self.embedder.reclaim_memory();
        self.advance(PipelineStage::ConnectionReleased);
    }
}

/// Retrieval-augmented answer pipeline
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn EvidenceStore>,
    engine: Arc<dyn GenerationEngine>,
    cache: Arc<AnswerCache>,
    options: PipelineOptions,
}

impl RagPipeline {
    /// Create a pipeline. No store connection is opened here.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn EvidenceStore>,
        engine: Arc<dyn GenerationEngine>,
        cache: Arc<AnswerCache>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            engine,
            cache,
            options,
        }
    }

    pub fn cache(&self) -> &Arc<AnswerCache> {
        &self.cache
    }

    /// Open a session, check the collection schema and release it
    pub async fn verify_store(&self) -> Result<()> {
        let mut client = EvidenceClient::connect(self.store.as_ref(), self.embedder.dimension()).await?;
        client.close();
        Ok(())
    }

    /// Answer one query
    ///
    /// Every per-query failure becomes an `Answer` with a fallback text. Only
    /// a collection schema mismatch is returned as an error.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        if let Some(entry) = self.cache.get(query).await {
            info!(outcome = "cached", "Answer served from cache");
            return Ok(Answer::from_cache(entry));
        }

        let timer = AnswerTimer::start();
        let answer = self.run(query).await?;

        if answer.outcome.is_cacheable() {
            self.cache.put(query, answer.to_cache()).await;
        }

        let duration = timer.finish(answer.outcome.as_str());
        info!(
            outcome = answer.outcome.as_str(),
            evidence = answer.evidence_count,
            truncated = answer.truncated,
            duration_secs = duration,
            "Answer completed"
        );
        Ok(answer)
    }

    async fn run(&self, query: &str) -> Result<Answer> {
        let mut scope = InvocationScope::new(self.embedder.as_ref());

        let client = match EvidenceClient::connect(self.store.as_ref(), self.embedder.dimension()).await {
            Ok(client) => scope.acquire(client),
            Err(e @ StoreError::Schema { .. }) => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, store = %self.store.describe(), "Evidence store unreachable, continuing without evidence");
                metrics::record_search(0.0, 0, true);
                return Ok(Answer::fallback(NO_RELEVANT_DOCUMENTS, AnswerOutcome::RetrievalDegraded));
            }
        };

        let started = Instant::now();
        let vector = match self.embedder.embed(query).await {
            Ok(vector) => {
                metrics::record_embedding(started.elapsed().as_secs_f64(), self.embedder.model_name(), true);
                vector
            }
            Err(e) => {
                metrics::record_embedding(started.elapsed().as_secs_f64(), self.embedder.model_name(), false);
                error!(error = %e, "Query embedding failed");
                return Ok(Answer::fallback(NO_RELEVANT_DOCUMENTS, AnswerOutcome::EmbeddingFailed));
            }
        };

        let started = Instant::now();
        let outcome = client
            .search(&vector, self.options.top_k, self.options.score_threshold)
            .await;
        metrics::record_search(started.elapsed().as_secs_f64(), outcome.hits.len(), outcome.degraded);
        scope.advance(PipelineStage::EvidenceRetrieved);

        if outcome.hits.is_empty() {
            let kind = if outcome.degraded {
                AnswerOutcome::RetrievalDegraded
            } else {
                AnswerOutcome::NoEvidence
            };
            return Ok(Answer::fallback(NO_RELEVANT_DOCUMENTS, kind));
        }

        self.generate(query, &outcome.hits, &mut scope).await
    }

    async fn generate(&self, query: &str, hits: &[EvidenceHit], scope: &mut InvocationScope<'_>) -> Result<Answer> {
        let context = self.options.assembler.assemble(hits);
        let prompt = build_prompt(query, &context);
        scope.advance(PipelineStage::ContextBuilt);

        let started = Instant::now();
        let raw = match self.engine.generate(&prompt, &self.options.generation).await {
            Ok(raw) => {
                metrics::record_generation(started.elapsed().as_secs_f64(), true);
                raw
            }
            Err(e) => {
                metrics::record_generation(started.elapsed().as_secs_f64(), false);
                error!(error = %e, model = self.engine.model_name(), "Generation failed");
                return Ok(Answer {
                    evidence_count: hits.len(),
                    ..Answer::fallback(
                        format!("{}: {}", GENERATION_ERROR_PREFIX, e),
                        AnswerOutcome::GenerationFailed,
                    )
                });
            }
        };
        scope.advance(PipelineStage::Generated);

        let normalized = normalize(&raw);
        scope.advance(PipelineStage::Normalized);

        Ok(Answer {
            text: normalized.text,
            outcome: AnswerOutcome::Grounded,
            cached: false,
            evidence_count: hits.len(),
            truncated: normalized.truncated,
            artifacts_stripped: normalized.artifacts_stripped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::testing::{FakeEmbedder, FakeEngine, FakeStore};

    fn hit(score: f32, text: &str) -> EvidenceHit {
        EvidenceHit {
            score,
            text: text.to_string(),
            source: "guideline.txt".to_string(),
        }
    }

    #[test]
    fn test_only_grounded_and_no_evidence_are_cached() {
        assert!(AnswerOutcome::Grounded.is_cacheable());
        assert!(AnswerOutcome::NoEvidence.is_cacheable());
        assert!(!AnswerOutcome::RetrievalDegraded.is_cacheable());
        assert!(!AnswerOutcome::EmbeddingFailed.is_cacheable());
        assert!(!AnswerOutcome::GenerationFailed.is_cacheable());
    }

    #[test]
    fn test_cache_roundtrip_keeps_outcome() {
        let grounded = Answer {
            text: "Surgery.".to_string(),
            outcome: AnswerOutcome::Grounded,
            cached: false,
            evidence_count: 2,
            truncated: true,
            artifacts_stripped: false,
        };
        let restored = Answer::from_cache(grounded.to_cache());
        assert_eq!(restored.outcome, AnswerOutcome::Grounded);
        assert!(restored.cached);
        assert!(restored.truncated);

        let empty = Answer::fallback(NO_RELEVANT_DOCUMENTS, AnswerOutcome::NoEvidence);
        assert_eq!(Answer::from_cache(empty.to_cache()).outcome, AnswerOutcome::NoEvidence);
    }

    #[tokio::test]
    async fn test_prompt_carries_ranked_context() {
        let engine = Arc::new(FakeEngine::new("Lobectomy is standard."));
        let pipeline = RagPipeline::new(
            Arc::new(FakeEmbedder::new(768)),
            Arc::new(FakeStore::new(768, vec![hit(0.6, "second"), hit(0.9, "first"), hit(0.1, "noise")])),
            engine.clone(),
            Arc::new(AnswerCache::default()),
            PipelineOptions::default(),
        );

        let answer = pipeline.answer("What is lobectomy?").await.unwrap();
        assert_eq!(answer.evidence_count, 2);

        let prompt = engine.last_prompt().unwrap();
        assert!(prompt.contains("Question: What is lobectomy?"));
        assert!(prompt.contains("Context:\nfirst\nsecond\n</|user|>"));
        assert!(!prompt.contains("noise"));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_an_error() {
        let engine = Arc::new(FakeEngine::new("unused."));
        let store = Arc::new(FakeStore::new(384, vec![hit(0.9, "a")]));
        let pipeline = RagPipeline::new(
            Arc::new(FakeEmbedder::new(768)),
            store.clone(),
            engine.clone(),
            Arc::new(AnswerCache::default()),
            PipelineOptions::default(),
        );

        let result = pipeline.answer("query").await;
        assert!(matches!(result, Err(AppError::SchemaMismatch { expected: 768, actual: 384 })));
        assert!(pipeline.verify_store().await.is_err());
        assert_eq!(engine.calls(), 0);
        assert_eq!(store.opened(), store.closed());
    }
}
