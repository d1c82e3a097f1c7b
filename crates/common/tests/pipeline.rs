//! End-to-end pipeline behaviour over in-memory fakes

use oncorag_common::pipeline::{PipelineOptions, GENERATION_ERROR_PREFIX, NO_RELEVANT_DOCUMENTS};
use oncorag_common::testing::{FakeEmbedder, FakeEngine, FakeStore};
use oncorag_common::{AnswerCache, AnswerOutcome, EvidenceHit, RagPipeline};
use std::sync::Arc;

const DIMENSION: usize = 768;

fn hit(score: f32, text: &str, source: &str) -> EvidenceHit {
    EvidenceHit {
        score,
        text: text.to_string(),
        source: source.to_string(),
    }
}

fn lung_cancer_hits() -> Vec<EvidenceHit> {
    vec![
        hit(
            0.82,
            "Stage II non-small cell lung cancer is treated with anatomical resection, usually lobectomy.",
            "nsclc_surgery.txt",
        ),
        hit(
            0.74,
            "Adjuvant cisplatin-based chemotherapy is recommended after complete resection of stage II disease.",
            "nsclc_adjuvant.txt",
        ),
        hit(
            0.61,
            "Stereotactic radiotherapy is an option for medically inoperable patients.",
            "nsclc_radiotherapy.txt",
        ),
    ]
}

struct Harness {
    embedder: Arc<FakeEmbedder>,
    store: Arc<FakeStore>,
    engine: Arc<FakeEngine>,
    pipeline: RagPipeline,
}

fn harness(embedder: FakeEmbedder, store: FakeStore, engine: FakeEngine) -> Harness {
    let embedder = Arc::new(embedder);
    let store = Arc::new(store);
    let engine = Arc::new(engine);
    let pipeline = RagPipeline::new(
        embedder.clone(),
        store.clone(),
        engine.clone(),
        Arc::new(AnswerCache::new(100)),
        PipelineOptions::default(),
    );
    Harness {
        embedder,
        store,
        engine,
        pipeline,
    }
}

#[tokio::test]
async fn grounded_answer_for_lung_cancer_query() {
    let raw = "Surgical resection by lobectomy is the standard of care [Source 1]. \
               Adjuvant cisplatin-based chemotherapy improves survival (Source 2). \
               MEDICAL_SOURCE_3: Stereotactic radiotherapy suits inoperable patients. \
               In conclusion, the treatment is effective";
    let h = harness(
        FakeEmbedder::new(DIMENSION),
        FakeStore::new(DIMENSION, lung_cancer_hits()),
        FakeEngine::new(raw),
    );

    let answer = h
        .pipeline
        .answer("What are treatment options for stage II lung cancer?")
        .await
        .unwrap();

    assert_eq!(answer.outcome, AnswerOutcome::Grounded);
    assert_eq!(answer.evidence_count, 3);
    assert!(!answer.text.is_empty());
    assert!(answer.text.ends_with(['.', '!', '?']));
    assert!(!answer.text.contains("Source"));
    assert!(answer.artifacts_stripped);
    assert!(answer.truncated);
    assert!(!answer.text.contains("the treatment is effective"));
    assert_eq!(h.engine.calls(), 1);
}

#[tokio::test]
async fn out_of_domain_query_gets_fixed_notice() {
    let h = harness(
        FakeEmbedder::new(DIMENSION),
        FakeStore::new(DIMENSION, vec![hit(0.12, "Unrelated passage.", "misc.txt")]),
        FakeEngine::new("should never be produced."),
    );

    let answer = h.pipeline.answer("What is the boiling point of water?").await.unwrap();

    assert_eq!(answer.text, NO_RELEVANT_DOCUMENTS);
    assert_eq!(answer.outcome, AnswerOutcome::NoEvidence);
    assert_eq!(h.engine.calls(), 0);
    assert_eq!(h.store.opened(), 1);
    assert_eq!(h.store.closed(), 1);
}

#[tokio::test]
async fn search_transport_error_degrades_to_no_evidence() {
    let h = harness(
        FakeEmbedder::new(DIMENSION),
        FakeStore::new(DIMENSION, lung_cancer_hits()).failing_search(),
        FakeEngine::new("should never be produced."),
    );

    let answer = h
        .pipeline
        .answer("What are treatment options for stage II lung cancer?")
        .await
        .unwrap();

    assert_eq!(answer.text, NO_RELEVANT_DOCUMENTS);
    assert_eq!(answer.outcome, AnswerOutcome::RetrievalDegraded);
    assert_eq!(h.engine.calls(), 0);
    assert_eq!(h.store.searches(), 1);
    assert_eq!(h.store.closed(), 1);
}

#[tokio::test]
async fn unreachable_store_degrades_to_no_evidence() {
    let h = harness(
        FakeEmbedder::new(DIMENSION),
        FakeStore::new(DIMENSION, lung_cancer_hits()).failing_open(),
        FakeEngine::new("should never be produced."),
    );

    let answer = h.pipeline.answer("Any query").await.unwrap();

    assert_eq!(answer.text, NO_RELEVANT_DOCUMENTS);
    assert_eq!(answer.outcome, AnswerOutcome::RetrievalDegraded);
    assert_eq!(h.engine.calls(), 0);
    assert_eq!(h.embedder.reclaimed(), 1);
}

#[tokio::test]
async fn trailing_fragment_is_dropped() {
    let h = harness(
        FakeEmbedder::new(DIMENSION),
        FakeStore::new(DIMENSION, lung_cancer_hits()),
        FakeEngine::new("Lobectomy remains the standard. Chemotherapy follows... and the treatment is effective"),
    );

    let answer = h.pipeline.answer("How is stage II treated?").await.unwrap();

    assert_eq!(answer.text, "Lobectomy remains the standard. Chemotherapy follows...");
    assert!(answer.truncated);
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let h = harness(
        FakeEmbedder::new(DIMENSION),
        FakeStore::new(DIMENSION, lung_cancer_hits()),
        FakeEngine::new("Lobectomy is the standard of care."),
    );
    let query = "What are treatment options for stage II lung cancer?";

    let first = h.pipeline.answer(query).await.unwrap();
    let second = h.pipeline.answer(query).await.unwrap();

    assert_eq!(first.text, second.text);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(h.engine.calls(), 1);
    assert_eq!(h.embedder.calls(), 1);
    assert_eq!(h.store.opened(), 1);

    // Keys are exact: a different spelling misses the cache
    h.pipeline.answer(&query.to_lowercase()).await.unwrap();
    assert_eq!(h.engine.calls(), 2);
}

#[tokio::test]
async fn embedding_failure_skips_generation_and_releases_resources() {
    let h = harness(
        FakeEmbedder::new(DIMENSION).failing(),
        FakeStore::new(DIMENSION, lung_cancer_hits()),
        FakeEngine::new("should never be produced."),
    );

    let answer = h.pipeline.answer("What is EGFR?").await.unwrap();

    assert_eq!(answer.text, NO_RELEVANT_DOCUMENTS);
    assert_eq!(answer.outcome, AnswerOutcome::EmbeddingFailed);
    assert_eq!(h.engine.calls(), 0);
    assert_eq!(h.store.searches(), 0);
    assert_eq!(h.store.closed(), 1);
    assert_eq!(h.embedder.reclaimed(), 1);

    // Failures are not memoized
    h.pipeline.answer("What is EGFR?").await.unwrap();
    assert_eq!(h.embedder.calls(), 2);
}

#[tokio::test]
async fn generation_failure_becomes_message() {
    let h = harness(
        FakeEmbedder::new(DIMENSION),
        FakeStore::new(DIMENSION, lung_cancer_hits()),
        FakeEngine::failing(),
    );

    let answer = h.pipeline.answer("What is EGFR?").await.unwrap();

    assert_eq!(answer.outcome, AnswerOutcome::GenerationFailed);
    assert!(answer.text.starts_with(GENERATION_ERROR_PREFIX));
    assert_eq!(h.store.closed(), 1);

    h.pipeline.answer("What is EGFR?").await.unwrap();
    assert_eq!(h.engine.calls(), 2);
}

#[tokio::test]
async fn every_invocation_releases_its_session() {
    let h = harness(
        FakeEmbedder::new(DIMENSION),
        FakeStore::new(DIMENSION, lung_cancer_hits()),
        FakeEngine::new("Answer."),
    );

    for i in 0..5 {
        h.pipeline.answer(&format!("question {}", i)).await.unwrap();
    }

    assert_eq!(h.store.opened(), 5);
    assert_eq!(h.store.closed(), 5);
    assert_eq!(h.embedder.reclaimed(), 5);
}

#[tokio::test]
async fn cancelled_invocation_still_releases() {
    let h = harness(
        FakeEmbedder::new(DIMENSION),
        FakeStore::new(DIMENSION, lung_cancer_hits()).stalled_search(),
        FakeEngine::new("Answer."),
    );

    {
        let mut future = Box::pin(h.pipeline.answer("question"));
        // The search never completes, so the first poll leaves the invocation mid-step
        assert!(futures::poll!(future.as_mut()).is_pending());
        assert_eq!(h.store.searches(), 1);
        assert_eq!(h.store.closed(), 0);
    }

    assert_eq!(h.store.opened(), 1);
    assert_eq!(h.store.closed(), 1);
    assert_eq!(h.embedder.reclaimed(), 1);
    assert_eq!(h.engine.calls(), 0);
    assert_eq!(h.pipeline.cache().stats().await.entries, 0);
}
