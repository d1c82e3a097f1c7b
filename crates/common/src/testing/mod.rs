//! In-memory fakes for the pipeline capabilities
//!
//! Used by unit and integration tests to run the pipeline without a model,
//! a vector store or a generation server. Each fake counts its calls.

use crate::embeddings::{Embedder, EmbeddingError};
use crate::generation::{GenerationEngine, GenerationError, GenerationParams};
use crate::store::{EvidenceHit, EvidenceStore, StoreError, StoreSession};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Deterministic embedder: every component is the text length
pub struct FakeEmbedder {
    dimension: usize,
    fail: bool,
    calls: AtomicUsize,
    reclaimed: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            calls: AtomicUsize::new(0),
            reclaimed: AtomicUsize::new(0),
        }
    }

    /// Every call fails with out-of-memory
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reclaimed(&self) -> usize {
        self.reclaimed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::OutOfMemory("fake accelerator exhausted".to_string()));
        }
        Ok(vec![text.chars().count() as f32; self.dimension])
    }

    fn model_name(&self) -> &str {
        "fake-embedder"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn reclaim_memory(&self) {
        self.reclaimed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct StoreCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    searches: AtomicUsize,
}

/// Store returning a fixed hit list, unfiltered
pub struct FakeStore {
    dimension: usize,
    hits: Vec<EvidenceHit>,
    fail_open: bool,
    fail_search: bool,
    stall_search: bool,
    counters: Arc<StoreCounters>,
}

impl FakeStore {
    /// A collection with vectors of `dimension` holding `hits`
    pub fn new(dimension: usize, hits: Vec<EvidenceHit>) -> Self {
        Self {
            dimension,
            hits,
            fail_open: false,
            fail_search: false,
            stall_search: false,
            counters: Arc::new(StoreCounters::default()),
        }
    }

    /// Opening a session fails with a transport error
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Searches fail with a transport error
    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    /// Searches never complete, so the caller stays suspended mid-search
    pub fn stalled_search(mut self) -> Self {
        self.stall_search = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.counters.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceStore for FakeStore {
    async fn open(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        if self.fail_open {
            return Err(StoreError::Transport {
                message: "connection refused".to_string(),
            });
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            dimension: self.dimension,
            hits: self.hits.clone(),
            fail_search: self.fail_search,
            stall_search: self.stall_search,
            counters: Arc::clone(&self.counters),
            open: AtomicBool::new(true),
        }))
    }

    fn describe(&self) -> String {
        "fake://evidence".to_string()
    }
}

struct FakeSession {
    dimension: usize,
    hits: Vec<EvidenceHit>,
    fail_search: bool,
    stall_search: bool,
    counters: Arc<StoreCounters>,
    open: AtomicBool,
}

#[async_trait]
impl StoreSession for FakeSession {
    async fn vector_size(&self) -> Result<usize, StoreError> {
        Ok(self.dimension)
    }

    async fn nearest(
        &self,
        _vector: &[f32],
        limit: usize,
        _score_threshold: f32,
    ) -> Result<Vec<EvidenceHit>, StoreError> {
        self.counters.searches.fetch_add(1, Ordering::SeqCst);
        if self.stall_search {
            std::future::pending::<()>().await;
        }
        if self.fail_search {
            return Err(StoreError::Transport {
                message: "connection reset by peer".to_string(),
            });
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Engine returning a scripted completion
pub struct FakeEngine {
    response: Option<String>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl FakeEngine {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Every call fails with a server error
    pub fn failing() -> Self {
        Self {
            response: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

#[async_trait]
impl GenerationEngine for FakeEngine {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        self.response.clone().ok_or(GenerationError::Api {
            status: 500,
            body: "model crashed".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "fake-engine"
    }
}
