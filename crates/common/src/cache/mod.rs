//! Bounded answer cache
//!
//! Provides:
//! - A small least-recently-used map (`LruMap`)
//! - `AnswerCache`, the process-wide, internally synchronized memo of final
//!   answers keyed by the exact query string
//!
//! Keys are not normalized (case and whitespace matter) and entries are never
//! invalidated when the evidence store changes.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use tokio::sync::Mutex;
use tracing::debug;

use crate::metrics;

/// Least-recently-used map with a fixed capacity
///
/// `access_order` holds keys from least to most recently used.
#[derive(Debug)]
pub struct LruMap<K, V> {
    entries: HashMap<K, V>,
    access_order: VecDeque<K>,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V: Clone> LruMap<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            access_order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Get a value and mark it as most recently used
    pub fn get(&mut self, key: &K) -> Option<V> {
        let value = self.entries.get(key).cloned()?;
        self.mark_accessed(key);
        Some(value)
    }

    /// Insert a value, evicting the least recently used entry when full
    ///
    /// Returns the evicted key, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<K> {
        if self.entries.insert(key.clone(), value).is_some() {
            self.mark_accessed(&key);
            return None;
        }

        self.access_order.push_back(key);

        if self.entries.len() > self.capacity {
            if let Some(evicted) = self.access_order.pop_front() {
                self.entries.remove(&evicted);
                return Some(evicted);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_order.clear();
    }

    /// Move key to the most recently used end
    fn mark_accessed(&mut self, key: &K) {
        if let Some(idx) = self.access_order.iter().position(|k| k == key) {
            if let Some(k) = self.access_order.remove(idx) {
                self.access_order.push_back(k);
            }
        }
    }
}

/// A cached final answer
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnswer {
    pub text: String,

    /// Hits the answer was grounded on, zero for the no-evidence notice
    pub evidence_count: usize,

    pub truncated: bool,
    pub artifacts_stripped: bool,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
}

/// Process-wide answer cache shared by every pipeline invocation
#[derive(Debug)]
pub struct AnswerCache {
    inner: Mutex<LruMap<String, CachedAnswer>>,
}

impl AnswerCache {
    /// Create a cache holding at most `capacity` answers
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruMap::new(capacity)),
        }
    }

    /// Look up an answer by exact query text
    pub async fn get(&self, query: &str) -> Option<CachedAnswer> {
        let hit = self.inner.lock().await.get(&query.to_string());
        metrics::record_cache(hit.is_some());
        debug!(hit = hit.is_some(), "Answer cache lookup");
        hit
    }

    /// Store the final answer for a query
    pub async fn put(&self, query: &str, answer: CachedAnswer) {
        let evicted = self.inner.lock().await.insert(query.to_string(), answer);
        if evicted.is_some() {
            debug!("Answer cache full, evicted least recently used entry");
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            entries: inner.len(),
            capacity: inner.capacity(),
        }
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}

impl Default for AnswerCache {
    fn default() -> Self {
        Self::new(100)
    }
}
