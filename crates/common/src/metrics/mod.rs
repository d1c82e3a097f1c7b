//! Metrics and observability utilities
//!
//! Provides Prometheus metric descriptions and small recording helpers
//! for every stage of the answer pipeline.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all OncoRAG metrics
pub const METRICS_PREFIX: &str = "oncorag";

/// Buckets for end-to-end answer latency (in seconds). Generation dominates.
pub const ANSWER_BUCKETS: &[f64] = &[
    0.010, // 10ms, cache hits
    0.050,
    0.250,
    1.000,
    2.500,
    5.000,
    10.00,
    20.00,
    30.00,
    60.00,
    120.0,
];

/// Buckets for embedding and search latency (in seconds)
pub const RETRIEVAL_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total answered queries by outcome"
    );

    describe_histogram!(
        format!("{}_answer_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end answer latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total query embeddings computed"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Query embedding latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding failures"
    );

    describe_gauge!(
        format!("{}_retrieval_hits", METRICS_PREFIX),
        Unit::Count,
        "Evidence hits above threshold for the last query"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Evidence search latency in seconds"
    );

    describe_counter!(
        format!("{}_retrieval_degraded_total", METRICS_PREFIX),
        Unit::Count,
        "Searches that degraded to empty evidence after a store error"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Generation latency in seconds"
    );

    describe_counter!(
        format!("{}_generation_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total generation failures"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total answer cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total answer cache misses"
    );

    describe_counter!(
        format!("{}_points_upserted_total", METRICS_PREFIX),
        Unit::Count,
        "Total points written by ingestion"
    );

    tracing::info!("Metrics registered");
}

/// Helper to time one answer from entry to completion
pub struct AnswerTimer {
    start: Instant,
}

impl AnswerTimer {
    /// Start tracking an answer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds since the timer started
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Record completion with the given outcome label
    pub fn finish(self, outcome: &'static str) -> f64 {
        let duration = self.elapsed_secs();

        counter!(
            format!("{}_queries_total", METRICS_PREFIX),
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            format!("{}_answer_duration_seconds", METRICS_PREFIX),
            "outcome" => outcome
        )
        .record(duration);

        duration
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, hit_count: usize, degraded: bool) {
    histogram!(format!("{}_search_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    gauge!(format!("{}_retrieval_hits", METRICS_PREFIX)).set(hit_count as f64);

    if degraded {
        counter!(format!("{}_retrieval_degraded_total", METRICS_PREFIX)).increment(1);
    }
}

/// Helper to record generation metrics
pub fn record_generation(duration_secs: f64, success: bool) {
    if success {
        histogram!(format!("{}_generation_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    } else {
        counter!(format!("{}_generation_errors_total", METRICS_PREFIX)).increment(1);
    }
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool) {
    if hit {
        counter!(format!("{}_cache_hits_total", METRICS_PREFIX)).increment(1);
    } else {
        counter!(format!("{}_cache_misses_total", METRICS_PREFIX)).increment(1);
    }
}

/// Helper to record ingestion metrics
pub fn record_upsert(points: usize) {
    counter!(format!("{}_points_upserted_total", METRICS_PREFIX)).increment(points as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [ANSWER_BUCKETS, RETRIEVAL_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_answer_timer() {
        let timer = AnswerTimer::start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let elapsed = timer.finish("grounded");
        assert!(elapsed > 0.0);
    }
}
