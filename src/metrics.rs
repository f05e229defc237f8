use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct IngestMetrics {
    ingestions: AtomicU64,
    chunks_produced: AtomicU64,
    vectors_added: AtomicU64,
    duplicates_skipped: AtomicU64,
    failures: AtomicU64,
    queries: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed ingestion run.
    ///
    /// `indexed` counts vectors written by this run (seeded plus added); the remainder of
    /// `chunks` was skipped as already indexed.
    pub fn record_ingestion(&self, chunks: u64, indexed: u64) {
        self.ingestions.fetch_add(1, Ordering::Relaxed);
        self.chunks_produced.fetch_add(chunks, Ordering::Relaxed);
        self.vectors_added.fetch_add(indexed, Ordering::Relaxed);
        self.duplicates_skipped
            .fetch_add(chunks.saturating_sub(indexed), Ordering::Relaxed);
    }

    /// Record an ingestion run that ended in the failed state.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served retrieval query.
    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ingestions: self.ingestions.load(Ordering::Relaxed),
            chunks_produced: self.chunks_produced.load(Ordering::Relaxed),
            vectors_added: self.vectors_added.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Completed ingestion runs since startup.
    pub ingestions: u64,
    /// Chunks produced by the splitter across all runs.
    pub chunks_produced: u64,
    /// Vectors written to indexes across all runs.
    pub vectors_added: u64,
    /// Chunks skipped because their fingerprint was already indexed.
    pub duplicates_skipped: u64,
    /// Ingestion runs that failed after their session was resolved.
    pub failures: u64,
    /// Retrieval queries served.
    pub queries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ingestions_and_duplicates() {
        let metrics = IngestMetrics::new();
        metrics.record_ingestion(10, 10);
        metrics.record_ingestion(10, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ingestions, 2);
        assert_eq!(snapshot.chunks_produced, 20);
        assert_eq!(snapshot.vectors_added, 10);
        assert_eq!(snapshot.duplicates_skipped, 10);
    }

    #[test]
    fn snapshot_starts_empty() {
        let metrics = IngestMetrics::new();
        metrics.record_query();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ingestions, 0);
        assert_eq!(snapshot.failures, 0);
        assert_eq!(snapshot.queries, 1);
    }
}
