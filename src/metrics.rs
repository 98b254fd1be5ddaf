use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing indexing and query activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    chunk_failures: AtomicU64,
    stale_vectors_removed: AtomicU64,
    queries_served: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one indexed document along with its chunk-level results.
    pub fn record_document(&self, chunks_indexed: u64, chunk_failures: u64, stale_removed: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunks_indexed, Ordering::Relaxed);
        self.chunk_failures
            .fetch_add(chunk_failures, Ordering::Relaxed);
        self.stale_vectors_removed
            .fetch_add(stale_removed, Ordering::Relaxed);
    }

    /// Record a query that produced an assembled context.
    pub fn record_query(&self) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            chunk_failures: self.chunk_failures.load(Ordering::Relaxed),
            stale_vectors_removed: self.stale_vectors_removed.load(Ordering::Relaxed),
            queries_served: self.queries_served.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Documents processed by the indexer since startup.
    pub documents_indexed: u64,
    /// Chunk vectors written since startup.
    pub chunks_indexed: u64,
    /// Chunks that could not be embedded or written.
    pub chunk_failures: u64,
    /// Vectors deleted because their document shrank.
    pub stale_vectors_removed: u64,
    /// Queries answered with an assembled context.
    pub queries_served: u64,
}
