//! Process-local vector store with brute-force cosine search.

use super::{
    IndexedVector, MetadataFilter, QueryMatch, StoredPoint, VectorMetadata, VectorStore,
    VectorStoreError, rank_order,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    embedding: Vec<f32>,
    metadata: VectorMetadata,
}

/// Vector store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryVectorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored vectors regardless of payload.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no vectors.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), VectorStoreError> {
        let mut entries = self.entries.write().await;
        for vector in vectors {
            entries.insert(
                vector.vector_id,
                Entry {
                    embedding: vector.embedding,
                    metadata: vector.metadata,
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, vector_ids: Vec<String>) -> Result<(), VectorStoreError> {
        let mut entries = self.entries.write().await;
        for id in vector_ids {
            entries.remove(&id);
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: Vec<f32>,
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<QueryMatch>, VectorStoreError> {
        let entries = self.entries.read().await;
        let mut matches: Vec<QueryMatch> = entries
            .iter()
            .filter(|(_, entry)| filter.matches(&entry.metadata))
            .map(|(id, entry)| QueryMatch {
                vector_id: id.clone(),
                score: cosine_similarity(&embedding, &entry.embedding),
                metadata: entry.metadata.clone(),
            })
            .collect();
        matches.sort_by(rank_order);
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn list(&self, filter: &MetadataFilter) -> Result<Vec<StoredPoint>, VectorStoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(_, entry)| filter.matches(&entry.metadata))
            .map(|(id, entry)| StoredPoint {
                vector_id: id.clone(),
                metadata: Some(entry.metadata.clone()),
            })
            .collect())
    }
}

/// Cosine similarity; zero when either vector has no magnitude or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
