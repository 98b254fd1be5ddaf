//! Vector store capability consumed by the indexer and retriever.
//!
//! The pipeline never implements nearest-neighbour search itself; it talks to a backend through
//! [`VectorStore`]. [`crate::qdrant::QdrantService`] is the production backend and
//! [`InMemoryVectorStore`] serves local development and tests.

pub mod memory;
pub mod types;

use async_trait::async_trait;

pub use memory::InMemoryVectorStore;
pub use types::{
    IndexedVector, LOAN_DOCUMENT_TYPE, MetadataFilter, QueryMatch, StoredPoint, VectorMetadata,
    VectorStoreError, rank_order, vector_id,
};

/// Operations the pipeline requires from a vector store backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite vectors keyed by their ids. Each call is applied atomically.
    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), VectorStoreError>;

    /// Remove vectors by id. Unknown ids are ignored.
    async fn delete(&self, vector_ids: Vec<String>) -> Result<(), VectorStoreError>;

    /// Return up to `top_k` nearest vectors that satisfy `filter`, with metadata.
    ///
    /// Backends that can, rank with [`rank_order`] before cutting to `top_k`.
    async fn query(
        &self,
        embedding: Vec<f32>,
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<QueryMatch>, VectorStoreError>;

    /// Enumerate stored vectors (ids and payloads) that satisfy `filter`.
    async fn list(&self, filter: &MetadataFilter) -> Result<Vec<StoredPoint>, VectorStoreError>;

    /// Count stored vectors that satisfy `filter`.
    async fn count(&self, filter: &MetadataFilter) -> Result<usize, VectorStoreError> {
        Ok(self.list(filter).await?.len())
    }
}
