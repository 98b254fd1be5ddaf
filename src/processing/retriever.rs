//! Loan-scoped similarity search.

use crate::{
    config::Config,
    embedding::EmbeddingClient,
    processing::types::RetrievalError,
    retry::RetryPolicy,
    store::{MetadataFilter, QueryMatch, VectorStore, rank_order},
};
use std::sync::Arc;

/// Bounds applied to query requests.
#[derive(Debug, Clone, Copy)]
pub struct RetrieverSettings {
    /// Matches returned when the caller does not ask for a specific number.
    pub default_top_k: usize,
    /// Upper bound on requested matches.
    pub max_top_k: usize,
    /// Backoff schedule for embedding and store calls.
    pub retry: RetryPolicy,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 50,
            retry: RetryPolicy::default(),
        }
    }
}

impl RetrieverSettings {
    /// Derive settings from runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_top_k: config.query_default_top_k.max(1),
            max_top_k: config.query_max_top_k.max(1),
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay_ms),
        }
    }
}

/// Embeds queries and searches one loan's passages.
///
/// The retriever must share its embedding client with the indexer; vectors produced by
/// different models are not comparable.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    settings: RetrieverSettings,
}

impl Retriever {
    /// Build a retriever over injected embedding and store handles.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            settings,
        }
    }

    /// Default number of matches for requests that omit `topK`.
    pub fn default_top_k(&self) -> usize {
        self.settings.default_top_k
    }

    /// Return up to `top_k` passages of `loan_id` ranked by similarity to `query`.
    ///
    /// Ties are broken by ascending chunk index and then ascending document id. The store is
    /// asked for `max_top_k` candidates so that ties at the cut are settled by that order, not
    /// by the backend. Embedding and store failures are returned as errors, never as an empty
    /// result.
    pub async fn retrieve(
        &self,
        loan_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, RetrievalError> {
        let loan_id = validate_loan_id(loan_id)?;
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        if top_k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }
        let top_k = top_k.min(self.settings.max_top_k);
        let candidates = self.settings.max_top_k.max(top_k);

        let embedding = self.embed_query(query).await?;
        let filter = MetadataFilter::for_loan(loan_id);
        let store = &self.store;
        let filter_ref = &filter;
        let mut matches = self
            .settings
            .retry
            .run("query_vectors", move || {
                store.query(embedding.clone(), candidates, filter_ref)
            })
            .await
            .map_err(|error| {
                tracing::error!(loan_id, error = %error, "Vector store query failed");
                RetrievalError::RetrievalUnavailable(error.to_string())
            })?;

        let returned = matches.len();
        matches.retain(|candidate| filter.matches(&candidate.metadata));
        if matches.len() != returned {
            tracing::warn!(
                loan_id,
                dropped = returned - matches.len(),
                "Discarded matches outside the requested loan"
            );
        }
        matches.sort_by(rank_order);
        matches.truncate(top_k);

        tracing::info!(
            loan_id,
            top_k,
            matches = matches.len(),
            best_score = ?matches.first().map(|m| m.score),
            "Retrieval completed"
        );
        Ok(matches)
    }

    /// Number of loan-document vectors currently stored for `loan_id`.
    pub async fn indexed_vector_count(&self, loan_id: &str) -> Result<usize, RetrievalError> {
        let loan_id = validate_loan_id(loan_id)?;
        let store = &self.store;
        let filter = &MetadataFilter::for_loan(loan_id);
        self.settings
            .retry
            .run("count_vectors", move || store.count(filter))
            .await
            .map_err(|error| RetrievalError::RetrievalUnavailable(error.to_string()))
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
        let embedder = &self.embedder;
        let vectors = self
            .settings
            .retry
            .run("embed_query", move || {
                embedder.generate_embeddings(vec![query.to_string()])
            })
            .await
            .map_err(|error| {
                tracing::error!(error = %error, "Query embedding failed");
                RetrievalError::QueryEmbeddingFailed(error.to_string())
            })?;

        let embedding = vectors.into_iter().next().ok_or_else(|| {
            RetrievalError::QueryEmbeddingFailed("provider returned no vector".into())
        })?;
        let expected = self.embedder.dimension();
        if embedding.len() != expected {
            return Err(RetrievalError::QueryEmbeddingFailed(format!(
                "expected dimension {expected}, got {}",
                embedding.len()
            )));
        }
        Ok(embedding)
    }
}

fn validate_loan_id(loan_id: &str) -> Result<&str, RetrievalError> {
    let trimmed = loan_id.trim();
    if trimmed.is_empty() {
        return Err(RetrievalError::InvalidLoanId);
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClientError, HashEmbeddingClient};
    use crate::store::{
        IndexedVector, InMemoryVectorStore, LOAN_DOCUMENT_TYPE, StoredPoint, VectorMetadata,
        VectorStoreError, vector_id,
    };
    use async_trait::async_trait;

    const DIMENSION: usize = 32;

    fn metadata(loan: &str, doc: &str, chunk: usize, text: &str) -> VectorMetadata {
        VectorMetadata {
            loan_id: loan.into(),
            document_id: doc.into(),
            document_type: "appraisal".into(),
            document_name: format!("{doc}.pdf"),
            chunk_index: chunk,
            total_chunks: 1,
            kind: LOAN_DOCUMENT_TYPE.into(),
            source: LOAN_DOCUMENT_TYPE.into(),
            content_hash: String::new(),
            text: text.into(),
        }
    }

    async fn seed(
        store: &InMemoryVectorStore,
        embedder: &HashEmbeddingClient,
        rows: &[(&str, &str, usize, &str)],
    ) {
        let texts = rows.iter().map(|row| row.3.to_string()).collect();
        let embeddings = embedder.generate_embeddings(texts).await.expect("embed");
        let vectors = rows
            .iter()
            .zip(embeddings)
            .map(|(&(loan, doc, chunk, text), embedding)| IndexedVector {
                vector_id: vector_id(loan, doc, chunk),
                embedding,
                metadata: metadata(loan, doc, chunk, text),
            })
            .collect();
        store.upsert(vectors).await.expect("upsert");
    }

    fn settings() -> RetrieverSettings {
        RetrieverSettings {
            retry: RetryPolicy::none(),
            ..RetrieverSettings::default()
        }
    }

    #[tokio::test]
    async fn never_returns_other_loans_even_when_closer() {
        let embedder = HashEmbeddingClient::new("hash", DIMENSION);
        let store = Arc::new(InMemoryVectorStore::new());
        seed(
            &store,
            &embedder,
            &[
                ("loan-a", "doc-a", 0, "Interest rate is 6.5% fixed for 30 years."),
                ("loan-b", "doc-b", 0, "Interest rate is 6.5% fixed for 30 years!"),
                ("loan-b", "doc-c", 0, "Interest rate is 6.5% fixed for 30 years."),
            ],
        )
        .await;
        let retriever = Retriever::new(Arc::new(embedder), store, settings());

        let matches = retriever
            .retrieve("loan-a", "Interest rate is 6.5% fixed for 30 years.", 10)
            .await
            .expect("retrieve");
        assert_eq!(matches.len(), 1);
        assert!(matches.iter().all(|m| m.metadata.loan_id == "loan-a"));
    }

    #[tokio::test]
    async fn ties_break_by_chunk_then_document() {
        let embedder = HashEmbeddingClient::new("hash", DIMENSION);
        let store = Arc::new(InMemoryVectorStore::new());
        let text = "Escrow account balance statement.";
        seed(
            &store,
            &embedder,
            &[
                ("loan-a", "doc-b", 1, text),
                ("loan-a", "doc-b", 0, text),
                ("loan-a", "doc-a", 1, text),
            ],
        )
        .await;
        let retriever = Retriever::new(Arc::new(embedder), store, settings());

        let order: Vec<(String, usize)> = retriever
            .retrieve("loan-a", text, 5)
            .await
            .expect("retrieve")
            .into_iter()
            .map(|m| (m.metadata.document_id, m.metadata.chunk_index))
            .collect();
        assert_eq!(
            order,
            vec![
                ("doc-b".to_string(), 0),
                ("doc-a".to_string(), 1),
                ("doc-b".to_string(), 1)
            ]
        );
    }

    /// Store that answers with tied matches in reverse rank order, cut to the requested size.
    struct ReversingStore {
        inner: InMemoryVectorStore,
    }

    #[async_trait]
    impl VectorStore for ReversingStore {
        async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), VectorStoreError> {
            self.inner.upsert(vectors).await
        }

        async fn delete(&self, ids: Vec<String>) -> Result<(), VectorStoreError> {
            self.inner.delete(ids).await
        }

        async fn query(
            &self,
            embedding: Vec<f32>,
            top_k: usize,
            filter: &MetadataFilter,
        ) -> Result<Vec<QueryMatch>, VectorStoreError> {
            let mut matches = self.inner.query(embedding, usize::MAX, filter).await?;
            matches.reverse();
            matches.truncate(top_k);
            Ok(matches)
        }

        async fn list(
            &self,
            filter: &MetadataFilter,
        ) -> Result<Vec<StoredPoint>, VectorStoreError> {
            self.inner.list(filter).await
        }
    }

    #[tokio::test]
    async fn tied_matches_at_the_cut_keep_lowest_chunks() {
        let embedder = HashEmbeddingClient::new("hash", DIMENSION);
        let store = ReversingStore {
            inner: InMemoryVectorStore::new(),
        };
        let text = "Hazard insurance declarations page.";
        let rows: Vec<(&str, &str, usize, &str)> =
            (0..6).map(|chunk| ("loan-a", "doc-a", chunk, text)).collect();
        seed(&store.inner, &embedder, &rows).await;
        let retriever = Retriever::new(Arc::new(embedder), Arc::new(store), settings());

        let chunks: Vec<usize> = retriever
            .retrieve("loan-a", text, 2)
            .await
            .expect("retrieve")
            .into_iter()
            .map(|m| m.metadata.chunk_index)
            .collect();
        assert_eq!(chunks, vec![0, 1]);
    }

    #[tokio::test]
    async fn rejects_invalid_requests() {
        let retriever = Retriever::new(
            Arc::new(HashEmbeddingClient::new("hash", DIMENSION)),
            Arc::new(InMemoryVectorStore::new()),
            settings(),
        );
        assert!(matches!(
            retriever.retrieve(" ", "q", 5).await,
            Err(RetrievalError::InvalidLoanId)
        ));
        assert!(matches!(
            retriever.retrieve("loan", "   ", 5).await,
            Err(RetrievalError::EmptyQuery)
        ));
        assert!(matches!(
            retriever.retrieve("loan", "q", 0).await,
            Err(RetrievalError::InvalidTopK)
        ));
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Err(EmbeddingClientError::GenerationFailed("provider down".into()))
        }

        fn model(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            DIMENSION
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl VectorStore for UnreachableStore {
        async fn upsert(&self, _vectors: Vec<IndexedVector>) -> Result<(), VectorStoreError> {
            Err(VectorStoreError::Unavailable("connection refused".into()))
        }

        async fn delete(&self, _ids: Vec<String>) -> Result<(), VectorStoreError> {
            Err(VectorStoreError::Unavailable("connection refused".into()))
        }

        async fn query(
            &self,
            _embedding: Vec<f32>,
            _top_k: usize,
            _filter: &MetadataFilter,
        ) -> Result<Vec<QueryMatch>, VectorStoreError> {
            Err(VectorStoreError::Unavailable("connection refused".into()))
        }

        async fn list(
            &self,
            _filter: &MetadataFilter,
        ) -> Result<Vec<StoredPoint>, VectorStoreError> {
            Err(VectorStoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn embedding_failure_is_not_an_empty_result() {
        let retriever = Retriever::new(
            Arc::new(FailingEmbedder),
            Arc::new(InMemoryVectorStore::new()),
            settings(),
        );
        assert!(matches!(
            retriever.retrieve("loan-a", "rate?", 5).await,
            Err(RetrievalError::QueryEmbeddingFailed(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_store_is_retrieval_unavailable() {
        let retriever = Retriever::new(
            Arc::new(HashEmbeddingClient::new("hash", DIMENSION)),
            Arc::new(UnreachableStore),
            settings(),
        );
        assert!(matches!(
            retriever.retrieve("loan-a", "rate?", 5).await,
            Err(RetrievalError::RetrievalUnavailable(_))
        ));
        assert!(matches!(
            retriever.indexed_vector_count("loan-a").await,
            Err(RetrievalError::RetrievalUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn top_k_is_clamped_and_counts_are_scoped() {
        let embedder = HashEmbeddingClient::new("hash", DIMENSION);
        let store = Arc::new(InMemoryVectorStore::new());
        seed(
            &store,
            &embedder,
            &[
                ("loan-a", "doc-1", 0, "one"),
                ("loan-a", "doc-1", 1, "two"),
                ("loan-a", "doc-1", 2, "three"),
                ("loan-b", "doc-2", 0, "four"),
            ],
        )
        .await;
        let retriever = Retriever::new(
            Arc::new(embedder),
            store,
            RetrieverSettings {
                max_top_k: 2,
                ..settings()
            },
        );
        let matches = retriever.retrieve("loan-a", "two", 100).await.expect("retrieve");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].metadata.chunk_index, 1);
        assert_eq!(retriever.indexed_vector_count("loan-a").await.expect("count"), 3);
    }
}
