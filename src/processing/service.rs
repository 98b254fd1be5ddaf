//! Service facade wiring the indexer, retriever and context assembler together.

use crate::{
    config::{Config, VectorStoreProvider},
    embedding::{EmbeddingClient, EmbeddingClientError, build_embedding_client},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        context::ContextAssembler,
        indexer::{Indexer, IndexerSettings},
        retriever::{Retriever, RetrieverSettings},
        types::{
            ChunkingError, Document, IndexError, LoanIndexOutcome, QueryOutcome, QueryRequest,
            RetrievalError,
        },
    },
    qdrant::{QdrantError, QdrantService},
    source::{DirectoryDocumentSource, DocumentSource},
    store::{InMemoryVectorStore, VectorStore},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while assembling the service from configuration.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// Chunk sizing is invalid.
    #[error("Invalid chunk configuration: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding client could not be built.
    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Qdrant could not be reached or prepared.
    #[error("Failed to initialize Qdrant: {0}")]
    Qdrant(#[from] QdrantError),
    /// Qdrant was selected without a URL.
    #[error("QDRANT_URL is required when VECTOR_STORE_PROVIDER=qdrant")]
    MissingQdrantUrl,
}

/// Tunables for every pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Indexing settings.
    pub indexer: IndexerSettings,
    /// Query settings.
    pub retriever: RetrieverSettings,
    /// Character budget for assembled context.
    pub context_max_chars: usize,
}

impl PipelineSettings {
    /// Derive settings from runtime configuration.
    pub fn from_config(config: &Config) -> Result<Self, ChunkingError> {
        Ok(Self {
            indexer: IndexerSettings::from_config(config)?,
            retriever: RetrieverSettings::from_config(config),
            context_max_chars: config.context_max_chars(),
        })
    }
}

/// Operations exposed to the HTTP and CLI surfaces.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Index the supplied documents for a loan.
    async fn index_documents(
        &self,
        loan_id: &str,
        documents: Vec<Document>,
    ) -> Result<LoanIndexOutcome, IndexError>;

    /// Pull a loan's documents from the configured source and index them.
    async fn index_loan(&self, loan_id: &str) -> Result<LoanIndexOutcome, IndexError>;

    /// Retrieve and assemble context for a question about a loan.
    async fn query(&self, request: QueryRequest) -> Result<QueryOutcome, RetrievalError>;

    /// Count indexed vectors for a loan.
    async fn indexed_vector_count(&self, loan_id: &str) -> Result<usize, RetrievalError>;

    /// Current pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the pipeline components and shares them across requests.
///
/// The indexer and the retriever are always built from the same embedding client handle, so
/// passages and queries are embedded by one model.
pub struct RagService {
    indexer: Indexer,
    retriever: Retriever,
    assembler: ContextAssembler,
    source: Option<Arc<dyn DocumentSource>>,
    metrics: Arc<PipelineMetrics>,
}

impl RagService {
    /// Build a service over injected embedding and store handles.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        settings: PipelineSettings,
    ) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        Self {
            indexer: Indexer::new(
                embedder.clone(),
                store.clone(),
                metrics.clone(),
                settings.indexer,
            ),
            retriever: Retriever::new(embedder, store, settings.retriever),
            assembler: ContextAssembler::new(settings.context_max_chars),
            source: None,
            metrics,
        }
    }

    /// Attach a document source for pull-based indexing.
    pub fn with_source(mut self, source: Arc<dyn DocumentSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Build the service from configuration, preparing the Qdrant collection when selected.
    pub async fn from_config(config: &Config) -> Result<Self, ServiceInitError> {
        let settings = PipelineSettings::from_config(config)?;
        tracing::info!("Initializing embedding client");
        let embedder = build_embedding_client(config)?;

        let store: Arc<dyn VectorStore> = match config.vector_store_provider {
            VectorStoreProvider::Qdrant => {
                let url = config
                    .qdrant_url
                    .as_deref()
                    .ok_or(ServiceInitError::MissingQdrantUrl)?;
                let qdrant = QdrantService::new(
                    url,
                    config.qdrant_api_key.clone(),
                    config.qdrant_collection_name.clone(),
                    Duration::from_secs(config.request_timeout_secs),
                )?;
                tracing::debug!(
                    collection = %config.qdrant_collection_name,
                    vector_size = config.embedding_dimension,
                    "Ensuring loan document collection"
                );
                qdrant
                    .ensure_collection(config.embedding_dimension as u64)
                    .await?;
                tracing::info!(collection = %qdrant.collection(), "Qdrant collection ready");
                Arc::new(qdrant)
            }
            VectorStoreProvider::Memory => {
                tracing::warn!("Using in-memory vector store; indexed data is lost on exit");
                Arc::new(InMemoryVectorStore::new())
            }
        };

        let service = Self::new(embedder, store, settings);
        Ok(match &config.document_source_dir {
            Some(dir) => {
                tracing::info!(root = %dir, "Document source configured");
                service.with_source(Arc::new(DirectoryDocumentSource::new(dir)))
            }
            None => service,
        })
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn index_documents(
        &self,
        loan_id: &str,
        documents: Vec<Document>,
    ) -> Result<LoanIndexOutcome, IndexError> {
        self.indexer.index_documents_for_loan(loan_id, documents).await
    }

    async fn index_loan(&self, loan_id: &str) -> Result<LoanIndexOutcome, IndexError> {
        let source = self.source.as_ref().ok_or(IndexError::SourceNotConfigured)?;
        let documents = source.documents_for_loan(loan_id).await?;
        tracing::info!(loan_id, documents = documents.len(), "Pulled documents from source");
        self.indexer.index_documents_for_loan(loan_id, documents).await
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryOutcome, RetrievalError> {
        let top_k = request.top_k.unwrap_or_else(|| self.retriever.default_top_k());
        let matches = self
            .retriever
            .retrieve(&request.loan_id, &request.query, top_k)
            .await?;
        let assembled = self.assembler.assemble(matches);
        self.metrics.record_query();

        Ok(QueryOutcome {
            loan_id: request.loan_id,
            query: request.query,
            match_count: assembled.contexts.len(),
            contexts: assembled.contexts,
            context_string: assembled.context_string,
            truncated: assembled.truncated,
            estimated_tokens: assembled.estimated_tokens,
        })
    }

    async fn indexed_vector_count(&self, loan_id: &str) -> Result<usize, RetrievalError> {
        self.retriever.indexed_vector_count(loan_id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
