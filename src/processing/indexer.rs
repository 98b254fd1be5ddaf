//! Document indexing: extract, chunk, embed, upsert and prune stale vectors.
//!
//! Vector ids are derived from `(loanId, documentId, chunkIndex)`, so re-indexing overwrites
//! instead of duplicating. After the new vectors are written, ids that existed before but are no longer
//! produced (the document shrank) are deleted. Failures embedding or writing one chunk are
//! collected into the outcome and never abort the remaining chunks.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError, validate_vectors},
    metrics::PipelineMetrics,
    processing::{
        chunking::{ChunkerSettings, chunk_document},
        extract::extract_text,
        types::{
            Chunk, ChunkError, ChunkingError, Document, DocumentIndexOutcome, FailedDocument,
            IndexError, IndexErrorEntry, LoanIndexOutcome,
        },
    },
    retry::RetryPolicy,
    store::{
        IndexedVector, LOAN_DOCUMENT_TYPE, MetadataFilter, StoredPoint, VectorMetadata,
        VectorStore, VectorStoreError, vector_id,
    },
};
use futures_util::{StreamExt, stream};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Tunables for the indexing pipeline.
#[derive(Debug, Clone, Copy)]
pub struct IndexerSettings {
    /// Chunk window and overlap.
    pub chunker: ChunkerSettings,
    /// Texts per embedding call and vectors per upsert call.
    pub batch_size: usize,
    /// Extracted text shorter than this is indexed as empty.
    pub min_text_chars: usize,
    /// Documents indexed concurrently within one loan batch.
    pub concurrency: usize,
    /// Skip documents whose stored vectors already carry the same content fingerprint.
    pub skip_unchanged: bool,
    /// Backoff schedule for embedding and store calls.
    pub retry: RetryPolicy,
}

impl IndexerSettings {
    /// Settings with default batching and no minimum text length.
    pub fn new(chunker: ChunkerSettings) -> Self {
        Self {
            chunker,
            batch_size: 64,
            min_text_chars: 0,
            concurrency: 4,
            skip_unchanged: true,
            retry: RetryPolicy::default(),
        }
    }

    /// Derive settings from runtime configuration.
    pub fn from_config(config: &Config) -> Result<Self, ChunkingError> {
        Ok(Self {
            chunker: ChunkerSettings::new(config.chunk_max_chars, config.chunk_overlap_chars)?,
            batch_size: config.embedding_batch_size,
            min_text_chars: config.index_min_text_chars,
            concurrency: config.index_concurrency,
            skip_unchanged: config.index_skip_unchanged,
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay_ms),
        })
    }
}

/// Writes loan documents into the vector store.
pub struct Indexer {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    metrics: Arc<PipelineMetrics>,
    settings: IndexerSettings,
}

impl Indexer {
    /// Build an indexer over injected embedding and store handles.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        metrics: Arc<PipelineMetrics>,
        settings: IndexerSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            metrics,
            settings,
        }
    }

    /// Index one document on behalf of `loan_id`.
    ///
    /// Returns `Err` only when the document cannot be attempted at all (missing id, wrong loan).
    /// Chunk-level failures are reported in [`DocumentIndexOutcome::errors`].
    pub async fn index_document(
        &self,
        document: &Document,
        loan_id: &str,
    ) -> Result<DocumentIndexOutcome, IndexError> {
        let loan_id = validate_loan_id(loan_id)?;
        let document_id = document.id.trim();
        if document_id.is_empty() {
            return Err(IndexError::MissingDocumentId);
        }
        let document_loan = document.loan_id.trim();
        if !document_loan.is_empty() && document_loan != loan_id {
            return Err(IndexError::LoanMismatch {
                document_id: document_id.to_string(),
                expected: loan_id.to_string(),
                actual: document_loan.to_string(),
            });
        }

        let text = extract_text(document, self.settings.min_text_chars);
        let content_hash = content_fingerprint(loan_id, document, &text, &self.settings.chunker);
        let chunks = chunk_document(document, loan_id, &text, &self.settings.chunker);
        let new_ids: Vec<String> = chunks
            .iter()
            .map(|chunk| vector_id(loan_id, document_id, chunk.chunk_index))
            .collect();

        let mut outcome = DocumentIndexOutcome {
            document_id: document_id.to_string(),
            chunk_count: chunks.len(),
            ..DocumentIndexOutcome::default()
        };

        let existing = match self.list_document_vectors(loan_id, document_id).await {
            Ok(points) => Some(points),
            Err(error) => {
                tracing::warn!(
                    document_id,
                    error = %error,
                    "Failed to list existing vectors; stale cleanup skipped"
                );
                outcome.errors.push(ChunkError {
                    chunk_index: None,
                    reason: format!("Failed to list existing vectors: {error}"),
                });
                None
            }
        };

        if self.settings.skip_unchanged
            && !chunks.is_empty()
            && let Some(points) = &existing
            && is_unchanged(points, &new_ids, &content_hash)
        {
            tracing::info!(
                document_id,
                loan_id,
                chunks = chunks.len(),
                "Document unchanged; skipping re-embedding"
            );
            outcome.indexed_chunk_count = chunks.len();
            outcome.unchanged = true;
            self.metrics.record_document(0, 0, 0);
            return Ok(outcome);
        }

        let embedded = self.embed_chunks(&chunks, &mut outcome.errors).await;
        let vectors: Vec<IndexedVector> = embedded
            .into_iter()
            .map(|(chunk, embedding)| IndexedVector {
                vector_id: vector_id(loan_id, document_id, chunk.chunk_index),
                embedding,
                metadata: VectorMetadata {
                    loan_id: loan_id.to_string(),
                    document_id: document_id.to_string(),
                    document_type: document.display_type().to_string(),
                    document_name: document.display_name().to_string(),
                    chunk_index: chunk.chunk_index,
                    total_chunks: chunks.len(),
                    kind: LOAN_DOCUMENT_TYPE.to_string(),
                    source: LOAN_DOCUMENT_TYPE.to_string(),
                    content_hash: content_hash.clone(),
                    text: chunk.text,
                },
            })
            .collect();
        outcome.indexed_chunk_count = self.upsert_vectors(vectors, &mut outcome.errors).await;

        if let Some(points) = existing {
            let keep: BTreeSet<&str> = new_ids.iter().map(String::as_str).collect();
            let stale: Vec<String> = points
                .into_iter()
                .map(|point| point.vector_id)
                .filter(|id| !keep.contains(id.as_str()))
                .collect();
            if !stale.is_empty() {
                match self.delete_vectors(&stale).await {
                    Ok(()) => outcome.removed_stale_count = stale.len(),
                    Err(error) => {
                        tracing::warn!(
                            document_id,
                            stale = stale.len(),
                            error = %error,
                            "Failed to delete stale vectors"
                        );
                        outcome.errors.push(ChunkError {
                            chunk_index: None,
                            reason: format!("Failed to delete {} stale vectors: {error}", stale.len()),
                        });
                    }
                }
            }
        }

        let chunk_failures = outcome
            .errors
            .iter()
            .filter(|error| error.chunk_index.is_some())
            .count();
        self.metrics.record_document(
            outcome.indexed_chunk_count as u64,
            chunk_failures as u64,
            outcome.removed_stale_count as u64,
        );
        tracing::info!(
            document_id,
            loan_id,
            chunks = outcome.chunk_count,
            indexed = outcome.indexed_chunk_count,
            removed_stale = outcome.removed_stale_count,
            errors = outcome.errors.len(),
            "Document indexed"
        );
        Ok(outcome)
    }

    /// Index a batch of documents for one loan with bounded concurrency.
    ///
    /// A document that errors, or that produced chunks but indexed none of them, is reported in
    /// [`LoanIndexOutcome::failed_documents`] without affecting the rest of the batch.
    pub async fn index_documents_for_loan(
        &self,
        loan_id: &str,
        documents: Vec<Document>,
    ) -> Result<LoanIndexOutcome, IndexError> {
        let loan_id = validate_loan_id(loan_id)?;
        let mut summary = LoanIndexOutcome {
            loan_id: loan_id.to_string(),
            total_documents: documents.len(),
            ..LoanIndexOutcome::default()
        };
        if documents.is_empty() {
            tracing::info!(loan_id, "No documents to index for loan");
            return Ok(summary);
        }

        let concurrency = self.settings.concurrency.max(1);
        let results: Vec<(Document, Result<DocumentIndexOutcome, IndexError>)> =
            stream::iter(documents)
                .map(move |document| async move {
                    let result = self.index_document(&document, loan_id).await;
                    (document, result)
                })
                .buffered(concurrency)
                .collect()
                .await;

        for (document, result) in results {
            match result {
                Ok(outcome) => {
                    summary.chunks_indexed += outcome.indexed_chunk_count;
                    summary
                        .errors
                        .extend(outcome.errors.iter().map(|error| IndexErrorEntry {
                            document_id: outcome.document_id.clone(),
                            filename: document.filename.clone(),
                            chunk_index: error.chunk_index,
                            reason: error.reason.clone(),
                        }));
                    if outcome.chunk_count > 0 && outcome.indexed_chunk_count == 0 {
                        let reason = outcome
                            .errors
                            .first()
                            .map(|error| error.reason.clone())
                            .unwrap_or_else(|| "No chunks were indexed".to_string());
                        summary.failed_documents.push(FailedDocument {
                            document_id: outcome.document_id.clone(),
                            filename: document.filename.clone(),
                            reason,
                        });
                    } else {
                        summary.indexed_count += 1;
                    }
                    summary.documents.push(outcome);
                }
                Err(error) => {
                    tracing::error!(
                        loan_id,
                        document_id = %document.id,
                        error = %error,
                        "Document could not be indexed"
                    );
                    let reason = error.to_string();
                    summary.errors.push(IndexErrorEntry {
                        document_id: document.id.clone(),
                        filename: document.filename.clone(),
                        chunk_index: None,
                        reason: reason.clone(),
                    });
                    summary.failed_documents.push(FailedDocument {
                        document_id: document.id,
                        filename: document.filename,
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            loan_id,
            documents = summary.total_documents,
            indexed = summary.indexed_count,
            failed = summary.failed_documents.len(),
            chunks = summary.chunks_indexed,
            "Loan indexing completed"
        );
        Ok(summary)
    }

    async fn list_document_vectors(
        &self,
        loan_id: &str,
        document_id: &str,
    ) -> Result<Vec<StoredPoint>, VectorStoreError> {
        let store = &self.store;
        let filter = &MetadataFilter::for_document(loan_id, document_id);
        self.settings
            .retry
            .run("list_document_vectors", move || store.list(filter))
            .await
    }

    async fn delete_vectors(&self, ids: &[String]) -> Result<(), VectorStoreError> {
        let store = &self.store;
        self.settings
            .retry
            .run("delete_stale_vectors", move || store.delete(ids.to_vec()))
            .await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let embedder = &self.embedder;
        let vectors = self
            .settings
            .retry
            .run("embed_chunks", move || embedder.generate_embeddings(texts.to_vec()))
            .await?;
        validate_vectors(&vectors, texts.len(), embedder.dimension())?;
        Ok(vectors)
    }

    async fn upsert_batch(&self, vectors: &[IndexedVector]) -> Result<(), VectorStoreError> {
        let store = &self.store;
        self.settings
            .retry
            .run("upsert_vectors", move || store.upsert(vectors.to_vec()))
            .await
    }

    /// Embed chunks in batches, falling back to one call per chunk when a batch fails.
    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        errors: &mut Vec<ChunkError>,
    ) -> Vec<(Chunk, Vec<f32>)> {
        let mut embedded = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.settings.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let error = match self.embed_batch(&texts).await {
                Ok(vectors) => {
                    embedded.extend(batch.iter().cloned().zip(vectors));
                    continue;
                }
                Err(error) => error,
            };

            if batch.len() == 1 {
                errors.push(embedding_failure(&batch[0], &error));
                continue;
            }
            tracing::warn!(
                batch = batch.len(),
                error = %error,
                "Embedding batch failed; retrying chunks individually"
            );
            for chunk in batch {
                match self.embed_batch(std::slice::from_ref(&chunk.text)).await {
                    Ok(mut vectors) => match vectors.pop() {
                        Some(vector) => embedded.push((chunk.clone(), vector)),
                        None => errors.push(ChunkError {
                            chunk_index: Some(chunk.chunk_index),
                            reason: "Embedding provider returned no vector".into(),
                        }),
                    },
                    Err(error) => errors.push(embedding_failure(chunk, &error)),
                }
            }
        }
        embedded
    }

    /// Upsert vectors in batches, falling back to one call per vector when a batch fails.
    /// Returns the number of vectors confirmed written.
    async fn upsert_vectors(
        &self,
        vectors: Vec<IndexedVector>,
        errors: &mut Vec<ChunkError>,
    ) -> usize {
        let mut written = 0;
        for batch in vectors.chunks(self.settings.batch_size.max(1)) {
            let error = match self.upsert_batch(batch).await {
                Ok(()) => {
                    written += batch.len();
                    continue;
                }
                Err(error) => error,
            };

            if batch.len() == 1 {
                errors.push(upsert_failure(&batch[0], &error));
                continue;
            }
            tracing::warn!(
                batch = batch.len(),
                error = %error,
                "Upsert batch failed; retrying vectors individually"
            );
            for vector in batch {
                match self.upsert_batch(std::slice::from_ref(vector)).await {
                    Ok(()) => written += 1,
                    Err(error) => errors.push(upsert_failure(vector, &error)),
                }
            }
        }
        written
    }
}

fn validate_loan_id(loan_id: &str) -> Result<&str, IndexError> {
    let trimmed = loan_id.trim();
    if trimmed.is_empty() {
        return Err(IndexError::InvalidLoanId(loan_id.to_string()));
    }
    Ok(trimmed)
}

/// SHA-256 over everything that ends up in a stored vector: the owning loan, the citation name
/// and type, the chunk window and the extracted text. Changing any of them forces a rewrite.
fn content_fingerprint(
    loan_id: &str,
    document: &Document,
    text: &str,
    chunker: &ChunkerSettings,
) -> String {
    let mut hasher = Sha256::new();
    for field in [loan_id, document.display_name(), document.display_type()] {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(chunker.max_chars().to_le_bytes());
    hasher.update(chunker.overlap_chars().to_le_bytes());
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_unchanged(points: &[StoredPoint], new_ids: &[String], content_hash: &str) -> bool {
    let stored: BTreeSet<&str> = points.iter().map(|point| point.vector_id.as_str()).collect();
    let fresh: BTreeSet<&str> = new_ids.iter().map(String::as_str).collect();
    stored == fresh
        && points.iter().all(|point| {
            point
                .metadata
                .as_ref()
                .is_some_and(|metadata| metadata.content_hash == content_hash)
        })
}

fn embedding_failure(chunk: &Chunk, error: &EmbeddingClientError) -> ChunkError {
    tracing::warn!(
        document_id = %chunk.document_id,
        chunk_index = chunk.chunk_index,
        error = %error,
        "Chunk embedding failed"
    );
    ChunkError {
        chunk_index: Some(chunk.chunk_index),
        reason: format!("Embedding failed: {error}"),
    }
}

fn upsert_failure(vector: &IndexedVector, error: &VectorStoreError) -> ChunkError {
    tracing::warn!(
        document_id = %vector.metadata.document_id,
        chunk_index = vector.metadata.chunk_index,
        error = %error,
        "Chunk upsert failed"
    );
    ChunkError {
        chunk_index: Some(vector.metadata.chunk_index),
        reason: format!("Upsert failed: {error}"),
    }
}
