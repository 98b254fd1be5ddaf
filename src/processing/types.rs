//! Core data types and error definitions for the indexing and retrieval pipeline.

use crate::source::DocumentSourceError;
use crate::store::QueryMatch;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const UNKNOWN_DOCUMENT_NAME: &str = "Unknown document";
const UNKNOWN_DOCUMENT_TYPE: &str = "Unknown type";

/// Errors produced while configuring the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkingError {
    /// Window size must be positive and strictly larger than the overlap.
    #[error("max_chars ({max_chars}) must be > 0 and greater than overlap_chars ({overlap_chars})")]
    InvalidConfig {
        /// Requested window size.
        max_chars: usize,
        /// Requested overlap.
        overlap_chars: usize,
    },
}

/// Loan document supplied by an external document source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Stable document identifier.
    pub id: String,
    /// Owning loan; may be left empty when the batch supplies it.
    #[serde(default)]
    pub loan_id: String,
    /// Original file name, used as the citation label.
    #[serde(default)]
    pub filename: Option<String>,
    /// Document classification, e.g. `appraisal`.
    #[serde(default)]
    pub doc_type: Option<String>,
    /// Broader grouping used when no explicit type is set.
    #[serde(default)]
    pub category: Option<String>,
    /// Extracted text or generated HTML.
    #[serde(default, alias = "content")]
    pub text_content: String,
    /// MIME type of the stored file, when known.
    #[serde(default)]
    pub file_type: Option<String>,
}

impl Document {
    /// Name shown in citations.
    pub fn display_name(&self) -> &str {
        self.filename
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_DOCUMENT_NAME)
    }

    /// Classification shown in citations, falling back to the category.
    pub fn display_type(&self) -> &str {
        self.doc_type
            .as_deref()
            .or(self.category.as_deref())
            .filter(|kind| !kind.trim().is_empty())
            .unwrap_or(UNKNOWN_DOCUMENT_TYPE)
    }
}

/// Contiguous passage of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Source document.
    pub document_id: String,
    /// Owning loan.
    pub loan_id: String,
    /// Zero-based position; contiguous across the document.
    pub chunk_index: usize,
    /// Passage text.
    pub text: String,
    /// Inclusive start offset in characters.
    pub char_start: usize,
    /// Exclusive end offset in characters.
    pub char_end: usize,
}

/// Failure recorded for a single chunk (or, without an index, for the whole document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkError {
    /// Chunk that failed; `None` for document-level steps such as stale cleanup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// Human-readable failure description.
    pub reason: String,
}

/// Result of indexing one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentIndexOutcome {
    /// Indexed document.
    pub document_id: String,
    /// Chunks produced from the document text.
    pub chunk_count: usize,
    /// Chunks whose vectors were confirmed written.
    pub indexed_chunk_count: usize,
    /// Stale vectors deleted because the document shrank.
    pub removed_stale_count: usize,
    /// Stored vectors already matched the content; nothing was written.
    pub unchanged: bool,
    /// Per-chunk and cleanup failures.
    pub errors: Vec<ChunkError>,
}

/// Document that produced no indexed vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDocument {
    /// Document identifier.
    pub document_id: String,
    /// File name, when known.
    pub filename: Option<String>,
    /// Summary of why the document failed.
    pub reason: String,
}

/// Flattened error entry reported by the index endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexErrorEntry {
    /// Document the error belongs to.
    pub document_id: String,
    /// File name, when known.
    pub filename: Option<String>,
    /// Failing chunk, if the error is chunk-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// Failure description.
    pub reason: String,
}

/// Result of indexing a batch of documents for one loan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanIndexOutcome {
    /// Loan the batch belongs to.
    pub loan_id: String,
    /// Documents submitted.
    pub total_documents: usize,
    /// Documents that indexed at least one chunk or had nothing to index.
    pub indexed_count: usize,
    /// Chunk vectors written across the batch.
    pub chunks_indexed: usize,
    /// Per-document outcomes in input order.
    pub documents: Vec<DocumentIndexOutcome>,
    /// Documents that failed entirely.
    pub failed_documents: Vec<FailedDocument>,
    /// Every chunk-level and document-level error in the batch.
    pub errors: Vec<IndexErrorEntry>,
}

/// Errors that stop a document (or a whole loan batch) from being indexed.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Document has no identifier.
    #[error("Document id is required")]
    MissingDocumentId,
    /// Loan identifier was blank or unsafe.
    #[error("Invalid loan id: {0:?}")]
    InvalidLoanId(String),
    /// Document belongs to another loan than the batch.
    #[error("Document {document_id} belongs to loan {actual}, not {expected}")]
    LoanMismatch {
        /// Offending document.
        document_id: String,
        /// Loan the batch targets.
        expected: String,
        /// Loan recorded on the document.
        actual: String,
    },
    /// No document source is configured for pull-based indexing.
    #[error("No document source configured")]
    SourceNotConfigured,
    /// Document source failed to supply documents.
    #[error("Document source failed: {0}")]
    Source(#[from] DocumentSourceError),
}

/// Errors raised while answering a query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Loan identifier was blank.
    #[error("loanId is required")]
    InvalidLoanId,
    /// Query text was blank.
    #[error("query must not be empty")]
    EmptyQuery,
    /// Requested match count was zero.
    #[error("topK must be at least 1")]
    InvalidTopK,
    /// Query text could not be embedded.
    #[error("Query embedding failed: {0}")]
    QueryEmbeddingFailed(String),
    /// Vector store could not answer.
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),
}

/// Parameters accepted by the query pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Loan whose documents are searched.
    pub loan_id: String,
    /// Natural language question.
    pub query: String,
    /// Requested number of matches; defaults are applied downstream.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Answer to a query: ranked matches plus the assembled context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    /// Loan searched.
    pub loan_id: String,
    /// Query text as received.
    pub query: String,
    /// Ranked matches returned by the retriever.
    pub contexts: Vec<QueryMatch>,
    /// Citation-numbered context for the language model.
    pub context_string: String,
    /// Matches returned by the retriever.
    pub match_count: usize,
    /// Whether the context was cut to fit the budget.
    pub truncated: bool,
    /// Token estimate for `context_string`.
    pub estimated_tokens: usize,
}
