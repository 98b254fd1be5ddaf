//! Records, filters and errors exchanged with vector store backends.

use crate::retry::Transient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Logical discriminator separating loan-scoped chunks from other content in the same store.
pub const LOAN_DOCUMENT_TYPE: &str = "loan-document";

const UNKNOWN_DOCUMENT_NAME: &str = "Unknown document";
const UNKNOWN_DOCUMENT_TYPE: &str = "Unknown type";

/// Namespace for deterministic vector identifiers.
const VECTOR_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c6f_616e_2d64_6f63_732d_7665_6374_6f72);

/// Errors surfaced by vector store backends.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// The store could not be reached or failed in a way worth retrying.
    #[error("Vector store unavailable: {0}")]
    Unavailable(String),
    /// The store rejected the request; repeating it will not help.
    #[error("Vector store rejected request: {0}")]
    Rejected(String),
}

impl Transient for VectorStoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Payload stored next to every passage embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMetadata {
    /// Loan that owns the source document.
    pub loan_id: String,
    /// Source document identifier.
    pub document_id: String,
    /// Document classification, e.g. `appraisal`.
    #[serde(default = "unknown_document_type")]
    pub document_type: String,
    /// Human-readable document name used in citations.
    #[serde(default = "unknown_document_name")]
    pub document_name: String,
    /// Zero-based chunk position within the document.
    pub chunk_index: usize,
    /// Number of chunks the document produced when this vector was written.
    #[serde(default)]
    pub total_chunks: usize,
    /// Logical type discriminator; always [`LOAN_DOCUMENT_TYPE`] for indexed loan chunks.
    #[serde(rename = "type")]
    pub kind: String,
    /// Origin tag carried for compatibility with other writers of the store.
    #[serde(default = "default_source")]
    pub source: String,
    /// SHA-256 fingerprint of the indexed content: loan, citation name and type, chunk
    /// settings and extracted text.
    #[serde(default)]
    pub content_hash: String,
    /// Passage text returned to callers for context assembly.
    #[serde(default)]
    pub text: String,
}

impl VectorMetadata {
    /// Look up a filterable field by its payload key.
    pub fn field(&self, key: &str) -> Option<String> {
        match key {
            "loanId" => Some(self.loan_id.clone()),
            "documentId" => Some(self.document_id.clone()),
            "documentType" => Some(self.document_type.clone()),
            "documentName" => Some(self.document_name.clone()),
            "chunkIndex" => Some(self.chunk_index.to_string()),
            "type" => Some(self.kind.clone()),
            "source" => Some(self.source.clone()),
            "contentHash" => Some(self.content_hash.clone()),
            _ => None,
        }
    }

    /// Parse a raw payload map, tolerating missing descriptive fields.
    pub fn from_payload(payload: serde_json::Map<String, Value>) -> Result<Self, VectorStoreError> {
        serde_json::from_value(Value::Object(payload))
            .map_err(|err| VectorStoreError::Rejected(format!("malformed payload: {err}")))
    }
}

fn unknown_document_type() -> String {
    UNKNOWN_DOCUMENT_TYPE.to_string()
}

fn unknown_document_name() -> String {
    UNKNOWN_DOCUMENT_NAME.to_string()
}

fn default_source() -> String {
    LOAN_DOCUMENT_TYPE.to_string()
}

/// Embedding plus metadata written for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    /// Deterministic identifier; see [`vector_id`].
    pub vector_id: String,
    /// Passage embedding.
    pub embedding: Vec<f32>,
    /// Payload stored alongside the embedding.
    pub metadata: VectorMetadata,
}

/// Scored match returned from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMatch {
    /// Identifier of the matched vector.
    pub vector_id: String,
    /// Similarity score; higher is closer.
    pub score: f32,
    /// Payload stored with the vector.
    pub metadata: VectorMetadata,
}

/// Identifier and payload of a stored vector, without its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    /// Vector identifier.
    pub vector_id: String,
    /// Stored payload; `None` when the backend returned a payload that could not be parsed.
    pub metadata: Option<VectorMetadata>,
}

/// Conjunctive exact-match filter over payload fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, String>,
}

impl MetadataFilter {
    /// Empty filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// Filter selecting every loan-document chunk of one loan.
    pub fn for_loan(loan_id: &str) -> Self {
        Self::new()
            .eq("type", LOAN_DOCUMENT_TYPE)
            .eq("loanId", loan_id)
    }

    /// Filter selecting every loan-document chunk of one document within one loan.
    pub fn for_document(loan_id: &str, document_id: &str) -> Self {
        Self::for_loan(loan_id).eq("documentId", document_id)
    }

    /// Iterate over `(key, value)` conditions in key order.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.conditions
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against stored metadata.
    pub fn matches(&self, metadata: &VectorMetadata) -> bool {
        self.conditions
            .iter()
            .all(|(key, expected)| metadata.field(key).as_deref() == Some(expected.as_str()))
    }
}

/// Ranking used for every result list: descending score, then ascending chunk index, then
/// ascending document id.
pub fn rank_order(a: &QueryMatch, b: &QueryMatch) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        .then_with(|| a.metadata.document_id.cmp(&b.metadata.document_id))
}

/// Derive the stable vector identifier for a document chunk.
///
/// Re-indexing the same `(loan_id, document_id, chunk_index)` triple always yields the same id,
/// so writes overwrite instead of duplicating. Two loans holding a document with the same id
/// never share a vector.
pub fn vector_id(loan_id: &str, document_id: &str, chunk_index: usize) -> String {
    let key = format!("loan-docs-{loan_id}-doc-{document_id}-chunk-{chunk_index}");
    Uuid::new_v5(&VECTOR_ID_NAMESPACE, key.as_bytes()).to_string()
}
