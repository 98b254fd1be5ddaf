//! Loan document pipeline: extraction, chunking, indexing, retrieval and context assembly.

pub mod chunking;
pub mod context;
pub mod extract;
pub mod indexer;
pub mod retriever;
mod service;
pub mod types;

pub use chunking::{ChunkerSettings, TextChunk, chunk, chunk_document, chunk_with};
pub use context::{AssembledContext, ContextAssembler, NO_CONTEXT_SENTINEL, TRUNCATION_NOTICE};
pub use indexer::{Indexer, IndexerSettings};
pub use retriever::{Retriever, RetrieverSettings};
pub use service::{PipelineSettings, RagApi, RagService, ServiceInitError};
pub use types::{
    Chunk, ChunkError, ChunkingError, Document, DocumentIndexOutcome, FailedDocument,
    IndexError, IndexErrorEntry, LoanIndexOutcome, QueryOutcome, QueryRequest, RetrievalError,
};
