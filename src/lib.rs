#![deny(missing_docs)]

//! Loan document ingestion and retrieval pipeline.
//!
//! Documents are chunked, embedded and written to a vector store with loan-scoped metadata.
//! Queries are embedded with the same model, searched within one loan and assembled into a
//! citation-numbered context for a downstream language model.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Indexing and query metrics.
pub mod metrics;
/// Chunking, indexing, retrieval and context assembly.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Retry with exponential backoff for transient failures.
pub mod retry;
/// Document sources for pull-based indexing.
pub mod source;
/// Vector store abstraction and in-memory backend.
pub mod store;
