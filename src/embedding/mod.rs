//! Embedding client abstraction and provider adapters.
//!
//! Passages and queries must be embedded by the same model, so the service builds exactly one
//! client from configuration and hands the same handle to both the indexer and the retriever.

mod hash;
mod ollama;
mod openai;

use crate::config::{Config, EmbeddingProvider};
use crate::retry::Transient;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use hash::HashEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Network failure or timeout before a response arrived.
    #[error("Embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Provider answered with an error status.
    #[error("Embedding provider returned {status}: {message}")]
    Provider {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Error message or body reported by the provider.
        message: String,
    },
    /// Provider response did not line up with the request.
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl Transient for EmbeddingClientError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(error) => error.is_timeout() || error.is_connect(),
            Self::Provider { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::GenerationFailed(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding per input text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Model identifier used for every request.
    fn model(&self) -> &str;

    /// Dimensionality of every produced vector.
    fn dimension(&self) -> usize;
}

/// Build the embedding client selected by configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let client: Arc<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbeddingClient::new(
            config.embedding_model.clone(),
            config.embedding_dimension,
        )),
        EmbeddingProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                EmbeddingClientError::GenerationFailed("OPENAI_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiEmbeddingClient::new(
                &config.openai_base_url,
                api_key,
                config.embedding_model.clone(),
                config.embedding_dimension,
                config.embedding_max_input_chars,
                timeout,
            )?)
        }
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            &config.ollama_url,
            config.embedding_model.clone(),
            config.embedding_dimension,
            config.embedding_max_input_chars,
            timeout,
        )?),
    };
    tracing::info!(
        provider = ?config.embedding_provider,
        model = %client.model(),
        dimension = client.dimension(),
        "Embedding client initialized"
    );
    Ok(client)
}

/// Clip text to at most `max_chars` characters without splitting a UTF-8 sequence.
pub(crate) fn clip_input(text: String, max_chars: usize) -> String {
    if max_chars == 0 {
        return text;
    }
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text,
    }
}

/// Confirm a provider response has one vector of the right size per input.
pub(crate) fn validate_vectors(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingClientError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected_count} vectors, got {}",
            vectors.len()
        )));
    }
    if let Some(vector) = vectors.iter().find(|vector| vector.len() != dimension) {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected dimension {dimension}, got {}",
            vector.len()
        )));
    }
    Ok(())
}
