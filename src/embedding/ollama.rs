use super::{EmbeddingClient, EmbeddingClientError, clip_input, validate_vectors};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Client for the Ollama `/api/embed` endpoint.
pub struct OllamaEmbeddingClient {
    http: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    max_input_chars: usize,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Create a client for the Ollama runtime at `base_url`.
    pub fn new(
        base_url: &str,
        model: String,
        dimension: usize,
        max_input_chars: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("loan-rag/embeddings")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model,
            dimension,
            max_input_chars,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let input: Vec<String> = texts
            .into_iter()
            .map(|text| clip_input(text, self.max_input_chars))
            .collect();

        tracing::debug!(model = %self.model, inputs = expected, "Requesting Ollama embeddings");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "model": self.model, "input": input }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(%status, model = %self.model, "Ollama embedding request failed");
            return Err(EmbeddingClientError::Provider { status, message });
        }

        let payload: EmbedResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingClientError::InvalidResponse(err.to_string()))?;
        validate_vectors(&payload.embeddings, expected, self.dimension)?;
        Ok(payload.embeddings)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
