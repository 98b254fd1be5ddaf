use super::{EmbeddingClient, EmbeddingClientError, clip_input, validate_vectors};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbeddingClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    max_input_chars: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    /// Create a client for `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(
        base_url: &str,
        api_key: String,
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
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model,
            dimension,
            max_input_chars,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
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

        tracing::debug!(model = %self.model, inputs = expected, "Requesting OpenAI embeddings");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": input }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(%status, model = %self.model, "OpenAI embedding request failed");
            return Err(EmbeddingClientError::Provider { status, message });
        }

        let mut payload: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingClientError::InvalidResponse(err.to_string()))?;
        payload.data.sort_by_key(|datum| datum.index);
        let vectors: Vec<Vec<f32>> = payload
            .data
            .into_iter()
            .map(|datum| datum.embedding)
            .collect();
        validate_vectors(&vectors, expected, self.dimension)?;
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Transient;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer, dimension: usize) -> OpenAiEmbeddingClient {
        OpenAiEmbeddingClient::new(
            &server.url("/v1"),
            "sk-test".into(),
            "text-embedding-ada-002".into(),
            dimension,
            8000,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn reorders_vectors_by_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test")
                    .json_body(json!({
                        "model": "text-embedding-ada-002",
                        "input": ["first", "second"]
                    }));
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let vectors = client(&server, 2)
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await
            .expect("embeddings");
        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn provider_errors_carry_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(429).body("rate limited");
            })
            .await;

        let error = client(&server, 2)
            .generate_embeddings(vec!["x".into()])
            .await
            .expect_err("should fail");
        assert!(error.is_transient());
        assert!(error.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200)
                    .json_body(json!({ "data": [ { "index": 0, "embedding": [1.0] } ] }));
            })
            .await;

        let error = client(&server, 2)
            .generate_embeddings(vec!["x".into()])
            .await
            .expect_err("should fail");
        assert!(matches!(error, EmbeddingClientError::InvalidResponse(_)));
    }
}
