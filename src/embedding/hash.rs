use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;

/// Deterministic offline embedder that hashes bytes into vector slots.
///
/// Identical text always maps to the identical unit vector, which makes it useful for local
/// development and pipeline tests without a provider.
pub struct HashEmbeddingClient {
    model: String,
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a client producing vectors of `dimension` slots.
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
        }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for (idx, byte) in text.bytes().enumerate() {
            embedding[idx % dimension] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        tracing::trace!(model = %self.model, texts = texts.len(), "Hashing embeddings");
        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
