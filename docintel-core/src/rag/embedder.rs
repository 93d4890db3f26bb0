//! Embedding generation through an [`EmbeddingProvider`].

use crate::provider::{EmbeddingProvider, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Number of passages sent to the provider per request while building an index.
pub const BATCH_SIZE: usize = 32;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The provider returned an error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider returned a zero-length vector.
    #[error("Empty embedding returned")]
    EmptyEmbedding,

    /// A batch came back with a different number of vectors than texts.
    #[error("Batch {batch} returned {vectors} embeddings for {texts} texts")]
    CountMismatch {
        batch: usize,
        texts: usize,
        vectors: usize,
    },
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedderError>;

/// Converts questions and passages into vectors.
///
/// Questions are embedded one at a time with no caching: each call goes to
/// the provider. Passages are embedded in batches of [`BATCH_SIZE`] when a
/// similarity index is built.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// Generates the embedding for a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails or returns an empty vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.provider.embed(text).await?;
        if embedding.is_empty() {
            return Err(EmbedderError::EmptyEmbedding);
        }
        Ok(embedding)
    }

    /// Embeds every passage, preserving order.
    ///
    /// Every batch must yield exactly one vector per text, so vector `i` is
    /// always the embedding of `texts[i]`.
    pub async fn embed_corpus(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        info!(
            "Embedding {} passages with {}",
            texts.len(),
            self.provider.model_name()
        );

        let mut embeddings = Vec::with_capacity(texts.len());
        for (batch_number, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            let refs: Vec<&str> = batch.iter().map(|s| s.as_str()).collect();
            let vectors = self.provider.embed_batch(&refs).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedderError::CountMismatch {
                    batch: batch_number,
                    texts: batch.len(),
                    vectors: vectors.len(),
                });
            }
            if vectors.iter().any(|v| v.is_empty()) {
                return Err(EmbedderError::EmptyEmbedding);
            }
            embeddings.extend(vectors);
            info!(
                "Embedded batch {} ({}/{} passages)",
                batch_number + 1,
                embeddings.len(),
                texts.len()
            );
        }

        Ok(embeddings)
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }
}
