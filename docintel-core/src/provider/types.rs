//! Common types for model providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when interacting with a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Backend not available: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Maps text to a fixed-length dense vector.
///
/// Implementations must be deterministic for the same input and model
/// version; vectors from different models are not comparable.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for several texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Identifier of the model producing the vectors, for logs.
    fn model_name(&self) -> &str;
}

/// Converts between text and the generator's token ids.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Looks up the id of a single special or vocabulary token.
    fn token_id(&self, token: &str) -> Option<u32>;
}

/// Scores the next token for a context of token ids.
///
/// This is the raw generative model; length limits, repetition constraints
/// and stopping are applied by [`crate::rag::DecodingPolicy`].
pub trait LanguageModel: Send + Sync {
    /// Returns one logit per vocabulary entry for the token following `context`.
    fn next_token_logits(&self, context: &[u32]) -> Result<Vec<f32>>;

    /// Maximum number of positions (prompt plus generated tokens) the model accepts.
    fn max_context_tokens(&self) -> usize;
}

/// Output of a classification forward pass: the top label and its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label_id: usize,
    pub score: f32,
}

/// Sequence classification model.
pub trait ClassificationModel: Send + Sync {
    fn forward(&self, text: &str) -> Result<LabelScore>;

    /// Size of the label space, when the model knows it.
    fn num_labels(&self) -> Option<usize> {
        None
    }
}

/// Request for generating embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub model: String,
    pub input: EmbedInput,
}

/// A single text or a batch, serialized as a string or an array of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbedInput {
    Single(String),
    Batch(Vec<String>),
}

/// Response containing embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub model: String,

    #[serde(default)]
    pub embeddings: Vec<Vec<f32>>,
}
