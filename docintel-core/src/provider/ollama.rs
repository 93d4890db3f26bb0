//! Ollama provider implementation.
//!
//! This module provides an Ollama HTTP API client that implements
//! [`EmbeddingProvider`].

use super::types::*;
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use tracing::debug;

/// Ollama HTTP API embedding provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Creates a new Ollama provider for the given server and embedding model.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(&config.base_url, &config.model)
    }

    async fn request(&self, input: EmbedInput) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);

        let embed_request = EmbedRequest {
            model: self.model.clone(),
            input,
        };

        let response = self.http_client
            .post(&url)
            .json(&embed_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let embed_response = response.json::<EmbedResponse>().await?;
        debug!(
            model = %embed_response.model,
            count = embed_response.embeddings.len(),
            "Received embedding response"
        );
        Ok(embed_response.embeddings)
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(EmbedInput::Single(text.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Api("No embeddings returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let embeddings = self
            .request(EmbedInput::Batch(texts.iter().map(|t| t.to_string()).collect()))
            .await?;

        if embeddings.len() != texts.len() {
            return Err(ProviderError::Api(format!(
                "Requested {} embeddings, received {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
