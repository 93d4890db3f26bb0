//! Builds the configured backend for each model role.

use super::types::*;
use super::OllamaProvider;
use crate::config::{ClassifierConfig, EmbeddingBackend, EmbeddingConfig, GeneratorConfig};
use std::sync::Arc;

/// Tokenizer and model of the generative decoder.
pub struct GeneratorParts {
    pub tokenizer: Arc<dyn Tokenizer>,
    pub model: Arc<dyn LanguageModel>,
}

pub fn embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.backend {
        EmbeddingBackend::Ollama => Ok(Arc::new(OllamaProvider::from_config(config))),
        EmbeddingBackend::Candle => local::embedding_provider(config),
    }
}

pub fn generator(config: &GeneratorConfig) -> Result<GeneratorParts> {
    local::generator(config)
}

pub fn classification_model(config: &ClassifierConfig) -> Result<Arc<dyn ClassificationModel>> {
    local::classification_model(config)
}

#[cfg(feature = "candle")]
mod local {
    use super::*;
    use crate::provider::candle::{BertClassifier, BertEmbedder, Qwen2Generator};
    use crate::provider::HfTokenizer;

    pub fn embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(BertEmbedder::load(&config.model_dir)?))
    }

    pub fn generator(config: &GeneratorConfig) -> Result<GeneratorParts> {
        let tokenizer = HfTokenizer::from_dir(&config.model_dir)?;
        let model = Qwen2Generator::load(&config.model_dir, config.max_context_tokens)?;
        Ok(GeneratorParts {
            tokenizer: Arc::new(tokenizer),
            model: Arc::new(model),
        })
    }

    pub fn classification_model(
        config: &ClassifierConfig,
    ) -> Result<Arc<dyn ClassificationModel>> {
        Ok(Arc::new(BertClassifier::load(&config.model_dir)?))
    }
}

#[cfg(not(feature = "candle"))]
mod local {
    use super::*;

    fn unsupported(role: &str) -> ProviderError {
        ProviderError::Unsupported(format!(
            "the local {} backend requires the `candle` feature",
            role
        ))
    }

    pub fn embedding_provider(_config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        Err(unsupported("embedding"))
    }

    pub fn generator(_config: &GeneratorConfig) -> Result<GeneratorParts> {
        Err(unsupported("generator"))
    }

    pub fn classification_model(
        _config: &ClassifierConfig,
    ) -> Result<Arc<dyn ClassificationModel>> {
        Err(unsupported("classifier"))
    }
}
