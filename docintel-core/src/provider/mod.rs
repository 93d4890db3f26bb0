//! Model provider abstraction layer.
//!
//! The pipeline consumes every model through a narrow trait defined here:
//! embeddings ([`EmbeddingProvider`]), tokenization ([`Tokenizer`]), next-token
//! scoring ([`LanguageModel`]) and sequence classification
//! ([`ClassificationModel`]). Concrete backends live in the submodules and are
//! selected from configuration by [`loader`].

mod types;
pub mod hf_tokenizer;
pub mod loader;
pub mod ollama;

#[cfg(feature = "candle")]
pub mod candle;

// Re-export common types
pub use types::{
    ClassificationModel,
    EmbedInput,
    EmbedRequest,
    EmbedResponse,
    EmbeddingProvider,
    LabelScore,
    LanguageModel,
    ProviderError,
    Result,
    Tokenizer,
};

// Re-export provider implementations
pub use hf_tokenizer::HfTokenizer;
pub use ollama::OllamaProvider;
