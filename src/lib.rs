//! docintel - Document intelligence engine
//!
//! This is the convenience wrapper crate that re-exports `docintel-core`.
//!
//! # Quick Start
//!
//! ```toml
//! [dependencies]
//! docintel = "0.1"  # Includes the local candle backends by default
//! ```
//!
//! # Features
//!
//! - `candle` (default): Load embedding, generation and classification
//!   models in-process from local safetensors assets

// Re-export core
pub use docintel_core::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use docintel_core::rag::{
        extract_answer, DecodingPolicy, Embedder, GenerationRequest, IndexedCorpus, Metric,
        PromptAssembler, Retriever, SimilarityIndex,
    };
    pub use docintel_core::*;
}
