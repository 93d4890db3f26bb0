//! docintel-core - Document intelligence engine
//!
//! Provides the components behind two capabilities:
//! - Topic classification of free text (AG News classes by default)
//! - Question answering over a fixed knowledge base with retrieval-augmented
//!   generation (RAG)
//!
//! Supporting pieces:
//! - Model provider abstraction (Ollama embeddings, local candle backends)
//! - Configuration management
//! - Best-effort request logging
//! - Server API over a Unix socket
//!
//! ## Primary API
//!
//! Build an [`AppContext`] once at start-up and either serve it with
//! [`Server`] or call [`AppContext::classify`] and [`AppContext::answer`]
//! directly.

// Public modules
pub mod classifier;
pub mod config;
pub mod context;
pub mod provider;
pub mod rag;
pub mod request_log;
pub mod server;

// Public exports
pub use classifier::{ClassificationResult, Classifier, ClassifierError, AG_NEWS_CLASSES};
pub use config::Config;
pub use context::{
    AnswerRequest, AnswerResponse, AppContext, Capability, ClassifyRequest, ClassifyResponse,
    ServiceError, ServiceStatus,
};
pub use rag::{RagEngine, RagError};
pub use request_log::{JsonlRequestLog, LogEntry, RequestLog};
pub use server::Server;

// Provider exports
pub use provider::{
    ClassificationModel, EmbeddingProvider, LabelScore, LanguageModel, ProviderError, Tokenizer,
};
