//! Process-wide application state.
//!
//! [`AppContext`] is built once at start-up and shared read-only by every
//! request. Each capability either loaded completely or is
//! [`Capability::Unavailable`] with the reason it failed; a broken capability
//! never takes the other one down with it.

use crate::classifier::{ClassificationResult, Classifier, ClassifierError};
use crate::config::Config;
use crate::provider::loader;
use crate::provider::loader::GeneratorParts;
use crate::rag::{
    build_corpus, load_knowledge_base, Embedder, GenerationSettings, IndexedCorpus, PromptError,
    RagEngine, RagError, Retriever,
};
use crate::request_log::{record_best_effort, JsonlRequestLog, RequestLog};
use anyhow::{bail, Context as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Endpoint names used for request log records.
pub const CLASSIFY_ENDPOINT: &str = "/classify";
pub const ANSWER_ENDPOINT: &str = "/answer";

/// Failures surfaced to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Question answering is unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Classification is unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::RetrievalUnavailable(_) => "retrieval_unavailable",
            ServiceError::ClassificationUnavailable(_) => "classification_unavailable",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<RagError> for ServiceError {
    fn from(e: RagError) -> Self {
        match e {
            RagError::EmptyQuestion => ServiceError::Validation(e.to_string()),
            RagError::Prompt(PromptError::QuestionTooLong { .. }) => {
                ServiceError::Validation(e.to_string())
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<ClassifierError> for ServiceError {
    fn from(e: ClassifierError) -> Self {
        match e {
            ClassifierError::EmptyText => ServiceError::Validation(e.to_string()),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
}

pub type ClassifyResponse = ClassificationResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

/// A start-up loaded component, or why it could not be loaded.
pub enum Capability<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> Capability<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            Capability::Ready(value) => Some(value),
            Capability::Unavailable(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Capability::Ready(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Capability::Ready(_) => None,
            Capability::Unavailable(reason) => Some(reason),
        }
    }
}

/// Availability of one capability, as reported by [`AppContext::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityStatus {
    pub name: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub message: String,
    pub capabilities: Vec<CapabilityStatus>,
}

/// Loaded models and sinks shared by all requests.
pub struct AppContext {
    rag: Capability<RagEngine>,
    classifier: Capability<Classifier>,
    request_log: Option<Arc<dyn RequestLog>>,
}

impl AppContext {
    pub fn new(
        rag: Capability<RagEngine>,
        classifier: Capability<Classifier>,
        request_log: Option<Arc<dyn RequestLog>>,
    ) -> Self {
        Self {
            rag,
            classifier,
            request_log,
        }
    }

    /// Loads every capability described by `config`.
    ///
    /// Never fails as a whole: a capability that cannot load is logged and
    /// recorded as unavailable.
    pub async fn load(config: &Config) -> Self {
        let rag = match load_rag(config).await {
            Ok(engine) => {
                info!("Question answering ready");
                Capability::Ready(engine)
            }
            Err(e) => {
                error!("Question answering unavailable: {:#}", e);
                Capability::Unavailable(format!("{:#}", e))
            }
        };

        let classifier = match load_classifier(config).await {
            Ok(classifier) => {
                info!("Classification ready");
                Capability::Ready(classifier)
            }
            Err(e) => {
                error!("Classification unavailable: {:#}", e);
                Capability::Unavailable(format!("{:#}", e))
            }
        };

        let request_log = config.logging.request_log_path.as_ref().map(|path| {
            info!("Logging requests to {}", path.display());
            Arc::new(JsonlRequestLog::new(path)) as Arc<dyn RequestLog>
        });

        Self::new(rag, classifier, request_log)
    }

    /// Classifies a text into a topic class.
    pub async fn classify(
        &self,
        request: &ClassifyRequest,
    ) -> Result<ClassifyResponse, ServiceError> {
        if request.text.trim().is_empty() {
            return Err(ServiceError::Validation("text must not be empty".to_string()));
        }

        let classifier = match &self.classifier {
            Capability::Ready(classifier) => classifier,
            Capability::Unavailable(reason) => {
                return Err(ServiceError::ClassificationUnavailable(reason.clone()))
            }
        };

        let response = classifier.classify(&request.text).await?;
        record_best_effort(
            self.request_log.clone(),
            CLASSIFY_ENDPOINT,
            request,
            &response,
        );
        Ok(response)
    }

    /// Answers a question from the knowledge base.
    pub async fn answer(&self, request: &AnswerRequest) -> Result<AnswerResponse, ServiceError> {
        if request.question.trim().is_empty() {
            return Err(ServiceError::Validation(
                "question must not be empty".to_string(),
            ));
        }

        let engine = match &self.rag {
            Capability::Ready(engine) => engine,
            Capability::Unavailable(reason) => {
                return Err(ServiceError::RetrievalUnavailable(reason.clone()))
            }
        };

        let response = AnswerResponse {
            answer: engine.answer(&request.question).await?,
        };
        record_best_effort(self.request_log.clone(), ANSWER_ENDPOINT, request, &response);
        Ok(response)
    }

    /// Welcome message and per-capability availability.
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            message: "Welcome to the document intelligence service".to_string(),
            capabilities: vec![
                capability_status("answer", &self.rag),
                capability_status("classify", &self.classifier),
            ],
        }
    }

    pub fn rag(&self) -> &Capability<RagEngine> {
        &self.rag
    }

    pub fn classifier(&self) -> &Capability<Classifier> {
        &self.classifier
    }
}

fn capability_status<T>(name: &str, capability: &Capability<T>) -> CapabilityStatus {
    CapabilityStatus {
        name: name.to_string(),
        available: capability.is_ready(),
        reason: capability.reason().map(str::to_string),
    }
}

/// Loads the knowledge base, its index and the generator.
pub async fn load_rag(config: &Config) -> anyhow::Result<RagEngine> {
    if config.rag.top_k == 0 {
        bail!("rag.top_k must be at least 1");
    }

    let provider = loader::embedding_provider(&config.embedding)
        .context("Failed to create embedding provider")?;
    let embedder = Embedder::new(provider);
    let corpus = load_corpus(config, &embedder).await?;

    let generator_config = config.generator.clone();
    let parts = tokio::task::spawn_blocking(move || loader::generator(&generator_config))
        .await?
        .with_context(|| {
            format!(
                "Failed to load generator from {}",
                config.generator.model_dir.display()
            )
        })?;

    let retriever = Retriever::new(embedder, Arc::new(corpus));
    assemble_engine(retriever, parts, GenerationSettings::from_config(config))
}

/// Builds the engine, refusing settings that leave no room for a prompt.
fn assemble_engine(
    retriever: Retriever,
    parts: GeneratorParts,
    settings: GenerationSettings,
) -> anyhow::Result<RagEngine> {
    let window = parts.model.max_context_tokens();
    if settings.prompt_budget(window) == 0 {
        bail!(
            "rag.max_new_tokens ({}) leaves no room for a prompt in a {}-token context",
            settings.max_new_tokens,
            settings.max_context_tokens.min(window)
        );
    }

    Ok(RagEngine::new(retriever, parts.tokenizer, parts.model, settings))
}

/// Loads the index snapshot, or builds and saves it when allowed and missing.
async fn load_corpus(config: &Config, embedder: &Embedder) -> anyhow::Result<IndexedCorpus> {
    let assets = &config.assets;
    if assets.build_index_if_missing && !assets.index_path.exists() {
        warn!(
            "No index at {}, building it from the knowledge base",
            assets.index_path.display()
        );
        let texts = load_knowledge_base(&assets.knowledge_base_path).with_context(|| {
            format!(
                "Failed to load knowledge base {}",
                assets.knowledge_base_path.display()
            )
        })?;
        let corpus = build_corpus(embedder, texts, config.rag.metric).await?;
        if let Err(e) = corpus.index().save(&assets.index_path) {
            warn!("Failed to save index to {}: {}", assets.index_path.display(), e);
        }
        return Ok(corpus);
    }

    let corpus = IndexedCorpus::load(&assets.knowledge_base_path, &assets.index_path)
        .with_context(|| {
            format!(
                "Failed to load knowledge base {} with index {}",
                assets.knowledge_base_path.display(),
                assets.index_path.display()
            )
        })?;
    if corpus.index().metric() != config.rag.metric {
        warn!(
            "Index uses {:?} but rag.metric is {:?}; searching with the index metric",
            corpus.index().metric(),
            config.rag.metric
        );
    }
    Ok(corpus)
}

pub async fn load_classifier(config: &Config) -> anyhow::Result<Classifier> {
    if config.classifier.class_names.is_empty() {
        bail!("classifier.class_names must not be empty");
    }

    let classifier_config = config.classifier.clone();
    let load = move || loader::classification_model(&classifier_config);
    let model = tokio::task::spawn_blocking(load)
        .await?
        .with_context(|| {
            format!(
                "Failed to load classification model from {}",
                config.classifier.model_dir.display()
            )
        })?;

    Classifier::checked(model, config.classifier.class_names.clone())
        .context("Classification model does not match classifier.class_names")
}
