//! Retrieval Augmented Generation (RAG) question answering.
//!
//! This module answers a natural-language question from a fixed knowledge
//! base: it retrieves the passages nearest to the question, renders them into
//! a prompt and lets a small generative model continue it.
//!
//! # Architecture
//!
//! - [`SimilarityIndex`]: exact nearest-neighbor search over passage vectors
//! - [`IndexedCorpus`]: passage texts paired position-for-position with the index
//! - [`Embedder`]: text to vector through an embedding provider
//! - [`Retriever`]: question to nearest passage texts
//! - [`PromptAssembler`]: passages and question to a prompt, within a token budget
//! - [`DecodingPolicy`]: bounded, repetition-free greedy generation
//! - [`extract_answer`]: raw generated text back to the answer span
//! - [`RagEngine`]: the whole pipeline behind one call
//!
//! # How It Works
//!
//! 1. **Indexing** (offline, `docintel index build`):
//!    - The knowledge base (a JSON array of passages) is embedded in batches
//!    - The vectors are written as an index snapshot
//!
//! 2. **Retrieval**:
//!    - The question is embedded, fresh on every call
//!    - The `top_k` nearest passages are looked up by position
//!
//! 3. **Generation**:
//!    - Passages are rendered nearest-first; the lowest-ranked are dropped if
//!      the prompt would not leave room for `max_new_tokens`
//!    - The generator continues the prompt under a no-repeat-n-gram ban and a
//!      hard token cap
//!    - The text after the final `Answer:` marker is the answer

mod answer;
mod corpus;
mod decoding;
mod embedder;
mod index;
mod prompt;
mod retriever;
mod types;

pub use answer::{extract_answer, ANSWER_MARKER};
pub use corpus::{load_knowledge_base, CorpusError, IndexedCorpus};
pub use decoding::{
    banned_tokens, DecodingError, DecodingPolicy, Generation, GenerationRequest, StopReason,
    DEFAULT_NO_REPEAT_NGRAM_SIZE,
};
pub use embedder::{Embedder, EmbedderError, BATCH_SIZE};
pub use index::{IndexError, Metric, SimilarityIndex};
pub use prompt::{AssembledPrompt, PromptAssembler, PromptError, INSTRUCTION};
pub use retriever::Retriever;
pub use types::{Neighbor, Passage, RetrievalResult, ScoredPassage};

use crate::config::Config;
use crate::provider::{LanguageModel, Tokenizer};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Embedder error: {0}")]
    Embedder(#[from] EmbedderError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Decoding error: {0}")]
    Decoding(#[from] DecodingError),

    #[error("Generation task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

/// Knobs of the answering pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    pub top_k: usize,
    pub max_new_tokens: usize,
    pub no_repeat_ngram_size: usize,
    /// Upper bound on prompt plus generated tokens; the model's own window
    /// applies too when it is smaller.
    pub max_context_tokens: usize,
    /// Generation stops at this token. `None` runs to the token cap.
    pub eos_token: Option<String>,
}

impl GenerationSettings {
    pub fn from_config(config: &Config) -> Self {
        let eos = config.generator.eos_token.trim();
        Self {
            top_k: config.rag.top_k,
            max_new_tokens: config.rag.max_new_tokens,
            no_repeat_ngram_size: config.rag.no_repeat_ngram_size,
            max_context_tokens: config.generator.max_context_tokens,
            eos_token: (!eos.is_empty()).then(|| eos.to_string()),
        }
    }

    /// Prompt tokens left once `max_new_tokens` is reserved, given the
    /// generator's own window. Zero means no question can ever be answered.
    pub fn prompt_budget(&self, model_window: usize) -> usize {
        self.max_context_tokens
            .min(model_window)
            .saturating_sub(self.max_new_tokens)
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A generated answer with the evidence it was generated from.
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub answer: String,
    /// Retrieved passages, nearest first.
    pub passages: Vec<ScoredPassage>,
    /// How many of `passages` fit in the prompt.
    pub passages_used: usize,
    pub new_tokens: usize,
    pub stop_reason: StopReason,
}

/// The question answering pipeline.
///
/// Holds only read-only shared state, so one engine serves any number of
/// concurrent questions. Cloning is cheap.
///
/// # Example
///
/// ```no_run
/// # use docintel_core::rag::{RagEngine, Retriever, GenerationSettings};
/// # use docintel_core::provider::{LanguageModel, Tokenizer};
/// # use std::sync::Arc;
/// # async fn example(
/// #     retriever: Retriever,
/// #     tokenizer: Arc<dyn Tokenizer>,
/// #     model: Arc<dyn LanguageModel>,
/// # ) {
/// let engine = RagEngine::new(retriever, tokenizer, model, GenerationSettings::default());
/// let answer = engine.answer("What is the capital of France?").await.unwrap();
/// println!("{}", answer);
/// # }
/// ```
#[derive(Clone)]
pub struct RagEngine {
    retriever: Retriever,
    tokenizer: Arc<dyn Tokenizer>,
    decoder: DecodingPolicy,
    prompt_budget: usize,
    settings: GenerationSettings,
}

impl RagEngine {
    pub fn new(
        retriever: Retriever,
        tokenizer: Arc<dyn Tokenizer>,
        model: Arc<dyn LanguageModel>,
        settings: GenerationSettings,
    ) -> Self {
        let prompt_budget = settings.prompt_budget(model.max_context_tokens());
        let decoder = DecodingPolicy::new(tokenizer.clone(), model);
        Self {
            retriever,
            tokenizer,
            decoder,
            prompt_budget,
            settings,
        }
    }

    /// Answers `question` from the configured `top_k` passages.
    ///
    /// Always returns a string on success, possibly empty when the generator
    /// produced nothing usable.
    ///
    /// # Errors
    ///
    /// [`RagError::EmptyQuestion`] before any model call for a blank
    /// question; otherwise whatever retrieval, prompt assembly or generation
    /// failed with.
    pub async fn answer(&self, question: &str) -> Result<String> {
        Ok(self.ask(question, self.settings.top_k).await?.answer)
    }

    /// Answers `question` from its `k` nearest passages, keeping the evidence.
    pub async fn ask(&self, question: &str, k: usize) -> Result<RagAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }

        let passages = self.retriever.retrieve_scored(question, k).await?;
        let texts: Vec<&str> = passages.iter().map(|p| p.passage.text.as_str()).collect();

        let prompt = PromptAssembler::assemble_within(
            &texts,
            question,
            self.prompt_budget,
            self.tokenizer.as_ref(),
        )?;

        let mut request = GenerationRequest::new(prompt.text.clone(), self.settings.max_new_tokens)
            .with_no_repeat_ngram_size(self.settings.no_repeat_ngram_size);
        if let Some(eos) = &self.settings.eos_token {
            request = request.with_stop_marker(eos.clone());
        }

        let decoder = self.decoder.clone();
        let generation = tokio::task::spawn_blocking(move || decoder.generate(&request))
            .await
            .map_err(|e| RagError::Join(e.to_string()))??;

        let answer = extract_answer(&generation.text, &prompt.text);
        debug!(
            new_tokens = generation.new_tokens,
            stop = ?generation.stop_reason,
            "Extracted answer of {} chars",
            answer.len()
        );

        Ok(RagAnswer {
            answer,
            passages,
            passages_used: prompt.passages_used,
            new_tokens: generation.new_tokens,
            stop_reason: generation.stop_reason,
        })
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }
}

/// Embeds every passage and builds the corpus the retriever searches.
pub async fn build_corpus(
    embedder: &Embedder,
    texts: Vec<String>,
    metric: Metric,
) -> Result<IndexedCorpus> {
    if texts.is_empty() {
        return Err(CorpusError::Empty.into());
    }
    let embeddings = embedder.embed_corpus(&texts).await?;
    let corpus = IndexedCorpus::from_embeddings(texts, &embeddings, metric)?;
    info!(
        passages = corpus.len(),
        dimension = corpus.index().dimension(),
        "Built similarity index"
    );
    Ok(corpus)
}
