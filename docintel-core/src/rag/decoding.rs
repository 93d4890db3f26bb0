//! Constrained greedy decoding on top of a [`LanguageModel`].
//!
//! The language model only scores the next token. Everything that keeps the
//! output bounded and non-degenerate lives here:
//!
//! - a hard cap on newly generated tokens, independent of prompt length
//! - a no-repeat-n-gram ban over the whole sequence, prompt included
//! - stopping at end-of-sequence or any other stop marker
//! - stopping before the model's context window overflows
//!
//! Selection is greedy: the highest-scoring allowed token wins, ties going to
//! the lowest token id, so the same prompt always yields the same output.

use crate::provider::{LanguageModel, ProviderError, Tokenizer};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_NO_REPEAT_NGRAM_SIZE: usize = 2;

#[derive(Debug, Error)]
pub enum DecodingError {
    #[error("Prompt encodes to zero tokens")]
    EmptyPrompt,

    #[error("Prompt is {tokens} tokens but the model accepts at most {limit}")]
    PromptTooLong { tokens: usize, limit: usize },

    #[error("Language model returned no logits")]
    EmptyLogits,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, DecodingError>;

/// Parameters for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_new_tokens: usize,
    /// `0` disables the repetition ban.
    pub no_repeat_ngram_size: usize,
    /// Generation stops once the output ends with any of these.
    pub stop_markers: Vec<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_new_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            max_new_tokens,
            no_repeat_ngram_size: DEFAULT_NO_REPEAT_NGRAM_SIZE,
            stop_markers: Vec::new(),
        }
    }

    pub fn with_no_repeat_ngram_size(mut self, size: usize) -> Self {
        self.no_repeat_ngram_size = size;
        self
    }

    pub fn with_stop_marker(mut self, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        if !self.stop_markers.contains(&marker) {
            self.stop_markers.push(marker);
        }
        self
    }
}

/// Why generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The output ended with a stop marker (end-of-sequence included).
    StopMarker,
    /// `max_new_tokens` were generated.
    MaxNewTokens,
    /// The context window is full.
    ContextFull,
    /// Every vocabulary entry was banned by the repetition constraint.
    NoAllowedToken,
}

/// Result of [`DecodingPolicy::generate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Decoded prompt plus continuation, stop marker removed.
    pub text: String,
    pub new_tokens: usize,
    pub stop_reason: StopReason,
}

/// Greedy decoder enforcing length, repetition and stop constraints.
#[derive(Clone)]
pub struct DecodingPolicy {
    tokenizer: Arc<dyn Tokenizer>,
    model: Arc<dyn LanguageModel>,
}

impl DecodingPolicy {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, model: Arc<dyn LanguageModel>) -> Self {
        Self { tokenizer, model }
    }

    /// Generates a continuation of `request.prompt`.
    ///
    /// Blocking: one model call per generated token. Callers on an async
    /// runtime should run this on a blocking thread.
    ///
    /// # Errors
    ///
    /// Fails if the prompt is empty or longer than the model's context
    /// window, or if the tokenizer or model fail.
    pub fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let mut tokens = self.tokenizer.encode(&request.prompt)?;
        if tokens.is_empty() {
            return Err(DecodingError::EmptyPrompt);
        }

        let limit = self.model.max_context_tokens();
        if tokens.len() > limit {
            return Err(DecodingError::PromptTooLong {
                tokens: tokens.len(),
                limit,
            });
        }

        let stop_sequences = self.stop_sequences(&request.stop_markers)?;
        let prompt_len = tokens.len();
        let mut stop_reason = StopReason::MaxNewTokens;

        while tokens.len() - prompt_len < request.max_new_tokens {
            if tokens.len() >= limit {
                stop_reason = StopReason::ContextFull;
                break;
            }

            let mut logits = self.model.next_token_logits(&tokens)?;
            if logits.is_empty() {
                return Err(DecodingError::EmptyLogits);
            }

            for banned in banned_tokens(&tokens, request.no_repeat_ngram_size) {
                if let Some(logit) = logits.get_mut(banned as usize) {
                    *logit = f32::NEG_INFINITY;
                }
            }

            let Some(next) = argmax(&logits) else {
                stop_reason = StopReason::NoAllowedToken;
                break;
            };
            tokens.push(next);

            let generated = &tokens[prompt_len..];
            if let Some(stop) = stop_sequences.iter().find(|s| generated.ends_with(s)) {
                tokens.truncate(tokens.len() - stop.len());
                stop_reason = StopReason::StopMarker;
                break;
            }
        }

        let new_tokens = tokens.len() - prompt_len;
        debug!(new_tokens, ?stop_reason, "Generation finished");

        Ok(Generation {
            text: self.tokenizer.decode(&tokens)?,
            new_tokens,
            stop_reason,
        })
    }

    /// Resolves stop markers to token sequences: a single vocabulary id when
    /// the marker is a known token, otherwise its encoding.
    fn stop_sequences(&self, markers: &[String]) -> Result<Vec<Vec<u32>>> {
        let mut sequences = Vec::with_capacity(markers.len());
        for marker in markers {
            let sequence = match self.tokenizer.token_id(marker) {
                Some(id) => vec![id],
                None => self.tokenizer.encode(marker)?,
            };
            if sequence.is_empty() {
                debug!("Ignoring stop marker {:?}: encodes to nothing", marker);
                continue;
            }
            sequences.push(sequence);
        }
        Ok(sequences)
    }
}

/// Tokens that would complete an n-gram already present in `tokens`.
///
/// The last `n - 1` tokens form the prefix of the next n-gram; every token
/// that followed that prefix earlier in the sequence is banned.
pub fn banned_tokens(tokens: &[u32], n: usize) -> HashSet<u32> {
    let mut banned = HashSet::new();
    if n == 0 || tokens.len() + 1 < n {
        return banned;
    }

    let prefix = &tokens[tokens.len() + 1 - n..];
    for window in tokens.windows(n) {
        if &window[..n - 1] == prefix {
            banned.insert(window[n - 1]);
        }
    }
    banned
}

/// Index of the largest logit; the lowest id wins ties.
/// `None` when every entry is `-inf` or NaN.
fn argmax(logits: &[f32]) -> Option<u32> {
    let mut best: Option<(usize, f32)> = None;
    for (id, &logit) in logits.iter().enumerate() {
        if logit.is_nan() || logit == f32::NEG_INFINITY {
            continue;
        }
        if best.map_or(true, |(_, score)| logit > score) {
            best = Some((id, logit));
        }
    }
    best.map(|(id, _)| id as u32)
}
