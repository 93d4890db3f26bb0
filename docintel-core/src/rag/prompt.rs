//! Generation prompt rendering.

use super::answer::ANSWER_MARKER;
use crate::provider::{ProviderError, Tokenizer};
use thiserror::Error;
use tracing::{debug, warn};

/// Instruction line placed between the context and the question.
pub const INSTRUCTION: &str = "Answer the question using only the context above.";

const PASSAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Error)]
pub enum PromptError {
    /// Even with every passage dropped the prompt exceeds the budget.
    #[error("Question needs {required} prompt tokens but only {budget} are available")]
    QuestionTooLong { required: usize, budget: usize },

    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, PromptError>;

/// A rendered prompt and how many of the offered passages made it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub text: String,
    pub passages_used: usize,
    pub token_count: usize,
}

/// Renders passages and a question into the fixed prompt template:
///
/// ```text
/// Context:
/// <passage 1>
///
/// <passage 2>
///
/// Answer the question using only the context above.
/// Question: <question>
///
/// Answer:
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    /// Renders the template with every passage, in the order given.
    ///
    /// Pure: the same passages and question always give the same bytes.
    pub fn assemble<S: AsRef<str>>(passages: &[S], question: &str) -> String {
        let context = passages
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join(PASSAGE_SEPARATOR);

        format!(
            "Context:\n{}\n\n{}\nQuestion: {}\n\n{}",
            context, INSTRUCTION, question, ANSWER_MARKER
        )
    }

    /// Renders the template with as many leading passages as fit in `budget` tokens.
    ///
    /// Passages are dropped from the end, lowest-ranked first, until the
    /// encoded prompt fits.
    ///
    /// # Errors
    ///
    /// [`PromptError::QuestionTooLong`] if the prompt does not fit even with no
    /// passages at all.
    pub fn assemble_within<S: AsRef<str>>(
        passages: &[S],
        question: &str,
        budget: usize,
        tokenizer: &dyn Tokenizer,
    ) -> Result<AssembledPrompt> {
        let mut required = 0;
        for used in (0..=passages.len()).rev() {
            let text = Self::assemble(&passages[..used], question);
            let token_count = tokenizer.encode(&text)?.len();
            if token_count <= budget {
                if used < passages.len() {
                    warn!(
                        "Dropped {} of {} passages to fit the {} token prompt budget",
                        passages.len() - used,
                        passages.len(),
                        budget
                    );
                }
                debug!(passages = used, tokens = token_count, "Assembled prompt");
                return Ok(AssembledPrompt {
                    text,
                    passages_used: used,
                    token_count,
                });
            }
            required = token_count;
        }

        Err(PromptError::QuestionTooLong { required, budget })
    }
}
