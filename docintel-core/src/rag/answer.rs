//! Recovering the answer span from raw generated text.

use tracing::debug;

/// Marker the prompt ends with and the generator is expected to continue.
pub const ANSWER_MARKER: &str = "Answer:";

/// Extracts the answer from the generator's raw output.
///
/// Two paths, tried in order:
///
/// 1. If `raw` contains [`ANSWER_MARKER`], everything after its **last**
///    occurrence is returned, trimmed.
/// 2. Otherwise the prompt text, minus its trailing marker, is removed from
///    `raw` and the remainder is returned, trimmed.
///
/// The second path needs the echoed prompt to match `prompt` byte for byte.
/// A tokenizer that normalises whitespace on the round trip defeats it and the
/// echoed context is returned along with the answer.
///
/// Never fails; the result may be empty.
///
/// ```
/// use docintel_core::rag::extract_answer;
///
/// assert_eq!(extract_answer("Question: 6 * 7?\nAnswer: 42", "ignored"), "42");
/// ```
pub fn extract_answer(raw: &str, prompt: &str) -> String {
    if let Some(pos) = raw.rfind(ANSWER_MARKER) {
        return raw[pos + ANSWER_MARKER.len()..].trim().to_string();
    }

    debug!("Answer marker missing from generated text, stripping prompt instead");
    let stem = prompt
        .trim_end()
        .strip_suffix(ANSWER_MARKER)
        .unwrap_or(prompt);
    if stem.is_empty() {
        return raw.trim().to_string();
    }
    raw.replace(stem, "").trim().to_string()
}
