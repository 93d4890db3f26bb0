//! Deterministic stand-ins for the model collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use docintel_core::provider::{
    ClassificationModel, EmbeddingProvider, LabelScore, LanguageModel, Result, Tokenizer,
};
use docintel_core::rag::{
    build_corpus, Embedder, GenerationSettings, IndexedCorpus, Metric, RagEngine, Retriever,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const KNOWLEDGE_BASE: [&str; 2] = [
    "Paris is the capital of France.",
    "The Eiffel Tower is in Paris.",
];

pub const EOS: &str = "<eos>";
const EOS_ID: u32 = 0;
const DIMENSION: usize = 256;

/// Bag of lowercase words hashed into a fixed number of buckets, L2-normalised.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn bucket(word: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % DIMENSION as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut vector = vec![0.0f32; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[Self::bucket(&word.to_lowercase())] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "keyword-hash"
    }
}

/// One token per character (`char + 1`); token 0 is end of sequence.
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(|c| u32::from(c) + 1).collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        Ok(tokens
            .iter()
            .filter(|&&t| t != EOS_ID)
            .filter_map(|&t| char::from_u32(t - 1))
            .collect())
    }

    fn token_id(&self, token: &str) -> Option<u32> {
        (token == EOS).then_some(EOS_ID)
    }
}

/// "Reads" the prompt and answers with the first word of the first context
/// passage in upper case, then ends the sequence.
pub struct ScriptedModel {
    pub calls: AtomicUsize,
    pub context_limit: usize,
    /// Never emit end of sequence.
    pub endless: bool,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            context_limit: 4096,
            endless: false,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn intended(&self, text: &str) -> Option<char> {
        let answer_start = text.rfind("Answer:")? + "Answer:".len();
        let generated = &text[answer_start..];

        let context = text.strip_prefix("Context:\n")?;
        let word: String = context.chars().take_while(|c| c.is_alphanumeric()).collect();
        let target = word.to_uppercase();

        target.chars().nth(generated.chars().count())
    }
}

impl LanguageModel for ScriptedModel {
    fn next_token_logits(&self, context: &[u32]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let text = CharTokenizer.decode(context)?;
        let mut logits = vec![0.0f32; 257];
        match self.intended(&text) {
            Some(c) => logits[u32::from(c) as usize + 1] = 10.0,
            None if self.endless => logits[u32::from('Z') as usize + 1] = 10.0,
            None => logits[EOS_ID as usize] = 10.0,
        }
        Ok(logits)
    }

    fn max_context_tokens(&self) -> usize {
        self.context_limit
    }
}

/// Always predicts one label.
pub struct FixedClassifier {
    pub output: LabelScore,
    pub calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(label_id: usize, score: f32) -> Self {
        Self {
            output: LabelScore { label_id, score },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClassificationModel for FixedClassifier {
    fn forward(&self, _text: &str) -> Result<LabelScore> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output)
    }
}

pub fn settings(top_k: usize) -> GenerationSettings {
    GenerationSettings {
        top_k,
        max_new_tokens: 200,
        no_repeat_ngram_size: 2,
        max_context_tokens: 1024,
        eos_token: Some(EOS.to_string()),
    }
}

pub async fn corpus(embedder: &Embedder) -> IndexedCorpus {
    let texts = KNOWLEDGE_BASE.iter().map(|t| t.to_string()).collect();
    build_corpus(embedder, texts, Metric::L2).await.unwrap()
}

/// Engine over [`KNOWLEDGE_BASE`] with the in-test providers.
pub struct Fixture {
    pub engine: RagEngine,
    pub embedder: Arc<KeywordEmbedder>,
    pub model: Arc<ScriptedModel>,
}

pub async fn fixture(model: ScriptedModel, settings: GenerationSettings) -> Fixture {
    let embedder = Arc::new(KeywordEmbedder::new());
    let wrapped = Embedder::new(embedder.clone());
    let corpus = corpus(&wrapped).await;
    embedder.calls.store(0, Ordering::SeqCst);

    let model = Arc::new(model);
    let engine = RagEngine::new(
        Retriever::new(wrapped, Arc::new(corpus)),
        Arc::new(CharTokenizer),
        model.clone(),
        settings,
    );

    Fixture {
        engine,
        embedder,
        model,
    }
}
