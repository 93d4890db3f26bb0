//! Knowledge base passages paired with their similarity index.

use super::index::{self, IndexError, Metric, SimilarityIndex};
use super::types::{Passage, ScoredPassage};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Failed to read knowledge base: {0}")]
    Io(#[from] std::io::Error),

    #[error("Knowledge base is not a JSON array of strings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Knowledge base contains no passages")]
    Empty,

    #[error("Knowledge base has {passages} passages but the index has {vectors} vectors")]
    LengthMismatch { passages: usize, vectors: usize },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

pub type Result<T> = std::result::Result<T, CorpusError>;

/// Reads a knowledge base file: a JSON array of passage strings.
pub fn load_knowledge_base(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    let texts: Vec<String> = serde_json::from_str(&contents)?;
    if texts.is_empty() {
        return Err(CorpusError::Empty);
    }
    Ok(texts)
}

/// The knowledge base and its similarity index as one value.
///
/// Passage `i` is always the text of index vector `i`; construction fails
/// unless both sides have the same length, so a hit can never point past the
/// passage list or at the wrong passage.
#[derive(Debug, Clone)]
pub struct IndexedCorpus {
    passages: Vec<Passage>,
    index: SimilarityIndex,
}

impl IndexedCorpus {
    pub fn new(texts: Vec<String>, index: SimilarityIndex) -> Result<Self> {
        if texts.len() != index.len() {
            return Err(CorpusError::LengthMismatch {
                passages: texts.len(),
                vectors: index.len(),
            });
        }

        let passages = texts
            .into_iter()
            .enumerate()
            .map(|(id, text)| Passage::new(id, text))
            .collect();

        Ok(Self { passages, index })
    }

    /// Builds the index from freshly computed embeddings, one per text.
    pub fn from_embeddings(
        texts: Vec<String>,
        embeddings: &[Vec<f32>],
        metric: Metric,
    ) -> Result<Self> {
        if texts.is_empty() {
            return Err(CorpusError::Empty);
        }
        let index = SimilarityIndex::build(embeddings, metric)?;
        Self::new(texts, index)
    }

    /// Loads a knowledge base file and the index snapshot built from it.
    pub fn load(
        knowledge_base_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let texts = load_knowledge_base(&knowledge_base_path)?;
        let index = SimilarityIndex::load(&index_path)?;
        let corpus = Self::new(texts, index)?;

        info!(
            passages = corpus.len(),
            dimension = corpus.index.dimension(),
            "Loaded knowledge base from {}",
            knowledge_base_path.as_ref().display()
        );
        Ok(corpus)
    }

    /// Finds the `k` passages nearest to `query`, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> index::Result<Vec<ScoredPassage>> {
        let hits = self.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .map(|hit| ScoredPassage {
                // In range: hit ids come from the index, whose length equals ours.
                passage: self.passages[hit.passage_id].clone(),
                distance: hit.distance,
            })
            .collect())
    }

    pub fn passage(&self, id: usize) -> Option<&Passage> {
        self.passages.get(id)
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}
