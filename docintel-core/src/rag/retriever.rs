//! Question → nearest knowledge-base passages.

use super::corpus::IndexedCorpus;
use super::embedder::Embedder;
use super::types::ScoredPassage;
use super::Result;
use std::sync::Arc;
use tracing::debug;

/// Turns a question into its nearest passages.
///
/// The retriever only exists once the knowledge base and index have loaded;
/// a process whose corpus failed to load never constructs one and reports
/// retrieval as unavailable instead.
#[derive(Clone)]
pub struct Retriever {
    embedder: Embedder,
    corpus: Arc<IndexedCorpus>,
}

impl Retriever {
    pub fn new(embedder: Embedder, corpus: Arc<IndexedCorpus>) -> Self {
        Self { embedder, corpus }
    }

    /// Returns the texts of the `k` passages nearest to `question`, nearest first.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve_scored(question, k)
            .await?
            .into_iter()
            .map(|hit| hit.passage.text)
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve) but keeps passage ids and distances.
    pub async fn retrieve_scored(&self, question: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        let query = self.embedder.embed(question).await?;
        debug!("Query embedding generated, dimension: {}", query.len());

        let hits = self.corpus.search(&query, k)?;
        for (rank, hit) in hits.iter().enumerate() {
            debug!(
                rank = rank + 1,
                passage = hit.passage.id,
                distance = hit.distance,
                "Retrieved passage"
            );
        }
        Ok(hits)
    }

    pub fn corpus(&self) -> &IndexedCorpus {
        &self.corpus
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }
}
