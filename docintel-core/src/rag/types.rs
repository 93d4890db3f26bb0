use serde::{Deserialize, Serialize};

/// A passage of the knowledge base.
///
/// Passages are identified by their position in the knowledge-base file; the
/// same position addresses the passage's vector in the similarity index.
///
/// # Example
///
/// ```
/// # use docintel_core::rag::Passage;
/// let passage = Passage::new(0, "Paris is the capital of France.");
/// assert_eq!(passage.id, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub id: usize,
    pub text: String,
}

impl Passage {
    pub fn new(id: usize, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// One hit of a nearest-neighbor query.
///
/// `distance` is metric-dependent: squared Euclidean distance for
/// [`Metric::L2`](super::Metric::L2), negated inner product for
/// [`Metric::InnerProduct`](super::Metric::InnerProduct). Smaller is always
/// closer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub passage_id: usize,
    pub distance: f32,
}

/// Hits of a single query, nearest first, at most `k` long.
pub type RetrievalResult = Vec<Neighbor>;

/// A retrieved passage together with its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub distance: f32,
}
