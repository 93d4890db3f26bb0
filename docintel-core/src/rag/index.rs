//! Exact nearest-neighbor index over passage embeddings.
//!
//! The index stores every vector in one contiguous row-major buffer and
//! answers queries by brute force: compute the distance to every row, select
//! the `k` smallest, sort them. For knowledge bases of a few thousand passages
//! this is fast enough and trivially exact.
//!
//! The index owns no text, only vectors addressed by their position. Pairing
//! positions with passage text is the job of
//! [`IndexedCorpus`](super::IndexedCorpus).

use super::types::{Neighbor, RetrievalResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Cannot build an index from zero vectors")]
    EmptyCorpus,

    #[error("Vectors must have at least one dimension")]
    ZeroDimension,

    #[error("Vector {position} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        found: usize,
    },

    #[error("Query has dimension {found}, index expects {expected}")]
    QueryDimensionMismatch { expected: usize, found: usize },

    #[error("k must be at least 1")]
    InvalidK,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Distance metric, fixed when the index is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// Inner product, reported negated so that smaller is closer.
    InnerProduct,
}

impl Metric {
    fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
            Metric::InnerProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

/// Read-only k-nearest-neighbor index.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    metric: Metric,
    dimension: usize,
    data: Vec<f32>,
}

/// On-disk form of a [`SimilarityIndex`].
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    metric: Metric,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl SimilarityIndex {
    /// Builds an index from vectors in passage order.
    ///
    /// # Errors
    ///
    /// - [`IndexError::EmptyCorpus`] if `vectors` is empty
    /// - [`IndexError::DimensionMismatch`] if any vector's length differs from the first
    pub fn build(vectors: &[Vec<f32>], metric: Metric) -> Result<Self> {
        let first = vectors.first().ok_or(IndexError::EmptyCorpus)?;
        let dimension = first.len();
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    found: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        debug!(vectors = vectors.len(), dimension, ?metric, "Built similarity index");
        Ok(Self {
            metric,
            dimension,
            data,
        })
    }

    /// Returns the `k` nearest vectors to `query`, nearest first.
    ///
    /// Fewer than `k` hits come back when the index holds fewer than `k`
    /// vectors. Equal distances are ordered by ascending position, so the
    /// result is fully determined by the index and the query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        if query.len() != self.dimension {
            return Err(IndexError::QueryDimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }

        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(passage_id, vector)| Neighbor {
                passage_id,
                distance: self.metric.distance(query, vector),
            })
            .collect();

        let k = k.min(hits.len());
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, nearest_first);
            hits.truncate(k);
        }
        hits.sort_by(nearest_first);

        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// Always false: an index cannot be built empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// The stored vector at `position`, if any.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dimension).nth(position)
    }

    /// Writes the index as a JSON snapshot.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = IndexSnapshot {
            metric: self.metric,
            dimension: self.dimension,
            vectors: self
                .data
                .chunks_exact(self.dimension)
                .map(|v| v.to_vec())
                .collect(),
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &snapshot)?;
        Ok(())
    }

    /// Loads a snapshot written by [`save`](Self::save), re-validating every vector.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: IndexSnapshot = serde_json::from_reader(reader)?;

        let index = Self::build(&snapshot.vectors, snapshot.metric)?;
        if index.dimension != snapshot.dimension {
            return Err(IndexError::CorruptSnapshot(format!(
                "header declares dimension {}, vectors have {}",
                snapshot.dimension, index.dimension
            )));
        }
        Ok(index)
    }
}

fn nearest_first(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.passage_id.cmp(&b.passage_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 2.0],
            vec![3.0, 3.0],
            vec![-1.0, 0.0],
        ]
    }

    #[test]
    fn test_build_rejects_empty() {
        assert!(matches!(
            SimilarityIndex::build(&[], Metric::L2),
            Err(IndexError::EmptyCorpus)
        ));
    }

    #[test]
    fn test_build_rejects_ragged_vectors() {
        let vectors = vec![vec![1.0, 2.0], vec![1.0, 2.0], vec![1.0]];
        match SimilarityIndex::build(&vectors, Metric::L2) {
            Err(IndexError::DimensionMismatch {
                position,
                expected,
                found,
            }) => {
                assert_eq!((position, expected, found), (2, 2, 1));
            }
            other => panic!("expected DimensionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_build_rejects_zero_dimension() {
        assert!(matches!(
            SimilarityIndex::build(&[vec![]], Metric::L2),
            Err(IndexError::ZeroDimension)
        ));
    }

    #[test]
    fn test_search_nearest_first() {
        let index = SimilarityIndex::build(&grid(), Metric::L2).unwrap();
        let hits = index.search(&[0.9, 0.1], 3).unwrap();

        let ids: Vec<usize> = hits.iter().map(|h| h.passage_id).collect();
        assert_eq!(ids, vec![1, 0, 4]);
        assert!((hits[0].distance - 0.02).abs() < 1e-6);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_search_returns_min_k_n() {
        let index = SimilarityIndex::build(&grid(), Metric::L2).unwrap();
        for k in 1..=8 {
            let hits = index.search(&[0.5, 0.5], k).unwrap();
            assert_eq!(hits.len(), k.min(5));
            assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }

    #[test]
    fn test_k_larger_than_corpus_returns_everything() {
        let index = SimilarityIndex::build(&grid(), Metric::L2).unwrap();
        let hits = index.search(&[0.0, 0.0], 100).unwrap();
        let mut ids: Vec<usize> = hits.iter().map(|h| h.passage_id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_ties_broken_by_position() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0], vec![0.0, -1.0]];
        let index = SimilarityIndex::build(&vectors, Metric::L2).unwrap();
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.passage_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_search_is_deterministic() {
        let index = SimilarityIndex::build(&grid(), Metric::L2).unwrap();
        let first = index.search(&[0.3, 1.7], 4).unwrap();
        for _ in 0..10 {
            assert_eq!(index.search(&[0.3, 1.7], 4).unwrap(), first);
        }
    }

    #[test]
    fn test_invalid_k() {
        let index = SimilarityIndex::build(&grid(), Metric::L2).unwrap();
        assert!(matches!(index.search(&[0.0, 0.0], 0), Err(IndexError::InvalidK)));
    }

    #[test]
    fn test_query_dimension_checked() {
        let index = SimilarityIndex::build(&grid(), Metric::L2).unwrap();
        assert!(matches!(
            index.search(&[0.0, 0.0, 0.0], 1),
            Err(IndexError::QueryDimensionMismatch {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn test_inner_product_prefers_largest_dot() {
        let index = SimilarityIndex::build(&grid(), Metric::InnerProduct).unwrap();
        let hits = index.search(&[1.0, 1.0], 2).unwrap();
        assert_eq!(hits[0].passage_id, 3);
        assert_eq!(hits[0].distance, -6.0);
        assert_eq!(hits[1].passage_id, 2);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        let index = SimilarityIndex::build(&grid(), Metric::InnerProduct).unwrap();
        index.save(&path).unwrap();
        let loaded = SimilarityIndex::load(&path).unwrap();

        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded.dimension(), 2);
        assert_eq!(loaded.metric(), Metric::InnerProduct);
        assert_eq!(loaded.vector(3), Some(&[3.0, 3.0][..]));
        assert_eq!(
            loaded.search(&[1.0, 0.5], 5).unwrap(),
            index.search(&[1.0, 0.5], 5).unwrap()
        );
    }

    #[test]
    fn test_snapshot_header_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(
            &path,
            r#"{"metric":"l2","dimension":3,"vectors":[[1.0,2.0]]}"#,
        )
        .unwrap();
        assert!(matches!(
            SimilarityIndex::load(&path),
            Err(IndexError::CorruptSnapshot(_))
        ));
    }
}
