//! Exact vector index
//!
//! Flat storage of `(id, vector)` pairs with brute-force k-nearest-neighbor
//! search. Used both for the persisted global index and for the transient
//! per-query index built over a candidate set.

mod matrix;
mod persist;

pub use matrix::EmbeddingMatrix;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{RetrievalError, Result};
use crate::record::ListingId;

/// Distance metric, fixed when an index is constructed
///
/// Every metric yields a distance where lower means closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Sum of squared component differences
    #[default]
    SquaredEuclidean,
    /// 1 - cosine similarity
    Cosine,
    /// Negated dot product
    InnerProduct,
}

impl Metric {
    /// Distance between two vectors of equal length
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::SquaredEuclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
            Metric::Cosine => 1.0 - cosine_similarity(a, b),
            Metric::InnerProduct => -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::SquaredEuclidean => "squared_euclidean",
            Metric::Cosine => "cosine",
            Metric::InnerProduct => "inner_product",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "squared_euclidean" | "l2" => Ok(Metric::SquaredEuclidean),
            "cosine" => Ok(Metric::Cosine),
            "inner_product" | "ip" => Ok(Metric::InnerProduct),
            other => Err(RetrievalError::invalid_query(format!(
                "unknown metric: {other}"
            ))),
        }
    }
}

/// A single nearest-neighbor hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Insertion position inside the searched index
    pub position: usize,
    /// Identifier stored at that position
    pub id: ListingId,
    /// Distance to the query under the index metric
    pub distance: f32,
}

/// Flat vector index with exact search
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    metric: Metric,
    dimension: usize,
    ids: Vec<ListingId>,
    /// Row-major, `ids.len() * dimension` components
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimension
    pub fn with_dimension(dimension: usize, metric: Metric) -> Self {
        Self {
            metric,
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Build an index holding all given vectors
    ///
    /// The dimension is taken from the first vector; any vector of a
    /// different length fails the whole build.
    pub fn build<I>(metric: Metric, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ListingId, Vec<f32>)>,
    {
        let mut entries = entries.into_iter().peekable();
        let dimension = match entries.peek() {
            Some((_, vector)) => vector.len(),
            None => {
                return Err(RetrievalError::invalid_record(
                    "cannot infer the dimension of an index from zero vectors",
                ))
            }
        };

        let mut index = Self::with_dimension(dimension, metric);
        index.add_batch(entries)?;
        Ok(index)
    }

    /// Append a batch of vectors
    ///
    /// The batch is validated before anything is inserted, so a failing
    /// batch leaves the index unchanged.
    pub fn add_batch<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (ListingId, Vec<f32>)>,
    {
        let entries: Vec<_> = entries.into_iter().collect();
        if let Some((_, bad)) = entries.iter().find(|(_, v)| v.len() != self.dimension) {
            return Err(RetrievalError::dimension_mismatch(self.dimension, bad.len()));
        }

        self.ids.reserve(entries.len());
        self.data.reserve(entries.len() * self.dimension);
        for (id, vector) in entries {
            self.ids.push(id);
            self.data.extend_from_slice(&vector);
        }
        Ok(())
    }

    /// Append borrowed rows, used when scoping an index to a candidate set
    pub(crate) fn push_row(&mut self, id: ListingId, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RetrievalError::dimension_mismatch(self.dimension, vector.len()));
        }
        self.ids.push(id);
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// The k nearest vectors to `query`, ascending by distance
    ///
    /// Returns every stored vector when fewer than k are held. Equal
    /// distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(RetrievalError::dimension_mismatch(self.dimension, query.len()));
        }
        if k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        // Max-heap on (distance, position): the root is the worst kept hit.
        let mut heap = BinaryHeap::with_capacity(k + 1);
        for position in 0..self.ids.len() {
            let distance = self.metric.distance(query, self.row(position));
            heap.push(ScoredEntry { distance, position });
            if heap.len() > k {
                heap.pop();
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|entry| SearchHit {
                position: entry.position,
                id: self.ids[entry.position].clone(),
                distance: entry.distance,
            })
            .collect())
    }

    /// Vector stored at a position
    pub fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.data[start..start + self.dimension]
    }

    pub fn ids(&self) -> &[ListingId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }
}

#[derive(Debug, Clone, Copy)]
struct ScoredEntry {
    distance: f32,
    position: usize,
}

impl PartialEq for ScoredEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredEntry {}

impl PartialOrd for ScoredEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.position.cmp(&other.position))
    }
}

/// Calculate cosine similarity between two vectors
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
