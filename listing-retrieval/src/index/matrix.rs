//! Dense embedding matrix
//!
//! One row per listing, row order matching the record store at build time.

use crate::error::{RetrievalError, Result};

/// Row-major `rows x dimension` matrix of embeddings
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dimension: usize,
    rows: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Create an empty matrix for vectors of the given dimension
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            rows: 0,
            data: Vec::new(),
        }
    }

    /// Build a matrix from rows of equal length
    pub fn from_rows(dimension: usize, rows: Vec<Vec<f32>>) -> Result<Self> {
        let mut matrix = Self::with_dimension(dimension);
        matrix.push_batch(&rows)?;
        Ok(matrix)
    }

    /// Append rows; the batch is validated before anything is appended
    pub fn push_batch(&mut self, rows: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = rows.iter().find(|r| r.len() != self.dimension) {
            return Err(RetrievalError::dimension_mismatch(self.dimension, bad.len()));
        }

        self.data.reserve(rows.len() * self.dimension);
        for row in rows {
            self.data.extend_from_slice(row);
        }
        self.rows += rows.len();
        Ok(())
    }

    /// Row at an index
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.dimension.max(1)).take(self.rows)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub(crate) fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn from_parts(dimension: usize, rows: usize, data: Vec<f32>) -> Result<Self> {
        let expected = rows.checked_mul(dimension).ok_or_else(|| {
            RetrievalError::index_not_found(format!(
                "{rows} x {dimension} matrix does not fit in memory"
            ))
        })?;
        if data.len() != expected {
            return Err(RetrievalError::dimension_mismatch(expected, data.len()));
        }
        Ok(Self {
            dimension,
            rows,
            data,
        })
    }
}
