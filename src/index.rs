use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ann::RandomProjectionIndex;
use crate::config::Number;
use crate::vector_ops::inner_product_simd;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Append-only flat index over L2-normalized embedding vectors.
///
/// Entry ids are assigned sequentially from 0 and double as positions in the
/// corpus. Similarity is the inner product, which equals cosine similarity
/// because every stored vector (and every query) is normalized first.
#[derive(Serialize, Deserialize)]
pub struct VectorIndex {
    dimensions: usize,
    vectors: Vec<Vec<Number>>,
    #[serde(skip)]
    ann: Option<RandomProjectionIndex>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: Vec::new(),
            ann: None,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn count(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append a batch of vectors, assigning ids continuing from the current
    /// count. Every vector must match the configured dimension.
    pub fn add(&mut self, vectors: Vec<Vec<Number>>) -> Result<(), IndexError> {
        for vector in &vectors {
            if vector.len() != self.dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: vector.len(),
                });
            }
        }
        self.vectors.extend(vectors);
        // Derived candidate structures are stale after an append.
        self.ann = None;
        Ok(())
    }

    /// Build the random-projection candidate index over the current contents.
    /// Derived state: never persisted, rebuilt after every load or append.
    pub fn build_ann(&mut self) {
        let mut ann = RandomProjectionIndex::new(self.dimensions, self.vectors.len());
        for (id, vector) in self.vectors.iter().enumerate() {
            ann.add(vector, id);
        }
        self.ann = Some(ann);
    }

    /// Top-k nearest neighbors of `query` by descending inner product.
    ///
    /// When an ANN index has been built, it pre-selects candidates that are
    /// then scored exactly; otherwise every entry is scored.
    pub fn search(&self, query: &[Number], k: usize) -> Result<Vec<(usize, Number)>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<usize> = match &self.ann {
            Some(ann) => ann.candidates(query, k.saturating_mul(50)),
            None => (0..self.vectors.len()).collect(),
        };

        let mut scored: Vec<(usize, Number)> = candidates
            .into_par_iter()
            .filter_map(|id| {
                inner_product_simd(query, &self.vectors[id]).map(|score| (id, score))
            })
            .collect();

        scored.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
