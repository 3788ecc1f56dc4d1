//! Deterministic embedders shared by unit tests.

use crate::config::Number;
use crate::embed::{EmbedError, Embedder};

/// Bag-of-bytes embedding: texts sharing vocabulary land near each other.
/// Deterministic, no model involved.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<Number>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; self.dimensions];
                for byte in text.bytes() {
                    vector[byte as usize % self.dimensions] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Always returns the same fixed vector, letting a test steer the query
/// exactly where it wants it in the index.
pub struct StaticEmbedder {
    dimensions: usize,
    vector: Vec<Number>,
}

impl StaticEmbedder {
    pub fn new(vector: Vec<Number>) -> Self {
        Self {
            dimensions: vector.len(),
            vector,
        }
    }
}

impl Embedder for StaticEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<Number>>, EmbedError> {
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

/// Fails every call, simulating an unreachable embedding backend.
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dimensions(&self) -> usize {
        16
    }

    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<Number>>, EmbedError> {
        Err(EmbedError::Status {
            status: 503,
            body: "embedding backend unavailable".to_string(),
        })
    }
}
