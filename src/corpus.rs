use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::config::Number;
use crate::index::{IndexError, VectorIndex};

/// Per-chunk provenance stored alongside the chunk text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Page the chunk was extracted from.
    pub url: String,
    /// Source group (the configured base URL, or "fallback").
    pub source: String,
    /// Ordinal position of the chunk within its page.
    pub chunk_id: usize,
    /// SHA-256 hex digest of the chunk text. Recorded for operators and
    /// future migrations; duplicates are not rejected at indexing time.
    pub content_hash: String,
}

/// One retrieval hit: chunk text, its provenance, and the cosine score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: Number,
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error(
        "corpus is inconsistent: {documents} documents, {metadata} metadata entries, {vectors} vectors"
    )]
    LengthMismatch {
        documents: usize,
        metadata: usize,
        vectors: usize,
    },
}

/// The versioned unit of retrieval state: chunk texts, their metadata, and
/// the vector index whose entry `i` embeds document `i`. A corpus is either
/// fully built or absent; rebuilds replace the whole value.
#[derive(Serialize, Deserialize)]
pub struct Corpus {
    pub documents: Vec<String>,
    pub metadata: Vec<ChunkMetadata>,
    pub index: VectorIndex,
}

impl Corpus {
    pub fn new(
        documents: Vec<String>,
        metadata: Vec<ChunkMetadata>,
        index: VectorIndex,
    ) -> Result<Self, CorpusError> {
        let corpus = Self {
            documents,
            metadata,
            index,
        };
        corpus.validate()?;
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn validate(&self) -> Result<(), CorpusError> {
        if self.documents.len() != self.metadata.len()
            || self.documents.len() != self.index.count()
        {
            return Err(CorpusError::LengthMismatch {
                documents: self.documents.len(),
                metadata: self.metadata.len(),
                vectors: self.index.count(),
            });
        }
        Ok(())
    }

    /// Top-k search mapped back to chunk text and metadata. Ids past the end
    /// of the corpus are discarded defensively; they cannot occur while the
    /// index and the document sequence stay in sync.
    pub fn search(&self, query: &[Number], k: usize) -> Result<Vec<SearchResult>, IndexError> {
        let hits = self.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .filter(|&(id, _)| id < self.documents.len())
            .map(|(id, score)| SearchResult {
                content: self.documents[id].clone(),
                metadata: self.metadata[id].clone(),
                score,
            })
            .collect())
    }
}

/// Lifecycle phase of the shared corpus.
#[derive(Clone)]
pub enum CorpusPhase {
    /// The background build has not finished yet; a valid, non-error state.
    Initializing,
    Ready(Arc<Corpus>),
    /// The build failed outright (e.g. the embedding backend was down).
    Failed(String),
}

/// Shared read-mostly handle to the corpus.
///
/// Rebuilds install a whole new `Arc<Corpus>` in a single swap under the
/// write lock; readers clone the Arc out and keep a consistent snapshot for
/// as long as they need it.
#[derive(Clone)]
pub struct CorpusHandle {
    inner: Arc<RwLock<CorpusPhase>>,
}

impl CorpusHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(CorpusPhase::Initializing)),
        }
    }

    pub fn phase(&self) -> CorpusPhase {
        self.inner.read().expect("corpus lock poisoned").clone()
    }

    /// The current corpus, if one has been installed.
    pub fn snapshot(&self) -> Option<Arc<Corpus>> {
        match self.phase() {
            CorpusPhase::Ready(corpus) => Some(corpus),
            _ => None,
        }
    }

    pub fn install(&self, corpus: Corpus) {
        let mut guard = self.inner.write().expect("corpus lock poisoned");
        *guard = CorpusPhase::Ready(Arc::new(corpus));
    }

    pub fn mark_failed(&self, reason: String) {
        let mut guard = self.inner.write().expect("corpus lock poisoned");
        // A usable corpus is never displaced by a later failure.
        if !matches!(*guard, CorpusPhase::Ready(_)) {
            *guard = CorpusPhase::Failed(reason);
        }
    }
}

impl Default for CorpusHandle {
    fn default() -> Self {
        Self::new()
    }
}
