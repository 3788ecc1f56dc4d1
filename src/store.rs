use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::corpus::{ChunkMetadata, Corpus, CorpusError};
use crate::index::VectorIndex;

const INDEX_FILE: &str = "index.bin";
const DOCUMENTS_FILE: &str = "documents.bin";
const METADATA_FILE: &str = "metadata.bin";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored corpus: {0} is missing")]
    NotFound(String),
    #[error("stored corpus artifact {artifact} is corrupt: {source}")]
    Corrupt {
        artifact: String,
        source: bincode::Error,
    },
    #[error("stored corpus is inconsistent: {0}")]
    Inconsistent(#[from] CorpusError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Persists the corpus as three co-located artifacts under one directory:
/// the vector index, the chunk texts, and the chunk metadata. A load is a
/// cache hit only when all three exist and decode; anything less is a miss
/// and the caller rebuilds.
pub struct CorpusStore {
    dir: PathBuf,
}

impl CorpusStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Corpus, StoreError> {
        let index: VectorIndex = self.read_artifact(INDEX_FILE)?;
        let documents: Vec<String> = self.read_artifact(DOCUMENTS_FILE)?;
        let metadata: Vec<ChunkMetadata> = self.read_artifact(METADATA_FILE)?;

        let corpus = Corpus::new(documents, metadata, index)?;
        tracing::info!(chunks = corpus.len(), dir = %self.dir.display(), "loaded stored corpus");
        Ok(corpus)
    }

    /// Overwrite all three artifacts. Each one is written to a temp file and
    /// renamed into place; the renames themselves are not a single atomic
    /// unit, which `load`'s all-or-nothing rule compensates for.
    pub fn save(&self, corpus: &Corpus) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        let staged = [
            (INDEX_FILE, self.write_temp(INDEX_FILE, &corpus.index)?),
            (
                DOCUMENTS_FILE,
                self.write_temp(DOCUMENTS_FILE, &corpus.documents)?,
            ),
            (
                METADATA_FILE,
                self.write_temp(METADATA_FILE, &corpus.metadata)?,
            ),
        ];
        for (name, temp_path) in staged {
            fs::rename(temp_path, self.dir.join(name))?;
        }

        tracing::info!(chunks = corpus.len(), dir = %self.dir.display(), "saved corpus");
        Ok(())
    }

    fn read_artifact<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let file = File::open(&path)?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|source| StoreError::Corrupt {
            artifact: name.to_string(),
            source,
        })
    }

    fn write_temp<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, StoreError> {
        let temp_path = self.dir.join(format!("{name}.tmp"));
        let bytes = bincode::serialize(value).map_err(|source| StoreError::Corrupt {
            artifact: name.to_string(),
            source,
        })?;
        fs::write(&temp_path, bytes)?;
        Ok(temp_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::ChunkMetadata;
    use crate::vector_ops::normalize_vector;
    use std::io::Write;

    fn sample_corpus(chunks: usize) -> Corpus {
        let mut index = VectorIndex::new(8);
        let mut vectors = Vec::new();
        let mut documents = Vec::new();
        let mut metadata = Vec::new();
        for i in 0..chunks {
            let mut v = vec![0.1; 8];
            v[i % 8] = 1.0;
            normalize_vector(&mut v);
            vectors.push(v);
            documents.push(format!("chunk {i}"));
            metadata.push(ChunkMetadata {
                url: format!("https://docs.example/page/{i}"),
                source: "https://docs.example/".to_string(),
                chunk_id: i,
                content_hash: format!("{i:064x}"),
            });
        }
        index.add(vectors).unwrap();
        Corpus::new(documents, metadata, index).unwrap()
    }

    #[test]
    fn round_trips_a_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(dir.path());

        store.save(&sample_corpus(5)).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded.documents[2], "chunk 2");
        assert_eq!(loaded.metadata[2].chunk_id, 2);
        assert_eq!(loaded.index.count(), 5);
    }

    #[test]
    fn empty_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(dir.path());
        assert!(matches!(store.load(), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn missing_artifact_is_a_cache_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(dir.path());
        store.save(&sample_corpus(3)).unwrap();

        fs::remove_file(dir.path().join(METADATA_FILE)).unwrap();
        assert!(matches!(store.load(), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn corrupt_artifact_is_a_cache_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(dir.path());
        store.save(&sample_corpus(3)).unwrap();

        let mut file = File::create(dir.path().join(DOCUMENTS_FILE)).unwrap();
        file.write_all(b"not bincode").unwrap();

        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn mismatched_artifacts_are_rejected() {
        // Simulates a crash between renames: documents from one corpus
        // generation, index and metadata from another.
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(dir.path());
        store.save(&sample_corpus(3)).unwrap();

        let other = tempfile::tempdir().unwrap();
        let other_store = CorpusStore::new(other.path());
        other_store.save(&sample_corpus(5)).unwrap();
        fs::copy(
            other.path().join(DOCUMENTS_FILE),
            dir.path().join(DOCUMENTS_FILE),
        )
        .unwrap();

        assert!(matches!(store.load(), Err(StoreError::Inconsistent(_))));
    }

    #[test]
    fn save_overwrites_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(dir.path());
        store.save(&sample_corpus(3)).unwrap();
        store.save(&sample_corpus(7)).unwrap();

        assert_eq!(store.load().unwrap().len(), 7);
    }
}
