use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::thread;

use crate::chunker::chunk_text;
use crate::config::State;
use crate::corpus::{ChunkMetadata, Corpus, CorpusHandle};
use crate::embed::Embedder;
use crate::fetch::PageFetcher;
use crate::index::VectorIndex;
use crate::store::CorpusStore;
use crate::vector_ops::normalize_vector;

/// Pages with less extracted text than this carry no indexable content.
const MIN_PAGE_CHARS: usize = 100;
/// Chunks at or below this length are boilerplate fragments, not answers.
const MIN_CHUNK_CHARS: usize = 50;

const FALLBACK_SOURCE: &str = "fallback";
const FALLBACK_URL: &str = "builtin://fallback";

/// Seed content installed when no source yields a single usable chunk. The
/// corpus must never be empty: missing network data degrades answer quality,
/// not availability.
const FALLBACK_CONTENT: &[&str] = &[
    "Open the admin console to manage workspaces, agents, and permissions for your organization.",
    "Use the REST API to automate ticket workflows and integrate the helpdesk with external systems.",
    "Configure SSO so your identity provider handles sign-in for every agent and administrator.",
    "Data lineage shows how records flow between connected systems and downstream reports.",
    "Connectors synchronize documentation and metadata from the tools your team already uses.",
];

/// Builds (or adopts) the documentation corpus from configured sources.
///
/// Collaborators are injected: the fetcher and embedder are external
/// capabilities, and the store decides whether any network work happens at
/// all.
pub struct IndexBuilder {
    store: CorpusStore,
    fetcher: Arc<dyn PageFetcher>,
    embedder: Arc<dyn Embedder>,
}

impl IndexBuilder {
    pub fn new(store: CorpusStore, fetcher: Arc<dyn PageFetcher>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            fetcher,
            embedder,
        }
    }

    /// Produce a ready corpus: the stored one when present and not forced,
    /// otherwise a fresh build. Idempotent given unchanged inputs.
    pub fn build(&self, state: &State, force_rebuild: bool) -> Result<Corpus> {
        if !force_rebuild {
            match self.store.load() {
                Ok(mut corpus) => {
                    if state.search_method == "ann" {
                        corpus.index.build_ann();
                    }
                    return Ok(corpus);
                }
                Err(err) => {
                    tracing::info!(error = %err, "no usable stored corpus, rebuilding");
                }
            }
        }

        let (mut documents, metadata) = self.collect_chunks(state);
        let metadata = if documents.is_empty() {
            tracing::warn!("no content extracted from any source, installing fallback content");
            let (fallback_documents, fallback_metadata) = fallback_chunks();
            documents = fallback_documents;
            fallback_metadata
        } else {
            metadata
        };

        if self.embedder.dimensions() != state.dimensions {
            anyhow::bail!(
                "embedder produces {}-dimensional vectors but the index is configured for {}",
                self.embedder.dimensions(),
                state.dimensions
            );
        }

        tracing::info!(chunks = documents.len(), "embedding corpus");
        let mut vectors = self
            .embedder
            .embed(&documents)
            .context("embedding the corpus failed")?;
        for vector in &mut vectors {
            normalize_vector(vector);
        }

        let mut index = VectorIndex::new(state.dimensions);
        index
            .add(vectors)
            .context("adding embeddings to the vector index failed")?;
        if state.search_method == "ann" {
            index.build_ann();
        }

        let corpus = Corpus::new(documents, metadata, index)
            .context("built corpus failed its consistency check")?;

        if let Err(err) = self.store.save(&corpus) {
            // The in-memory corpus is still good; the next start rebuilds.
            tracing::warn!(error = %err, "failed to persist corpus");
        }
        Ok(corpus)
    }

    /// Discover, extract, and chunk every configured source. Page-level
    /// failures are logged and skipped; they never abort the build.
    fn collect_chunks(&self, state: &State) -> (Vec<String>, Vec<ChunkMetadata>) {
        let mut documents = Vec::new();
        let mut metadata = Vec::new();

        for source in &state.sources {
            let pages = match self.fetcher.discover(source, state.max_pages) {
                Ok(pages) => pages,
                Err(err) => {
                    tracing::warn!(source = %source.base_url, error = %err, "page discovery failed");
                    continue;
                }
            };
            tracing::info!(source = %source.base_url, pages = pages.len(), "processing source");

            for page_url in pages {
                let content = match self.fetcher.extract(&page_url, source) {
                    Ok(content) => content,
                    Err(err) => {
                        tracing::warn!(url = %page_url, error = %err, "page extraction failed");
                        continue;
                    }
                };
                if content.chars().count() <= MIN_PAGE_CHARS {
                    continue;
                }

                let chunks = chunk_text(&content, state.chunk_size, state.chunk_overlap);
                for (chunk_id, chunk) in chunks.into_iter().enumerate() {
                    if chunk.chars().count() <= MIN_CHUNK_CHARS {
                        continue;
                    }
                    metadata.push(ChunkMetadata {
                        url: page_url.clone(),
                        source: source.base_url.clone(),
                        chunk_id,
                        content_hash: content_hash(&chunk),
                    });
                    documents.push(chunk);
                }
            }
        }

        (documents, metadata)
    }
}

/// Run a build on a background thread and install the outcome into `handle`.
/// Request handling may keep querying the handle while this runs; it observes
/// `Initializing` until the single swap at the end.
pub fn spawn_build(
    builder: Arc<IndexBuilder>,
    state: State,
    handle: CorpusHandle,
    force_rebuild: bool,
) -> thread::JoinHandle<()> {
    thread::spawn(move || match builder.build(&state, force_rebuild) {
        Ok(corpus) => handle.install(corpus),
        Err(err) => {
            tracing::error!(error = %err, "corpus build failed");
            handle.mark_failed(err.to_string());
        }
    })
}

pub fn content_hash(chunk: &str) -> String {
    format!("{:x}", Sha256::digest(chunk.as_bytes()))
}

fn fallback_chunks() -> (Vec<String>, Vec<ChunkMetadata>) {
    let documents: Vec<String> = FALLBACK_CONTENT.iter().map(|s| s.to_string()).collect();
    let metadata = documents
        .iter()
        .enumerate()
        .map(|(chunk_id, chunk)| ChunkMetadata {
            url: FALLBACK_URL.to_string(),
            source: FALLBACK_SOURCE.to_string(),
            chunk_id,
            content_hash: content_hash(chunk),
        })
        .collect();
    (documents, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{DocSource, FetchError, PageFetcher};
    use crate::test_util::{FailingEmbedder, HashEmbedder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned pages and counts how often discovery runs.
    struct StubFetcher {
        pages: Vec<(String, String)>,
        broken: Vec<String>,
        discover_calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new(pages: Vec<(&str, String)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(url, content)| (url.to_string(), content))
                    .collect(),
                broken: Vec::new(),
                discover_calls: AtomicUsize::new(0),
            }
        }

        fn with_broken(mut self, url: &str) -> Self {
            self.broken.push(url.to_string());
            self
        }
    }

    impl PageFetcher for StubFetcher {
        fn discover(&self, _source: &DocSource, max_pages: usize) -> Result<Vec<String>, FetchError> {
            self.discover_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .pages
                .iter()
                .map(|(url, _)| url.clone())
                .chain(self.broken.iter().cloned())
                .take(max_pages)
                .collect())
        }

        fn extract(&self, url: &str, _source: &DocSource) -> Result<String, FetchError> {
            if self.broken.iter().any(|b| b == url) {
                return Err(FetchError::Empty(url.to_string()));
            }
            self.pages
                .iter()
                .find(|(page_url, _)| page_url == url)
                .map(|(_, content)| content.clone())
                .ok_or_else(|| FetchError::Empty(url.to_string()))
        }
    }

    fn test_state(dir: &std::path::Path) -> State {
        let mut state = State::for_tests();
        state.index_dir = dir.to_string_lossy().into_owned();
        state.dimensions = 16;
        state.sources = vec![DocSource::new("https://docs.example/")];
        state
    }

    fn page_content(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence number {i} explains one part of the product in detail."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn builder_with(fetcher: StubFetcher, dir: &std::path::Path) -> IndexBuilder {
        IndexBuilder::new(
            CorpusStore::new(dir),
            Arc::new(fetcher),
            Arc::new(HashEmbedder::new(16)),
        )
    }

    #[test]
    fn builds_a_corpus_from_configured_sources() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let fetcher = StubFetcher::new(vec![
            ("https://docs.example/guide", page_content(30)),
            ("https://docs.example/api", page_content(25)),
        ]);
        let builder = builder_with(fetcher, dir.path());

        let corpus = builder.build(&state, false).unwrap();

        assert!(corpus.len() > 2);
        assert!(corpus.validate().is_ok());
        assert!(corpus
            .metadata
            .iter()
            .all(|m| m.source == "https://docs.example/"));
        assert_eq!(corpus.metadata[0].chunk_id, 0);
        assert!(!corpus.metadata[0].content_hash.is_empty());
    }

    #[test]
    fn skips_pages_below_the_minimum_length() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let fetcher = StubFetcher::new(vec![
            ("https://docs.example/stub", "Too short to index.".to_string()),
            ("https://docs.example/guide", page_content(20)),
        ]);
        let builder = builder_with(fetcher, dir.path());

        let corpus = builder.build(&state, false).unwrap();
        assert!(corpus
            .metadata
            .iter()
            .all(|m| m.url == "https://docs.example/guide"));
    }

    #[test]
    fn drops_chunks_below_the_minimum_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state(dir.path());
        state.chunk_size = 100;
        state.chunk_overlap = 10;
        // The tail window trims down to a fragment under the chunk minimum.
        let content = format!("{}.{}.{}", "x".repeat(99), "y".repeat(99), "z".repeat(29));
        let fetcher = StubFetcher::new(vec![("https://docs.example/guide", content)]);
        let builder = builder_with(fetcher, dir.path());

        let corpus = builder.build(&state, false).unwrap();
        assert!(corpus.documents.iter().all(|c| c.chars().count() > MIN_CHUNK_CHARS));
    }

    #[test]
    fn zero_discovered_pages_installs_fallback_content() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let builder = builder_with(StubFetcher::new(Vec::new()), dir.path());

        let corpus = builder.build(&state, false).unwrap();

        assert_eq!(corpus.len(), FALLBACK_CONTENT.len());
        assert_eq!(corpus.index.count(), 5);
        assert!(corpus.metadata.iter().all(|m| m.source == FALLBACK_SOURCE));
    }

    #[test]
    fn a_failing_page_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let fetcher = StubFetcher::new(vec![("https://docs.example/guide", page_content(20))])
            .with_broken("https://docs.example/broken");
        let builder = builder_with(fetcher, dir.path());

        let corpus = builder.build(&state, false).unwrap();
        assert!(corpus.len() > 0);
        assert!(corpus
            .metadata
            .iter()
            .all(|m| m.url == "https://docs.example/guide"));
    }

    #[test]
    fn adopts_the_stored_corpus_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let first = builder_with(
            StubFetcher::new(vec![("https://docs.example/guide", page_content(20))]),
            dir.path(),
        );
        let built = first.build(&state, false).unwrap();

        let warm_fetcher = StubFetcher::new(vec![(
            "https://docs.example/other",
            page_content(40),
        )]);
        let second = IndexBuilder::new(
            CorpusStore::new(dir.path()),
            Arc::new(warm_fetcher),
            Arc::new(HashEmbedder::new(16)),
        );
        let adopted = second.build(&state, false).unwrap();

        assert_eq!(adopted.len(), built.len());
        assert_eq!(adopted.documents, built.documents);
    }

    #[test]
    fn force_rebuild_bypasses_the_stored_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        builder_with(
            StubFetcher::new(vec![("https://docs.example/guide", page_content(20))]),
            dir.path(),
        )
        .build(&state, false)
        .unwrap();

        let rebuilt = builder_with(
            StubFetcher::new(vec![("https://docs.example/other", page_content(40))]),
            dir.path(),
        )
        .build(&state, true)
        .unwrap();

        assert!(rebuilt
            .metadata
            .iter()
            .all(|m| m.url == "https://docs.example/other"));
    }

    #[test]
    fn embedding_failure_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let builder = IndexBuilder::new(
            CorpusStore::new(dir.path()),
            Arc::new(StubFetcher::new(vec![(
                "https://docs.example/guide",
                page_content(20),
            )])),
            Arc::new(FailingEmbedder),
        );

        assert!(builder.build(&state, false).is_err());
    }

    #[test]
    fn background_build_installs_into_the_handle() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let builder = Arc::new(builder_with(
            StubFetcher::new(vec![("https://docs.example/guide", page_content(20))]),
            dir.path(),
        ));
        let handle = CorpusHandle::new();
        assert!(handle.snapshot().is_none());

        spawn_build(builder, state, handle.clone(), false)
            .join()
            .unwrap();

        assert!(handle.snapshot().is_some());
    }

    #[test]
    fn failed_background_build_marks_the_handle() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let builder = Arc::new(IndexBuilder::new(
            CorpusStore::new(dir.path()),
            Arc::new(StubFetcher::new(Vec::new())),
            Arc::new(FailingEmbedder),
        ));
        let handle = CorpusHandle::new();

        spawn_build(builder, state, handle.clone(), false)
            .join()
            .unwrap();

        assert!(handle.snapshot().is_none());
        assert!(matches!(
            handle.phase(),
            crate::corpus::CorpusPhase::Failed(_)
        ));
    }
}
