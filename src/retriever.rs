use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{Number, State};
use crate::corpus::{Corpus, CorpusHandle, SearchResult};
use crate::embed::Embedder;
use crate::vector_ops::normalize_vector;

/// Sentinel returned whenever retrieval has nothing to offer. Callers render
/// it verbatim; it is not an error.
pub const NO_INFORMATION_MESSAGE: &str = "No relevant information found in the knowledge base.";

const CONTEXT_DELIMITER: &str = "\n\n---\n\n";
const TRUNCATION_SUFFIX: &str = "...";
/// Truncated chunks below this remaining budget add noise, not context.
const MIN_TRUNCATION_CHARS: usize = 100;
/// When nothing clears the score threshold, fall back to this many raw hits.
const FALLBACK_RESULTS: usize = 3;

/// Assembled context for the text generator plus the URLs that made it in.
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    pub text: String,
    pub sources: Vec<String>,
}

impl RetrievalContext {
    fn no_information() -> Self {
        Self {
            text: NO_INFORMATION_MESSAGE.to_string(),
            sources: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Query-side orchestration: embed the query, search the corpus snapshot,
/// filter by score, and assemble a budget-capped context.
pub struct Retriever {
    handle: CorpusHandle,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    score_threshold: Number,
    max_context_length: usize,
}

impl Retriever {
    pub fn new(handle: CorpusHandle, embedder: Arc<dyn Embedder>, state: &State) -> Self {
        Self {
            handle,
            embedder,
            top_k: state.top_k,
            score_threshold: state.score_threshold,
            max_context_length: state.max_context_length,
        }
    }

    /// Raw scored hits for `query`, for callers that want the result list
    /// rather than an assembled context.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let corpus = self
            .handle
            .snapshot()
            .context("the corpus is not ready yet")?;
        self.search_corpus(&corpus, query, top_k)
    }

    /// Assemble retrieval context for `query`. Infallible: anything that goes
    /// wrong degrades to the no-information sentinel, never to an error.
    pub fn retrieve(&self, query: &str) -> RetrievalContext {
        let Some(corpus) = self.handle.snapshot() else {
            return RetrievalContext::no_information();
        };
        if corpus.is_empty() {
            return RetrievalContext::no_information();
        }

        let results = match self.search_corpus(&corpus, query, self.top_k) {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(error = %err, "retrieval search failed");
                return RetrievalContext::no_information();
            }
        };
        if results.is_empty() {
            return RetrievalContext::no_information();
        }

        let relevant: Vec<&SearchResult> = {
            let above_threshold: Vec<&SearchResult> = results
                .iter()
                .filter(|r| r.score > self.score_threshold)
                .collect();
            if above_threshold.is_empty() {
                // Nothing cleared the bar; the best few hits still beat an
                // empty answer.
                results.iter().take(FALLBACK_RESULTS).collect()
            } else {
                above_threshold
            }
        };

        self.assemble(&relevant)
    }

    fn search_corpus(
        &self,
        corpus: &Corpus,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let mut embedded = self
            .embedder
            .embed(std::slice::from_ref(&query.to_string()))
            .context("embedding the query failed")?;
        let mut query_vector = embedded
            .pop()
            .context("embedding backend returned no vector for the query")?;
        normalize_vector(&mut query_vector);

        let results = corpus.search(&query_vector, top_k)?;
        Ok(results)
    }

    /// Greedy assembly in descending-score order, counting content characters
    /// against the budget. Headers and delimiters are not counted; the
    /// truncation suffix is, so the total may exceed the budget by at most
    /// the suffix length.
    fn assemble(&self, results: &[&SearchResult]) -> RetrievalContext {
        let mut parts = Vec::new();
        let mut sources: Vec<String> = Vec::new();
        let mut current_length = 0usize;

        for result in results {
            let mut content = result.content.clone();
            let content_length = content.chars().count();

            if current_length + content_length > self.max_context_length {
                let remaining = self.max_context_length.saturating_sub(current_length);
                if remaining > MIN_TRUNCATION_CHARS {
                    content = content.chars().take(remaining).collect::<String>() + TRUNCATION_SUFFIX;
                } else {
                    break;
                }
            }

            current_length += content.chars().count();
            parts.push(format!("From {}:\n{}", result.metadata.url, content));
            if !sources.contains(&result.metadata.url) {
                sources.push(result.metadata.url.clone());
            }
        }

        if parts.is_empty() {
            return RetrievalContext::no_information();
        }
        RetrievalContext {
            text: parts.join(CONTEXT_DELIMITER),
            sources,
        }
    }
}
