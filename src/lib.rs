//! Core library entry points for the deskrag helpdesk knowledge base.

pub mod ann;
pub mod answer;
pub mod builder;
pub mod chunker;
pub mod classify;
pub mod config;
pub mod corpus;
pub mod embed;
pub mod fetch;
pub mod index;
pub mod retriever;
pub mod store;
pub mod tickets;
pub mod vector_ops;

#[cfg(test)]
pub(crate) mod test_util;

pub use answer::{AnswerEngine, HttpGenerator, TextGenerator, TicketAnswer};
pub use builder::{spawn_build, IndexBuilder};
pub use chunker::chunk_text;
pub use classify::{classify, Classification, RAG_TOPICS};
pub use config::{Number, State};
pub use corpus::{ChunkMetadata, Corpus, CorpusHandle, CorpusPhase, SearchResult};
pub use embed::{Embedder, HttpEmbedder};
pub use fetch::{DocSource, HttpFetcher, PageFetcher};
pub use index::VectorIndex;
pub use retriever::{RetrievalContext, Retriever, NO_INFORMATION_MESSAGE};
pub use store::CorpusStore;
pub use tickets::{TicketLog, TicketRecord};
