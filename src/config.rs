use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;

use crate::fetch::DocSource;

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

/// Embedding dimension of all-MiniLM-L6-v2, the model the corpus is built with.
pub const DEFAULT_DIMENSIONS: usize = 384;

#[derive(Deserialize)]
pub struct DeskragConfig {
    pub index_dir: Option<String>,
    pub dimensions: Option<usize>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub top_k: Option<usize>,
    pub score_threshold: Option<f32>,
    pub max_context_length: Option<usize>,
    pub max_pages: Option<usize>,
    pub fetch_timeout_secs: Option<u64>,
    pub search_method: Option<String>,
    pub embed_url: Option<String>,
    pub embed_model: Option<String>,
    pub embed_api_key: Option<String>,
    pub generate_url: Option<String>,
    pub generate_model: Option<String>,
    pub generate_api_key: Option<String>,
    pub sources: Option<Vec<DocSource>>,
}

impl DeskragConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(DeskragConfig {
            index_dir: config.get("index_dir").ok(),
            dimensions: config.get("dimensions").ok(),
            chunk_size: config.get("chunk_size").ok(),
            chunk_overlap: config.get("chunk_overlap").ok(),
            top_k: config.get("top_k").ok(),
            score_threshold: config.get("score_threshold").ok(),
            max_context_length: config.get("max_context_length").ok(),
            max_pages: config.get("max_pages").ok(),
            fetch_timeout_secs: config.get("fetch_timeout_secs").ok(),
            search_method: config.get("search_method").ok(),
            embed_url: config.get("embed_url").ok(),
            embed_model: config.get("embed_model").ok(),
            embed_api_key: config.get("embed_api_key").ok(),
            generate_url: config.get("generate_url").ok(),
            generate_model: config.get("generate_model").ok(),
            generate_api_key: config.get("generate_api_key").ok(),
            sources: config.get("sources").ok(),
        })
    }
}

pub struct State {
    pub index_dir: String,
    pub dimensions: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub score_threshold: f32,
    pub max_context_length: usize,
    pub max_pages: usize,
    pub fetch_timeout_secs: u64,
    pub search_method: String,
    pub embed_url: Option<String>,
    pub embed_model: String,
    pub embed_api_key: Option<String>,
    pub generate_url: Option<String>,
    pub generate_model: String,
    pub generate_api_key: Option<String>,
    pub sources: Vec<DocSource>,
}

impl State {
    pub fn new() -> Result<Self> {
        let mut config = Config::default();
        #[allow(deprecated)]
        {
            config.merge(ConfigFile::with_name("deskrag_config").required(false))?;
            config.merge(Environment::with_prefix("DESKRAG"))?;
        }

        let deskrag_config = DeskragConfig::try_from(&config)?;

        let index_dir = deskrag_config
            .index_dir
            .or_else(|| env::var("DESKRAG_INDEX_DIR").ok())
            .unwrap_or_else(|| "knowledge_base".to_string());

        let dimensions = deskrag_config.dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        let chunk_size = deskrag_config.chunk_size.unwrap_or(500);
        let chunk_overlap = deskrag_config.chunk_overlap.unwrap_or(50);
        let top_k = deskrag_config.top_k.unwrap_or(8);
        let score_threshold = deskrag_config.score_threshold.unwrap_or(0.3);
        let max_context_length = deskrag_config.max_context_length.unwrap_or(2000);
        let max_pages = deskrag_config.max_pages.unwrap_or(15);
        let fetch_timeout_secs = deskrag_config.fetch_timeout_secs.unwrap_or(10);

        let search_method = deskrag_config
            .search_method
            .unwrap_or_else(|| "exact".to_string());

        let embed_url = deskrag_config
            .embed_url
            .or_else(|| env::var("DESKRAG_EMBED_URL").ok());
        let embed_model = deskrag_config
            .embed_model
            .unwrap_or_else(|| "all-MiniLM-L6-v2".to_string());
        let embed_api_key = deskrag_config
            .embed_api_key
            .or_else(|| env::var("DESKRAG_EMBED_API_KEY").ok());

        let generate_url = deskrag_config
            .generate_url
            .or_else(|| env::var("DESKRAG_GENERATE_URL").ok());
        let generate_model = deskrag_config
            .generate_model
            .unwrap_or_else(|| "gemini-2.5-flash".to_string());
        let generate_api_key = deskrag_config
            .generate_api_key
            .or_else(|| env::var("DESKRAG_GENERATE_API_KEY").ok());

        let sources = deskrag_config.sources.unwrap_or_default();

        let state = Self {
            index_dir,
            dimensions,
            chunk_size,
            chunk_overlap,
            top_k,
            score_threshold,
            max_context_length,
            max_pages,
            fetch_timeout_secs,
            search_method,
            embed_url,
            embed_model,
            embed_api_key,
            generate_url,
            generate_model,
            generate_api_key,
            sources,
        };
        state.validate()?;
        Ok(state)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimensions % 8 != 0 {
            anyhow::bail!("dimensions must be a multiple of 8.");
        }
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero.");
        }
        if self.chunk_overlap >= self.chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({}).",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if !(-1.0..=1.0).contains(&self.score_threshold) {
            anyhow::bail!("score_threshold must lie in [-1, 1].");
        }
        match self.search_method.as_str() {
            "exact" | "ann" => {}
            other => anyhow::bail!("unknown search_method: {}", other),
        }
        Ok(())
    }

    pub fn embed_url(&self) -> Result<&str> {
        self.embed_url
            .as_deref()
            .context("embed_url not set in config or environment (DESKRAG_EMBED_URL)")
    }

    pub fn print_config(&self) {
        println!("index_dir={}", self.index_dir);
        println!("dimensions={}", self.dimensions);
        println!("chunk_size={}", self.chunk_size);
        println!("chunk_overlap={}", self.chunk_overlap);
        println!("top_k={}", self.top_k);
        println!("score_threshold={}", self.score_threshold);
        println!("max_context_length={}", self.max_context_length);
        println!("max_pages={}", self.max_pages);
        println!("fetch_timeout_secs={}", self.fetch_timeout_secs);
        println!("search_method={}", self.search_method);
        println!("embed_url={}", self.embed_url.as_deref().unwrap_or("<unset>"));
        println!("embed_model={}", self.embed_model);
        println!(
            "generate_url={}",
            self.generate_url.as_deref().unwrap_or("<unset>")
        );
        println!("generate_model={}", self.generate_model);
        println!("sources={}", self.sources.len());
    }
}

#[cfg(test)]
impl State {
    pub(crate) fn for_tests() -> Self {
        State {
            index_dir: "knowledge_base".to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 8,
            score_threshold: 0.3,
            max_context_length: 2000,
            max_pages: 15,
            fetch_timeout_secs: 10,
            search_method: "exact".to_string(),
            embed_url: None,
            embed_model: "all-MiniLM-L6-v2".to_string(),
            embed_api_key: None,
            generate_url: None,
            generate_model: "gemini-2.5-flash".to_string(),
            generate_api_key: None,
            sources: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(State::for_tests().validate().is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let mut state = State::for_tests();
        state.chunk_overlap = 500;
        assert!(state.validate().is_err());
    }

    #[test]
    fn rejects_unaligned_dimensions() {
        let mut state = State::for_tests();
        state.dimensions = 383;
        assert!(state.validate().is_err());
    }

    #[test]
    fn rejects_unknown_search_method() {
        let mut state = State::for_tests();
        state.search_method = "hnsw".to_string();
        assert!(state.validate().is_err());
    }
}
