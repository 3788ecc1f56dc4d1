use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use deskrag::answer::{AnswerEngine, HttpGenerator, TextGenerator};
use deskrag::builder::IndexBuilder;
use deskrag::classify::classify;
use deskrag::config::State;
use deskrag::corpus::CorpusHandle;
use deskrag::embed::HttpEmbedder;
use deskrag::fetch::HttpFetcher;
use deskrag::retriever::Retriever;
use deskrag::store::CorpusStore;
use deskrag::tickets::TicketLog;

/// Generation calls run a full prompt through the model; give them more
/// headroom than page fetches.
const GENERATE_TIMEOUT_SECS: u64 = 60;

#[derive(Parser)]
#[command(name = "deskrag")]
#[command(version = "0.1")]
#[command(about = "A helpdesk knowledge base with retrieval-augmented answers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the documentation corpus (or adopt the stored one)
    Build {
        /// Rebuild even when a stored corpus exists
        #[arg(long)]
        force: bool,
    },
    /// Search the corpus for a query read from stdin
    Search,
    /// Classify a ticket read from stdin and answer it
    Ask,
    /// Classify a ticket read from stdin
    Classify,
    /// List processed tickets
    Tickets,
    /// Print the effective configuration
    Config,
}

fn make_builder(state: &State) -> Result<IndexBuilder> {
    let fetcher = HttpFetcher::new(Duration::from_secs(state.fetch_timeout_secs))?;
    let embedder = make_embedder(state)?;
    Ok(IndexBuilder::new(
        CorpusStore::new(&state.index_dir),
        Arc::new(fetcher),
        embedder,
    ))
}

fn make_embedder(state: &State) -> Result<Arc<HttpEmbedder>> {
    let embedder = HttpEmbedder::new(
        state.embed_url()?,
        state.embed_model.clone(),
        state.embed_api_key.as_deref(),
        state.dimensions,
        Duration::from_secs(state.fetch_timeout_secs),
    )?;
    Ok(Arc::new(embedder))
}

fn make_generator(state: &State) -> Result<Option<Arc<dyn TextGenerator>>> {
    let Some(url) = state.generate_url.as_deref() else {
        return Ok(None);
    };
    let generator = HttpGenerator::new(
        url,
        state.generate_model.clone(),
        state.generate_api_key.as_deref(),
        Duration::from_secs(GENERATE_TIMEOUT_SECS),
    )?;
    Ok(Some(Arc::new(generator)))
}

/// Load or build the corpus and hand back a ready handle.
fn ready_handle(state: &State) -> Result<CorpusHandle> {
    let builder = make_builder(state)?;
    let corpus = builder.build(state, false)?;
    let handle = CorpusHandle::new();
    handle.install(corpus);
    Ok(handle)
}

fn build_command(state: &State, force: bool) -> Result<()> {
    let builder = make_builder(state)?;
    let corpus = builder.build(state, force)?;
    println!(
        "{}",
        serde_json::json!({
            "chunks": corpus.len(),
            "index_dir": state.index_dir,
        })
    );
    Ok(())
}

fn search_command(state: &State) -> Result<()> {
    let mut query = String::new();
    io::stdin().read_line(&mut query)?;
    let query = query.trim();

    let handle = ready_handle(state)?;
    let corpus_chunks = handle.snapshot().map(|c| c.len()).unwrap_or(0);
    let retriever = Retriever::new(handle, make_embedder(state)?, state);
    let results = retriever.search(query, state.top_k)?;

    let output = serde_json::json!({
        "query": query,
        "corpus_chunks": corpus_chunks,
        "results": results.iter().map(|result| {
            serde_json::json!({
                "score": result.score,
                "url": result.metadata.url,
                "chunk_id": result.metadata.chunk_id,
                "content": result.content,
            })
        }).collect::<Vec<_>>(),
        "actual_results_count": results.len(),
        "requested_results_count": state.top_k,
    });
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}

fn ask_command(state: &State) -> Result<()> {
    let mut ticket = String::new();
    io::stdin().read_to_string(&mut ticket)?;
    let ticket = ticket.trim();

    let classification = classify(ticket);
    let handle = ready_handle(state)?;
    let retriever = Retriever::new(handle.clone(), make_embedder(state)?, state);
    let engine = AnswerEngine::new(handle, retriever, make_generator(state)?);

    let answer = engine.respond(ticket, &classification);
    let record = TicketLog::new(&state.index_dir).append(
        ticket,
        classification,
        answer.response.clone(),
        answer.sources.clone(),
    )?;

    let output = serde_json::json!({
        "id": record.id,
        "classification": record.classification,
        "response": answer.response,
        "sources": answer.sources,
    });
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}

fn classify_command() -> Result<()> {
    let mut ticket = String::new();
    io::stdin().read_to_string(&mut ticket)?;

    let classification = classify(ticket.trim());
    println!("{}", serde_json::to_string(&classification)?);
    Ok(())
}

fn tickets_command(state: &State) -> Result<()> {
    let records = TicketLog::new(&state.index_dir).load_all()?;
    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

fn config_command(state: &State) -> Result<()> {
    state.print_config();
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Cli::parse();
    let state = State::new()?;

    match args.command {
        Commands::Build { force } => build_command(&state, force)?,
        Commands::Search => search_command(&state)?,
        Commands::Ask => ask_command(&state)?,
        Commands::Classify => classify_command()?,
        Commands::Tickets => tickets_command(&state)?,
        Commands::Config => config_command(&state)?,
    }
    Ok(())
}
