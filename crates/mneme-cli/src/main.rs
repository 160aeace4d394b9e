//! CLI entry point for the Mneme backend.
//!
//! `mneme build` is the offline batch entrypoint: it reads the configured
//! sources and writes the corpus files. It exits non-zero only for
//! unrecoverable setup errors; skipped sources are reported in the summary.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use mneme_core::{
    app_data_dir, load_config, load_config_from, retrieve, run_build, status, CancelToken, Config,
    Corpus, ProviderKind,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mneme")]
#[command(about = "Mneme: corpus build and similarity retrieval for a chat assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the offline build: chunk sources, extend the vocabulary, encode,
    /// merge, and write the corpus files.
    Build {
        /// Config file path (defaults to the one in the app data directory).
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Also produce the remote embeddings file via the configured
        /// embedding service.
        #[arg(long)]
        remote: bool,
    },
    /// Retrieve the chunks most similar to a question.
    Query {
        /// The question to search with.
        #[arg(value_name = "QUESTION")]
        question: String,
        /// How many chunks to return.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Print hits as JSON instead of text.
        #[arg(long)]
        json: bool,
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Show backend status and corpus statistics.
    Status {
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Show where Mneme stores its config and corpus (app data directory).
    DataDir,
}

fn load(config: &Option<PathBuf>) -> Result<Config> {
    match config {
        Some(path) => Ok(load_config_from(path)?),
        None => Ok(load_config()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Status { config: None }) {
        Commands::Build { config, remote } => {
            let config = load(&config)?;
            let provider = if remote || config.provider == ProviderKind::Remote {
                ProviderKind::Remote
            } else {
                ProviderKind::Local
            };
            let settings = config.build_settings(provider)?;
            let summary = run_build(&settings, &CancelToken::new()).await?;
            println!("Build finished.");
            println!("  documents ingested: {}", summary.documents);
            println!("  chunks added:       {}", summary.chunks_added);
            println!("  sources skipped:    {}", summary.sources_skipped);
            println!("  chunks skipped:     {}", summary.chunks_skipped);
            println!("  vocabulary size:    {}", summary.vocabulary_size);
            println!("  corpus chunks:      {}", summary.total_chunks);
        }
        Commands::Query {
            question,
            top_k,
            json,
            config,
        } => {
            let config = load(&config)?;
            let corpus = Corpus::load(&config.corpus_dir()?)?;
            if corpus.is_empty() {
                println!("Corpus is empty. Run `mneme build` first.");
                return Ok(());
            }
            let k = top_k.unwrap_or(config.retrieval.top_k);
            let hits = retrieve(&corpus, &question, k)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No matching chunks.");
            } else {
                for (i, hit) in hits.iter().enumerate() {
                    println!("{}. [{:.4}] {}  ({})", i + 1, hit.score, hit.id, hit.source);
                    println!("   {}", hit.text);
                }
            }
        }
        Commands::Status { config } => {
            println!("Mneme backend");
            println!("  core: {}", status());
            let config = load(&config)?;
            let dir = config.corpus_dir()?;
            match Corpus::load(&dir) {
                Ok(corpus) if corpus.is_empty() => {
                    println!("  corpus: empty ({})", dir.display());
                }
                Ok(corpus) => {
                    println!("  corpus: {}", dir.display());
                    println!("    chunks:     {}", corpus.chunks.len());
                    println!("    vocabulary: {} terms", corpus.vocabulary.len());
                    println!("    embeddings: {}", corpus.embeddings.len());
                }
                Err(e) => eprintln!("  corpus: failed to load: {e}"),
            }
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        },
    }
    Ok(())
}
