//! # docqa CLI
//!
//! The `docqa` binary drives the full document question-answering pipeline:
//! database initialization, corpus ingestion, retrieval checks, one-shot
//! questions, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and run schema migrations |
//! | `docqa ingest` | Scan the corpus, chunk, embed, and publish indexes |
//! | `docqa search "<query>"` | Run hybrid retrieval and print ranked chunks |
//! | `docqa ask "<question>"` | Answer one question, streaming tokens to stdout |
//! | `docqa stats` | Print corpus statistics |
//! | `docqa serve` | Start the HTTP API server |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use docqa::config::{self, Config};
use docqa::embedding::{self, Embedder};
use docqa::generation::GenerationClient;
use docqa::pipeline::{self, QueryEvent};
use docqa::server::{self, AppState};
use docqa::snapshot::{IndexSnapshot, SnapshotStore};
use docqa::{db, ingest, migrate, store};

/// Question answering over a private document corpus with hybrid retrieval
/// and streaming generation.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Question answering over a private document corpus",
    version,
    long_about = "docqa ingests a directory of documents (docx, pdf, markdown, plain text), \
    indexes them for hybrid BM25 + embedding retrieval, and answers questions through an \
    OpenAI-compatible generation endpoint with full provenance for every answer."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent;
    /// running it multiple times is safe.
    Init,

    /// Run an ingestion pass over the corpus directory.
    ///
    /// Loads every matching document, chunks it, embeds the chunks when an
    /// embedding provider is configured, supersedes the previous generation,
    /// and publishes fresh indexes. An unchanged corpus is skipped unless
    /// `--force` is given.
    Ingest {
        /// Re-ingest even when no document content changed.
        #[arg(long)]
        force: bool,
    },

    /// Run hybrid retrieval and print the ranked chunks.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to print.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Answer a single question, streaming the answer to stdout.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Print corpus statistics.
    Stats,

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { force } => {
            let (pool, embedder, snapshots) = open(&cfg).await?;
            let report = ingest::ingest(&pool, &cfg, embedder.as_ref(), &snapshots, force).await?;
            if report.skipped {
                println!(
                    "Corpus unchanged ({} documents); generation {} kept.",
                    report.documents, report.generation
                );
            } else {
                println!(
                    "Ingested {} documents into {} chunks (generation {}).",
                    report.documents, report.chunks, report.generation
                );
            }
        }
        Commands::Search { query, limit } => {
            let (pool, embedder, snapshots) = open(&cfg).await?;
            ingest::restore_snapshot(&pool, &cfg, embedder.as_ref(), &snapshots).await?;

            let mut retrieval_cfg = cfg.clone();
            retrieval_cfg.retrieval.top_k = limit;
            let snapshot = snapshots.current();
            let results =
                pipeline::retrieve(&snapshot, embedder.as_ref(), &retrieval_cfg, &query).await;

            if results.is_empty() {
                println!("No results.");
            }
            for (rank, result) in results.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} (chunk {}/{})",
                    rank + 1,
                    result.score,
                    result.chunk.document_title,
                    result.chunk.ordinal,
                    result.chunk.total_chunks
                );
                println!("   {}", snippet(&result.chunk.content, 160));
            }
        }
        Commands::Ask { question } => {
            let (pool, embedder, snapshots) = open(&cfg).await?;
            ingest::restore_snapshot(&pool, &cfg, embedder.as_ref(), &snapshots).await?;
            let client = GenerationClient::new(cfg.generation.clone());

            let (tx, mut rx) = mpsc::channel::<QueryEvent>(32);
            let printer = tokio::spawn(async move {
                let mut stdout = std::io::stdout();
                while let Some(event) = rx.recv().await {
                    match event {
                        QueryEvent::Citations(citations) => {
                            for citation in &citations {
                                eprintln!(
                                    "[source {:.3}] {}",
                                    citation.relevance_score, citation.title
                                );
                            }
                        }
                        QueryEvent::Token(token) => {
                            let _ = write!(stdout, "{}", token);
                            let _ = stdout.flush();
                        }
                        QueryEvent::Done { status, error, .. } => {
                            let _ = writeln!(stdout);
                            if let Some(error) = error {
                                eprintln!("[{}] {}", status.as_str(), error);
                            }
                        }
                    }
                }
            });

            pipeline::answer_question(
                &pool,
                &cfg,
                embedder.as_ref(),
                &snapshots,
                &client,
                &question,
                Some(tx),
            )
            .await?;
            let _ = printer.await;
        }
        Commands::Stats => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let stats = store::corpus_stats(&pool).await?;
            println!("Documents:      {}", stats.total_documents);
            println!("Active chunks:  {}", stats.total_chunks);
            println!("Corpus bytes:   {}", stats.total_bytes);
            println!("Generation:     {}", stats.generation);
            match stats.last_ingested_at {
                Some(ts) => println!("Last ingested:  {}", ts),
                None => println!("Last ingested:  never"),
            }
        }
        Commands::Serve => {
            let (pool, embedder, snapshots) = open(&cfg).await?;
            ingest::restore_snapshot(&pool, &cfg, embedder.as_ref(), &snapshots).await?;

            let state = AppState {
                config: Arc::new(cfg.clone()),
                pool,
                snapshots,
                embedder,
                client: Arc::new(GenerationClient::new(cfg.generation.clone())),
                ingest_lock: Arc::new(tokio::sync::Mutex::new(())),
            };
            server::run_server(state).await?;
        }
    }

    Ok(())
}

/// Opens the database, creates the configured embedder, and prepares an
/// empty snapshot store.
async fn open(cfg: &Config) -> Result<(sqlx::SqlitePool, Option<Arc<dyn Embedder>>, Arc<SnapshotStore>)> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let embedder = embedding::create_embedder(&cfg.embedding)?;
    let snapshots = Arc::new(SnapshotStore::new(IndexSnapshot::empty()));
    Ok((pool, embedder, snapshots))
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let mut out: String = flat.chars().take(max_chars).collect();
    if flat.chars().count() > max_chars {
        out.push('…');
    }
    out
}
