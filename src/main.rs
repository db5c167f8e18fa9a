//! # askdocs CLI (`askd`)
//!
//! The `askd` binary is the primary interface for askdocs. It provides
//! commands for database initialization, document ingestion, question
//! answering, retention maintenance, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! askd --config ./config/askd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askd init` | Create the SQLite database and run schema migrations |
//! | `askd ingest <file>` | Ingest an extracted-text file for a session |
//! | `askd ask "<question>"` | Answer a question from ingested documents |
//! | `askd delete <id>` | Delete a document and all its chunks |
//! | `askd sweep` | Run a retention sweep now |
//! | `askd stats` | Show corpus statistics |
//! | `askd serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! askd init --config ./config/askd.toml
//!
//! # Load a demo document, exempt from retention
//! askd ingest samples/legal/nda.txt --sample
//!
//! # Ingest a user document into a session
//! askd ingest extracted/contract.txt --session team-a
//!
//! # Ask a question scoped to that session
//! askd ask "What are the termination conditions?" --session team-a
//!
//! # Start the HTTP server
//! askd serve --config ./config/askd.toml
//! ```

mod answer;
mod chunker;
mod config;
mod db;
mod embedding;
mod error;
mod generate;
mod index;
mod ingest;
mod lifecycle;
mod migrate;
mod models;
mod ratelimit;
mod server;
mod stats;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// askdocs CLI — a grounded question-answering service over
/// user-supplied documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/askd.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "askd",
    about = "askdocs — answer questions over your documents, with citations",
    version,
    long_about = "askdocs ingests extracted document text into a persistent vector index and \
    answers natural-language questions by retrieving the most relevant chunks and asking a \
    generation model to answer only from them, with citations attached. Queries are \
    rate-limited per session and uploaded documents expire after a retention window."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, chunk_vectors, rate_events).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Ingest an extracted-text file.
    ///
    /// The file must already be plain text; PDF/DOCX extraction happens
    /// upstream. The text is chunked, embedded, and stored under the
    /// given session.
    Ingest {
        /// Path to the extracted text file.
        file: PathBuf,

        /// Session key owning the document.
        #[arg(long, default_value = "local")]
        session: String,

        /// Mark as a sample document: visible to every session and
        /// exempt from retention sweeps.
        #[arg(long)]
        sample: bool,

        /// Filename recorded for citations; defaults to the file's name.
        #[arg(long)]
        filename: Option<String>,
    },

    /// Answer a question from the ingested documents.
    ///
    /// Retrieves the most relevant chunks for the session, asks the
    /// configured generation backends in order, and prints the answer
    /// with its citations.
    Ask {
        /// The question to answer.
        question: String,

        /// Session key whose documents are searched.
        #[arg(long, default_value = "local")]
        session: String,
    },

    /// Delete a document and all its chunks and vectors. Idempotent.
    Delete {
        /// The document UUID to delete.
        document_id: String,
    },

    /// Run a retention sweep now.
    ///
    /// Deletes every non-sample document older than the configured
    /// retention window. The periodic sweeper does the same while
    /// `askd serve` is running.
    Sweep,

    /// Show corpus statistics: documents, chunks, vectors, sessions.
    Stats,

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("initialized {}", config.db.path.display());
        }

        Commands::Ingest {
            file,
            session,
            sample,
            filename,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read text file: {}", file.display()))?;
            let filename = filename.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string())
            });

            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            let embedder = embedding::create_provider(&config.embedding)?;
            let locks = lifecycle::DocLocks::new();

            let request = ingest::IngestRequest {
                session_key: session.clone(),
                filename,
                text,
                is_sample: sample,
            };
            let receipt = ingest::ingest_text(
                &pool,
                &locks,
                embedder.as_ref(),
                &config,
                &request,
                chrono::Utc::now().timestamp(),
            )
            .await?;

            println!("ingest {}", file.display());
            println!("  document: {}", receipt.document_id);
            println!("  session:  {}", session);
            println!("  chunks:   {}", receipt.chunk_count);
            if sample {
                println!("  sample:   retention-exempt");
            }
            println!("ok");
            pool.close().await;
        }

        Commands::Ask { question, session } => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            let embedder: Arc<dyn embedding::EmbeddingProvider> =
                embedding::create_provider(&config.embedding)?.into();
            let router = generate::Router::from_config(&config.generation)?;
            let answerer = answer::Answerer::new(pool.clone(), &config, embedder, router);

            let result = answerer
                .answer(&session, &question, chrono::Utc::now().timestamp())
                .await?;

            println!("{}", result.answer);
            println!();
            println!("--- Citations ---");
            for (i, citation) in result.citations.iter().enumerate() {
                match citation.page {
                    Some(page) => println!("[{}] {}, page {}", i + 1, citation.filename, page),
                    None => println!("[{}] {}", i + 1, citation.filename),
                }
                println!(
                    "    \"{}\"",
                    citation.excerpt.replace('\n', " ").trim()
                );
            }
            println!();
            println!(
                "answered by {} in {} ms",
                result.provider, result.latency_ms
            );
            pool.close().await;
        }

        Commands::Delete { document_id } => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            let locks = lifecycle::DocLocks::new();
            let deleted = lifecycle::delete_document(&pool, &locks, &document_id).await?;
            if deleted {
                println!("deleted {}", document_id);
            } else {
                println!("not found: {}", document_id);
            }
            pool.close().await;
        }

        Commands::Sweep => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            let locks = lifecycle::DocLocks::new();
            let report = lifecycle::sweep(
                &pool,
                &locks,
                config.retention.retention_secs(),
                chrono::Utc::now().timestamp(),
            )
            .await?;
            println!("sweep");
            println!("  expired: {}", report.expired);
            println!("  deleted: {}", report.deleted);
            println!("  failed:  {}", report.failed);
            println!("ok");
            pool.close().await;
        }

        Commands::Stats => {
            stats::run_stats(&config).await?;
        }

        Commands::Serve => {
            server::run_server(&config).await?;
        }
    }

    Ok(())
}
