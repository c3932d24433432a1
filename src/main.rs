//! # Docvec CLI (`dvx`)
//!
//! The `dvx` binary is the primary interface for Docvec. It provides
//! commands for building a snapshot from a DocBook corpus, semantic search,
//! near-duplicate mining, corpus inspection, and starting the HTTP search
//! server.
//!
//! ## Usage
//!
//! ```bash
//! dvx --config ./config/dvx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dvx build` | Extract, chunk, and embed the corpus, then write a snapshot |
//! | `dvx search "<query>"` | Semantic search over the built snapshot |
//! | `dvx dups` | Mine near-duplicate chunk pairs into a CSV report |
//! | `dvx inspect` | Show per-file parse results and snapshot details |
//! | `dvx serve api` | Start the JSON HTTP search server |
//!
//! ## Examples
//!
//! ```bash
//! # Build a snapshot from the configured corpus
//! dvx build --config ./config/dvx.toml
//!
//! # Count what a build would embed, without calling the provider
//! dvx build --dry-run --config ./config/dvx.toml
//!
//! # Search with metadata filters
//! dvx search "rotate tls certificates" --product AcmeX --lang en
//!
//! # Mine near-duplicates across documents
//! dvx dups --k 10 --threshold 0.85 --out dups.csv
//!
//! # Serve the search API
//! dvx serve api --config ./config/dvx.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docvec::config;
use docvec::dedup;
use docvec::ingest;
use docvec::inspect;
use docvec::models::SearchFilters;
use docvec::search;
use docvec::server;

/// Docvec CLI — semantic search and duplicate mining over technical
/// documentation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dvx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dvx",
    about = "Docvec — semantic search and duplicate mining over technical documentation",
    version,
    long_about = "Docvec extracts chunks from a DocBook XML corpus, embeds them with a \
    configurable provider, and builds a row-aligned vector index + metadata snapshot. The \
    snapshot powers filtered semantic search (CLI and HTTP) and near-duplicate mining for \
    documentation review."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/dvx.toml`. All corpus, embedding, retrieval,
    /// and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/dvx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build a fresh snapshot from the corpus.
    ///
    /// Walks the configured XML directory, extracts and chunks every
    /// parseable document, embeds all chunks, and writes the vector index
    /// and metadata files. Malformed documents are skipped and reported;
    /// they never abort the build.
    Build {
        /// Show document and chunk counts without calling the embedding
        /// provider or writing any files.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the built snapshot.
    ///
    /// Encodes the query with the configured provider and returns the
    /// highest-scoring chunks, optionally filtered by product, version,
    /// and language. Filters are exact matches against chunk metadata.
    Search {
        /// The search query string.
        query: String,

        /// Number of results to return (defaults to `[retrieval] default_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Only return chunks for this product.
        #[arg(long)]
        product: Option<String>,

        /// Only return chunks for this version.
        #[arg(long)]
        version: Option<String>,

        /// Only return chunks in this language.
        #[arg(long)]
        lang: Option<String>,
    },

    /// Mine near-duplicate chunk pairs.
    ///
    /// Scans every chunk against its nearest neighbors and writes pairs
    /// above the similarity threshold to a CSV report for human review.
    /// Both `--k` and `--threshold` are required unless set in config.
    Dups {
        /// Neighbors to examine per chunk.
        #[arg(long)]
        k: Option<usize>,

        /// Minimum similarity for a reported pair, in (0, 1].
        #[arg(long)]
        threshold: Option<f32>,

        /// Restrict the scan to a language (repeatable).
        #[arg(long = "lang")]
        langs: Vec<String>,

        /// Also report pairs from within the same document.
        #[arg(long)]
        same_docs: bool,

        /// Where to write the CSV report.
        #[arg(long, default_value = "dups.csv")]
        out: PathBuf,
    },

    /// Inspect the corpus and the built snapshot.
    ///
    /// Prints per-file parse results with extracted metadata, a sample of
    /// the first document's sections, and the snapshot header if one has
    /// been built. Useful for debugging corpus markup before an embedding
    /// run.
    Inspect,

    /// Start the HTTP search server.
    ///
    /// Loads the snapshot and serves `GET /search` plus health and reload
    /// endpoints on the address configured in `[server].bind`.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the JSON search API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// the Docvec search endpoints.
    Api,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build { dry_run } => {
            ingest::run_build(&cfg, dry_run).await?;
        }
        Commands::Search {
            query,
            k,
            product,
            version,
            lang,
        } => {
            let filters = SearchFilters {
                product,
                version,
                lang,
            };
            search::run_search(&cfg, &query, k, &filters).await?;
        }
        Commands::Dups {
            k,
            threshold,
            langs,
            same_docs,
            out,
        } => {
            dedup::run_dups(&cfg, k, threshold, langs, same_docs, &out).await?;
        }
        Commands::Inspect => {
            inspect::run_inspect(&cfg)?;
        }
        Commands::Serve { service } => match service {
            ServeService::Api => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}
