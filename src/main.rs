//! # lexrecall CLI (`lexr`)
//!
//! ## Usage
//!
//! ```bash
//! lexr --config ./config/lexr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexr init` | Create the SQLite database and run schema migrations |
//! | `lexr import <file.json>` | Load documents from a JSON array |
//! | `lexr rebuild` | Build the index and report what it contains |
//! | `lexr search "<query>"` | Run the retrieval cascade |
//! | `lexr ask "<question>"` | Answer, record the interaction, print its id |
//! | `lexr feedback <id> <rating>` | Rate an interaction (1-5) |
//! | `lexr stats` | Learning statistics |
//! | `lexr top` | Most frequently asked questions |
//! | `lexr synonyms <term>` | Learned synonyms of a term |
//! | `lexr export` | Export rated Q&A, patterns, and stats as JSON |
//!
//! Logs go to stderr (`RUST_LOG`, or `-v`/`-vv`); results go to stdout.

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use lexrecall::{app, ask, config, export, feedback, import, logging, migrate, search, stats};

/// lexrecall: adaptive legal retrieval that learns from answer ratings.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lexr.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lexr",
    about = "lexrecall: adaptive legal retrieval that learns from answer ratings",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexr.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). Overridden by RUST_LOG.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Import documents from a JSON file.
    ///
    /// The file holds an array of `{id, title, section?, article_number?,
    /// text, url?}` objects. Existing ids are updated in place.
    Import {
        file: PathBuf,

        /// Replace the whole corpus instead of merging into it.
        #[arg(long)]
        replace: bool,
    },

    /// Build the index snapshot and print a summary.
    Rebuild,

    /// Search the corpus.
    Search {
        query: String,

        /// Search mode: auto, article, semantic, tfidf, keyword.
        #[arg(long, default_value = "auto")]
        mode: String,

        /// Maximum number of passages (defaults to retrieval.top_k).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question and record the interaction for feedback.
    Ask {
        question: String,

        /// User identifier stored with the interaction.
        #[arg(long, default_value = "")]
        user: String,
    },

    /// Rate a recorded interaction.
    Feedback {
        /// Interaction id printed by `lexr ask`.
        id: String,

        /// Rating from 1 (wrong) to 5 (excellent).
        #[arg(allow_hyphen_values = true)]
        rating: i64,

        /// Optional written feedback.
        #[arg(long)]
        text: Option<String>,
    },

    /// Show learning statistics.
    Stats,

    /// List the most frequently asked questions.
    Top {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// List learned synonyms of a term.
    Synonyms { term: String },

    /// Export learned data as JSON.
    Export {
        /// Directory for high_quality_qa.json, patterns.json, stats.json.
        /// Prints a single JSON document to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

async fn run_rebuild(cfg: &config::Config) -> Result<()> {
    let app = app::open(cfg).await?;
    let report = app.engine.rebuild_index().await;
    app.close().await;

    let report = report.map_err(app::engine_error)?;
    println!("Indexed {} documents ({} terms)", report.documents, report.terms);
    match &report.embedding_model {
        Some(model) => println!("Embeddings: {}", model),
        None => println!("Embeddings: none (lexical only)"),
    }
    println!("Fingerprint: {}", report.fingerprint);
    println!("Built at: {}", report.built_at.to_rfc3339());
    println!("Elapsed: {} ms", report.elapsed_ms);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file, replace } => {
            import::run_import(&cfg, &file, replace).await?;
        }
        Commands::Rebuild => {
            run_rebuild(&cfg).await?;
        }
        Commands::Search { query, mode, limit } => {
            search::run_search(&cfg, &query, &mode, limit).await?;
        }
        Commands::Ask { question, user } => {
            ask::run_ask(&cfg, &question, &user).await?;
        }
        Commands::Feedback { id, rating, text } => {
            feedback::run_feedback(&cfg, &id, rating, text).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Top { limit } => {
            stats::run_top(&cfg, limit).await?;
        }
        Commands::Synonyms { term } => {
            stats::run_synonyms(&cfg, &term).await?;
        }
        Commands::Export { out } => {
            export::run_export(&cfg, out.as_deref()).await?;
        }
    }

    Ok(())
}
