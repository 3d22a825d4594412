//! # rowdex CLI
//!
//! Builds a vector index from the rows of a relational query and answers
//! similarity queries against it.
//!
//! ## Usage
//!
//! ```bash
//! rowdex --config ./config/rowdex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rowdex init` | Create the index database and its schema |
//! | `rowdex build` | Load rows, embed them and upsert into the configured index |
//! | `rowdex query "<text>"` | Top-k most similar rows to a text |
//! | `rowdex stats` | List indexes with dims, metric, size and last write |
//! | `rowdex completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! rowdex init
//! rowdex build --progress human
//! rowdex build --dry-run
//! rowdex query "wireless headphones" --top-k 3
//! rowdex query "wireless headphones" --json | jq '.[0].id'
//! ```
//!
//! Exit status is non-zero when a command fails; the error is printed on
//! stderr. An interrupted build exits with 130.

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use rowdex::build::{self, BuildOptions};
use rowdex::progress::ProgressMode;
use rowdex::{config, logging, migrate, query, stats};

/// rowdex: relational rows in, nearest neighbours out.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rowdex.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rowdex",
    about = "Index relational rows as embeddings and query them by similarity",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rowdex.toml")]
    config: PathBuf,

    /// Debug-level logs on stderr (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Build or refresh the configured index from the source query.
    ///
    /// Creates the index on first run. Re-running upserts by id, so an
    /// unchanged source leaves the index unchanged.
    Build {
        /// Positional query parameters; replaces `source.params` when given.
        #[arg(long = "param")]
        params: Vec<String>,

        /// Load and normalize rows only. No embedding, no writes.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr. Defaults to human when stderr is a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Print the build report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Find the rows most similar to a text.
    Query {
        text: String,

        /// Number of hits (defaults to `retrieval.top_k`).
        #[arg(long, short = 'k')]
        top_k: Option<usize>,

        /// Print hits as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Show indexes in the index database.
    Stats,

    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "rowdex", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Index database initialized at {}.", cfg.index.path.display());
        }
        Commands::Build {
            params,
            dry_run,
            progress,
            json,
        } => {
            let mut options = BuildOptions::from_config(&cfg);
            if !params.is_empty() {
                options.params = params;
            }
            options.dry_run = dry_run;

            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current batch");
                    on_signal.cancel();
                }
            });

            let report = build::run_build(&cfg, &options, reporter.as_ref(), &cancel, json)
                .await
                .with_context(|| format!("building index '{}'", cfg.index.name))?;
            if report.cancelled {
                std::process::exit(130);
            }
        }
        Commands::Query { text, top_k, json } => {
            query::run_query(&cfg, &text, top_k, json)
                .await
                .with_context(|| format!("querying index '{}'", cfg.index.name))?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
