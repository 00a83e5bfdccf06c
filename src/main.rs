//! # docbot CLI
//!
//! ```bash
//! docbot --config ./config/docbot.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docbot init` | Create the index database and schema |
//! | `docbot scrape` | Download every URL in the URL list into the raw cache |
//! | `docbot ingest` | Process, chunk, embed, and index the raw cache |
//! | `docbot query "<text>"` | Show the chunks retrieval finds for a query |
//! | `docbot query --list` | List indexed documents |
//! | `docbot query` | Show index statistics |
//! | `docbot chat` | Start an interactive chat session |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docbot::progress::ProgressMode;
use docbot::session::Verbosity;
use docbot::{config, ingest, logging, migrate, query, scrape, session};

/// docbot: chat with your documentation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docbot.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docbot",
    about = "docbot: a retrieval-augmented assistant for your documentation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docbot.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database.
    ///
    /// Creates the SQLite file and the chunks table. Idempotent.
    Init,

    /// Download the URL list into the raw cache.
    ///
    /// URLs already present in the cache are skipped.
    Scrape,

    /// Process the raw cache into the vector index.
    ///
    /// Unchanged documents are skipped; one failing document never aborts
    /// the run.
    Ingest {
        /// Clear the index and re-embed everything.
        #[arg(long)]
        rebuild: bool,

        /// Progress on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search the index, list documents, or show statistics.
    Query {
        /// Search text. Without it (and without --list), show statistics.
        #[arg(conflicts_with = "list")]
        query: Option<String>,

        /// List all indexed documents.
        #[arg(short, long)]
        list: bool,

        /// Number of results to show.
        #[arg(short = 'n', long, default_value_t = 5)]
        num_results: usize,

        /// Show chunk position and processing time.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Chat with the documentation assistant.
    Chat {
        /// Show source references and retrieval warnings.
        #[arg(short, long)]
        verbose: bool,

        /// Also show retrieved chunks and their relevance.
        #[arg(long)]
        very_verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Scrape => {
            let summary = scrape::run_scrape(&cfg).await?;
            tracing::info!(
                downloaded = summary.downloaded,
                cached = summary.cached,
                failed = summary.failed,
                "scrape finished"
            );
        }
        Commands::Ingest { rebuild, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&cfg, rebuild, mode).await?;
        }
        Commands::Query {
            query,
            list,
            num_results,
            verbose,
        } => {
            query::run_query(&cfg, query.as_deref(), list, num_results, verbose).await?;
        }
        Commands::Chat {
            verbose,
            very_verbose,
        } => {
            session::run_chat(
                &cfg,
                Verbosity {
                    verbose,
                    very_verbose,
                },
            )
            .await?;
        }
    }

    Ok(())
}
