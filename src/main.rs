//! # Pledge Tracker CLI (`pledge`)
//!
//! ## Usage
//!
//! ```bash
//! pledge --config ./config/pledge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pledge init` | Create the SQLite database and schema |
//! | `pledge extract` | Extract commitments from pending documents |
//! | `pledge track` | Screen and verify pending documents against open commitments |
//! | `pledge sweep` | Apply date-driven `delayed` / `stale` transitions |
//! | `pledge compact` | Re-run dedup over the whole store |
//! | `pledge export` | Write markdown records |
//! | `pledge index` | Regenerate the index JSON |
//! | `pledge get <id>` | Print one commitment record |
//! | `pledge stats` | Totals by status and category |
//! | `pledge segment <file>` | Show how a document file would be chunked |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default
//! `info,sqlx=warn`). Stdout carries only command output.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pledge_tracker::config::{self, Config};
use pledge_tracker::pipeline::{self, ExtractOptions, TRACK_RUN};
use pledge_tracker::progress::ProgressMode;
use pledge_tracker::{export, get, migrate, segment, stats};

/// Pledge Tracker: extract government policy commitments from official
/// responses and track whether they are kept.
#[derive(Parser)]
#[command(
    name = "pledge",
    about = "Extract policy commitments from government-response documents and track their fulfillment",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pledge.toml")]
    config: PathBuf,

    /// Progress on stderr.
    /// Defaults to `human` when stderr is a terminal, otherwise `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Extract commitments from documents not yet processed.
    ///
    /// Each document is segmented, sent to the oracle chunk by chunk, and
    /// the candidates are merged into the store through dedup. Progress is
    /// checkpointed per document under the run name `extract`.
    Extract {
        /// Ignore the checkpoint and reprocess every document.
        #[arg(long)]
        full: bool,

        /// Show document and chunk counts without calling the oracle.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Match documents against open commitments and record progress.
    Track {
        /// Checkpoint run name.
        #[arg(long, default_value = TRACK_RUN)]
        run: String,

        /// Forget the run's checkpoint before starting.
        #[arg(long)]
        reset: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Mark overdue commitments delayed and quiet ones stale.
    Sweep {
        /// Evaluate as of this date (YYYY-MM-DD) instead of now.
        #[arg(long, value_parser = parse_date)]
        today: Option<NaiveDate>,
    },

    /// Re-run dedup over every stored commitment.
    Compact,

    /// Regenerate the index JSON.
    Index {
        /// Output path (default: `[export].index_path`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Build from exported record files in this directory instead of the store.
        #[arg(long)]
        from_records: Option<PathBuf>,
    },

    /// Write every commitment as a markdown record.
    Export {
        /// Output directory (default: `[export].records_dir`).
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Print one commitment by id or unique id prefix.
    Get { id: String },

    /// Show store statistics.
    Stats,

    /// Show how the documents in a JSON file would be chunked.
    Segment { file: PathBuf },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got '{}': {}", s, e))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    // Segmenting needs no database; fall back to defaults without a config file.
    if let Commands::Segment { file } = &cli.command {
        let cfg = if cli.config.exists() {
            config::load_config(&cli.config)?
        } else {
            Config::minimal()
        };
        return segment::run_segment(&cfg, file);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Extract {
            full,
            dry_run,
            limit,
        } => {
            let options = ExtractOptions {
                full,
                dry_run,
                limit,
            };
            pipeline::run_extract(&cfg, options, progress).await?;
        }
        Commands::Track { run, reset, limit } => {
            pipeline::run_track(&cfg, &run, reset, limit, progress).await?;
        }
        Commands::Sweep { today } => {
            pipeline::run_sweep(&cfg, today).await?;
        }
        Commands::Compact => {
            pipeline::run_compact(&cfg).await?;
        }
        Commands::Index {
            output,
            from_records,
        } => {
            export::run_index(&cfg, output.as_deref(), from_records.as_deref()).await?;
        }
        Commands::Export { dir } => {
            export::run_export(&cfg, dir.as_deref()).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Segment { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
