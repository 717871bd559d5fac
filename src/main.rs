//! # Review Harness CLI (`rvw`)
//!
//! ## Usage
//!
//! ```bash
//! rvw --config ./config/rvw.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rvw init` | Create the insight store (SQLite schema or JSON document) |
//! | `rvw analyze [PATH]` | Review every changed source file under PATH |
//! | `rvw insights [PATH]` | Show one cached review, or list all of them |
//! | `rvw serve` | Start the HTTP trigger |
//!
//! ## Examples
//!
//! ```bash
//! # Review only Rust and TypeScript files with 8 workers
//! rvw analyze --ext rs --ext ts --concurrency 8
//!
//! # Re-review everything and save a CSV report
//! rvw analyze --force --format csv --output review.csv
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use review_harness::batch::run_batch_with_handle;
use review_harness::config::{self, Config};
use review_harness::export::{write_export, ExportFormat};
use review_harness::insights::run_insights;
use review_harness::migrate;
use review_harness::models::BatchAnalysisOptions;
use review_harness::progress::ProgressMode;
use review_harness::provider::ProviderHandle;
use review_harness::server;
use review_harness::store::open_store;

/// Review Harness CLI: batch AI code review with a content-addressed cache.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rvw.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rvw",
    about = "Review Harness: batch AI code review with a content-addressed insight cache",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rvw.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the insight store.
    ///
    /// Idempotent: running it against an existing store leaves records intact.
    Init,

    /// Analyze source files under a project root.
    ///
    /// Files whose content fingerprint matches the stored insight are
    /// skipped unless `--force` is given.
    Analyze {
        /// Project root. Defaults to `[project].root` from the config.
        path: Option<PathBuf>,

        /// Re-analyze every file, ignoring cached insights.
        #[arg(long)]
        force: bool,

        /// Maximum number of concurrent provider calls.
        #[arg(long)]
        concurrency: Option<i64>,

        /// Restrict analysis to these extensions (repeatable).
        #[arg(long = "ext")]
        extensions: Vec<String>,

        /// Per-file provider timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Output format: `text`, `json`, or `csv`.
        #[arg(long, default_value = "text")]
        format: String,

        /// Write the report to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Progress on stderr: `auto`, `off`, `human`, or `json`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Show stored insights.
    Insights {
        /// Relative path of one file. Lists every record when omitted.
        path: Option<String>,
    },

    /// Start the HTTP trigger on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("review_harness=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::init_store(&cfg.store).await?;
            println!("Insight store initialized at {}", cfg.store.path.display());
        }
        Commands::Analyze {
            path,
            force,
            concurrency,
            extensions,
            timeout,
            format,
            output,
            progress,
        } => {
            let options = BatchAnalysisOptions {
                force,
                concurrency,
                extensions: (!extensions.is_empty()).then_some(extensions),
                timeout_secs: timeout,
            };
            run_analyze(&cfg, path, &options, &format, output, &progress).await?;
        }
        Commands::Insights { path } => {
            run_insights(&cfg, path.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_analyze(
    cfg: &Config,
    path: Option<PathBuf>,
    options: &BatchAnalysisOptions,
    format: &str,
    output: Option<PathBuf>,
    progress: &str,
) -> anyhow::Result<()> {
    let format = ExportFormat::parse(format)?;
    let mode = ProgressMode::parse(progress).with_context(|| {
        format!("Unknown progress mode: '{}'. Must be auto, off, human, or json.", progress)
    })?;
    let root = path.unwrap_or_else(|| cfg.project.root.clone());

    let store = open_store(&cfg.store).await?;
    let handle = ProviderHandle::new();
    let result = run_batch_with_handle(
        &root,
        cfg,
        store,
        &handle,
        options,
        Arc::from(mode.reporter()),
    )
    .await?;

    write_export(&result, format, output.as_deref())?;

    if result.error_count > 0 && result.analyzed_count == 0 && result.skipped_count == 0 {
        anyhow::bail!("every analyzable file failed");
    }
    Ok(())
}
