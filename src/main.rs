//! # ConQuerX CLI (`conquerx`)
//!
//! Runs the quiz-generation pipeline and manages its content cache.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `conquerx run` | Run every stage: seed, concepts, quiz, eval |
//! | `conquerx run --step <step>` | Run a single stage |
//! | `conquerx cache clear` | Delete every cached encyclopedia page |
//! | `conquerx cache stats` | Show cache size and last write |
//!
//! ## Examples
//!
//! ```bash
//! # Full run with a fresh cache and debug logging
//! conquerx -v run --clear-cache
//!
//! # Re-run only the evaluation against an explicit config
//! conquerx --config ./conquerx.toml run --step eval
//! ```
//!
//! Exits 0 on success, 1 on any failure or Ctrl-C.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use conquerx::cache::ContentCache;
use conquerx::config::{load_config, Config};
use conquerx::pipeline::{Pipeline, Step};
use conquerx::progress::ProgressMode;
use conquerx::{logging, stats};

/// ConQuerX: retrieval-grounded quiz generation and evaluation.
#[derive(Parser)]
#[command(name = "conquerx", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./conquerx.toml` when present, built-in defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on the console.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Progress output on stderr: off, human, or json.
    /// Defaults to human when stderr is a TTY.
    #[arg(long, global = true, value_parser = parse_progress)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline, or one step of it.
    Run {
        /// Step to run.
        #[arg(long, value_enum, default_value = "all")]
        step: Step,

        /// Clear the content cache before running.
        #[arg(long)]
        clear_cache: bool,
    },

    /// Inspect or clear the content cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete every cached page.
    Clear,
    /// Show page count, size and last write.
    Stats,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_file = config.paths.log_file_path();
    if let Err(e) = logging::init(cli.verbose, log_file.as_deref()) {
        eprintln!("Warning: {:#}. Logging to console only", e);
        let _ = logging::init(cli.verbose, None);
    }

    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    let outcome = tokio::select! {
        result = execute(cli.command, config, progress) => result,
        _ = tokio::signal::ctrl_c() => {
            error!("Pipeline interrupted by user");
            return ExitCode::FAILURE;
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Pipeline failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands, config: Config, progress: ProgressMode) -> anyhow::Result<()> {
    match command {
        Commands::Run { step, clear_cache } => {
            info!("Starting pipeline (step: {:?})", step);
            let pipeline = Pipeline::from_config(config)?.with_progress(progress.reporter());
            pipeline.run(step, clear_cache).await?;
        }
        Commands::Cache { action } => {
            let cache = ContentCache::new(config.paths.cache_dir_path());
            match action {
                CacheAction::Clear => {
                    let removed = cache.clear();
                    println!("Cleared {} cached pages", removed);
                }
                CacheAction::Stats => {
                    print!("{}", stats::render_cache_stats(&cache, &cache.stats()));
                }
            }
        }
    }
    Ok(())
}
