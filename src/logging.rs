//! Logging setup for the `conquerx` binary.
//!
//! Two `tracing-subscriber` layers share one registry:
//! - console (stderr, coloured): INFO, or DEBUG with `--verbose`;
//!   `RUST_LOG` overrides both.
//! - file (plain text, appended): DEBUG, when a log file is configured.
//!
//! Library code only emits events; it never installs a subscriber.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const FILE_FILTER: &str = "warn,conquerx=debug";

fn console_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "warn,conquerx=debug"
        } else {
            "warn,conquerx=info"
        })
    })
}

/// Install the global subscriber. Call once, before any stage runs.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter(verbose));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory: {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;

            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(EnvFilter::new(FILE_FILTER)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to initialise logging")
}
