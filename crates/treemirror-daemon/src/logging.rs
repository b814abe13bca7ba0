//! Tracing setup for the daemon
//!
//! Events fan out to two sinks: a human-readable console layer on stdout and
//! a JSON layer appended to the configured log file. `RUST_LOG` overrides the
//! configured level for both.

use std::{
    fs::{File, OpenOptions},
    path::Path,
    sync::Mutex,
};

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use treemirror_core::config::LoggingConfig;

/// Level used before the configuration has been parsed
pub const DEFAULT_LEVEL: &str = "info";

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Opens `path` for appending, creating it and its parent directories
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Installs the console and file layers as the global subscriber
pub fn init(config: &LoggingConfig) -> Result<()> {
    let file = open_log_file(&config.file)?;

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_current_span(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Console-only logging, for errors raised before the log file is known
pub fn init_console(level: &str) {
    // Ignored if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(false)
        .try_init();
}
