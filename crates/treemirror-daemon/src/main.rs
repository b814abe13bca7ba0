//! treemirror daemon - one-way directory mirroring service
//!
//! This binary keeps a destination directory an exact copy of a source
//! directory:
//! - Parses and validates the command line
//! - Sets up console and JSON file logging
//! - Runs a reconcile pass on a fixed interval
//! - Shuts down gracefully on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon builds a [`TreeComparator`] over the local filesystem and
//! hands it to a [`SyncScheduler`]. The scheduler loop is controlled by a
//! `CancellationToken` that is triggered on receipt of SIGTERM or SIGINT; a
//! pass in flight is allowed to finish before the process exits.

mod logging;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use treemirror_core::config::{Config, ConfigBuilder};
use treemirror_sync::{
    engine::TreeComparator, filesystem::LocalFileSystemAdapter, scheduler::SyncScheduler,
};

/// Exit status for unusable command lines and configurations
const EXIT_USAGE: u8 = 2;

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "treemirrord",
    version,
    about = "Keep a destination directory an exact mirror of a source directory"
)]
struct Cli {
    /// Directory to mirror
    #[arg(short, long)]
    source: PathBuf,

    /// Mirror directory (created if absent)
    #[arg(short, long)]
    destination: PathBuf,

    /// Milliseconds between the starts of two passes
    #[arg(short, long)]
    interval: u64,

    /// Log file; receives JSON lines in append mode
    #[arg(short, long)]
    log: PathBuf,

    /// Log level: trace, debug, info, warn or error (RUST_LOG overrides)
    #[arg(long, default_value = logging::DEFAULT_LEVEL)]
    log_level: String,
}

impl Cli {
    /// Builds the configuration, resolving relative paths against `cwd`
    fn into_config(self, cwd: &Path) -> Config {
        let absolute = |p: PathBuf| if p.is_absolute() { p } else { cwd.join(p) };

        ConfigBuilder::new()
            .source_root(absolute(self.source))
            .destination_root(absolute(self.destination))
            .interval_ms(self.interval)
            .logging_file(absolute(self.log))
            .logging_level(self.log_level)
            .build()
    }
}

/// Handles a command line clap could not parse
///
/// Help and version requests print and exit normally; everything else is
/// logged as an error.
fn report_usage_error(err: clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => err.exit(),
        _ => {}
    }

    logging::init_console(logging::DEFAULT_LEVEL);
    error!("{}", err.to_string().trim_end());
    ExitCode::from(EXIT_USAGE)
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still works.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Daemon
// ============================================================================

/// Runs the scheduler until `shutdown_token` is cancelled
async fn run(config: Config, shutdown_token: CancellationToken) -> Result<()> {
    info!(
        source = %config.sync.source_root.display(),
        destination = %config.sync.destination_root.display(),
        interval_ms = config.sync.interval_ms,
        "Synchronization started"
    );
    info!(path = %config.logging.file.display(), "Logging to");

    let comparator = TreeComparator::new(Arc::new(LocalFileSystemAdapter::new()));
    let scheduler = SyncScheduler::new(config.sync, comparator, shutdown_token.clone())
        .context("Failed to create sync scheduler")?;
    let stats = scheduler.stats();
    let handle = scheduler.start();

    shutdown_token.cancelled().await;
    handle.stop().await;

    info!(
        passes_completed = stats.passes_completed(),
        passes_failed = stats.passes_failed(),
        "treemirror daemon shut down gracefully"
    );
    Ok(())
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return report_usage_error(err),
    };

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(err) => {
            logging::init_console(&cli.log_level);
            error!(error = %err, "Failed to determine the working directory");
            return ExitCode::FAILURE;
        }
    };
    let config = cli.into_config(&cwd);

    let errors = config.validate();
    if !errors.is_empty() {
        logging::init_console(&config.logging.level);
        for err in &errors {
            error!("Invalid configuration: {err}");
        }
        return ExitCode::from(EXIT_USAGE);
    }

    if let Err(err) = logging::init(&config.logging) {
        logging::init_console(&config.logging.level);
        error!(error = %format!("{err:#}"), "Failed to initialize logging");
        return ExitCode::FAILURE;
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    match run(config, shutdown_token).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "treemirror daemon exiting with error");
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("treemirrord").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_long_flags() {
        let cli = parse(&[
            "--source",
            "/data/source",
            "--destination",
            "/backup/mirror",
            "--interval",
            "60000",
            "--log",
            "/var/log/treemirror.log",
        ])
        .unwrap();

        assert_eq!(cli.source, PathBuf::from("/data/source"));
        assert_eq!(cli.destination, PathBuf::from("/backup/mirror"));
        assert_eq!(cli.interval, 60_000);
        assert_eq!(cli.log, PathBuf::from("/var/log/treemirror.log"));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_parse_short_flags() {
        let cli = parse(&["-s", "src", "-d", "dst", "-i", "500", "-l", "out.log"]).unwrap();
        assert_eq!(cli.source, PathBuf::from("src"));
        assert_eq!(cli.interval, 500);
    }

    #[test]
    fn test_parse_rejects_missing_and_invalid_arguments() {
        let missing = parse(&["-s", "src", "-d", "dst", "-l", "out.log"]).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredArgument);

        let negative = parse(&["-s", "src", "-d", "dst", "-i", "-5", "-l", "out.log"]);
        assert!(negative.is_err());

        let text = parse(&["-s", "src", "-d", "dst", "-i", "soon", "-l", "out.log"]).unwrap_err();
        assert_eq!(text.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_help_is_not_an_error() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_into_config_resolves_relative_paths() {
        let cli = parse(&[
            "-s", "src", "-d", "/abs/dst", "-i", "1000", "-l", "logs/m.log", "--log-level", "debug",
        ])
        .unwrap();
        let config = cli.into_config(Path::new("/work"));

        assert_eq!(config.sync.source_root, PathBuf::from("/work/src"));
        assert_eq!(config.sync.destination_root, PathBuf::from("/abs/dst"));
        assert_eq!(config.sync.interval_ms, 1000);
        assert_eq!(config.logging.file, PathBuf::from("/work/logs/m.log"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_from_cli_validates() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let cli = parse(&["-s", "src", "-d", "mirror", "-i", "250", "-l", "treemirror.log"])
            .unwrap();
        let config = cli.into_config(dir.path());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_config_from_cli_reports_every_problem() {
        let dir = TempDir::new().unwrap();

        let cli = parse(&[
            "-s", "missing", "-d", "mirror", "-i", "0", "-l", "m.log", "--log-level", "loud",
        ])
        .unwrap();
        let errors = cli.into_config(dir.path()).validate();

        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"sync.interval_ms"));
        assert!(fields.contains(&"sync.source_root"));
        assert!(fields.contains(&"logging.level"));
    }

    fn valid_config(dir: &TempDir) -> Config {
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.txt"), b"X").unwrap();

        let cli = parse(&["-s", "src", "-d", "mirror", "-i", "50", "-l", "treemirror.log"])
            .unwrap();
        cli.into_config(dir.path())
    }

    #[tokio::test]
    async fn test_run_returns_after_cancellation() {
        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();

        let daemon = tokio::spawn(run(valid_config(&dir), token.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!daemon.is_finished());

        token.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), daemon)
            .await
            .expect("run did not return after cancellation")
            .unwrap();

        assert!(outcome.is_ok());
        // The first pass fires immediately, so the mirror exists by now.
        assert_eq!(std::fs::read(dir.path().join("mirror/a.txt")).unwrap(), b"X");
    }

    #[tokio::test]
    async fn test_run_with_cancelled_token_returns_immediately() {
        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            run(valid_config(&dir), token),
        )
        .await
        .expect("run did not return");
        assert!(outcome.is_ok());
    }
}
