//! Configuration module for treemirror.
//!
//! Provides the typed configuration resolved from the command line, with
//! validation, defaults, and a builder for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::newtypes::SyncPath;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for treemirror.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Mirroring settings. Immutable for the lifetime of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Root of the tree being mirrored.
    pub source_root: PathBuf,
    /// Root of the mirror; created if absent.
    pub destination_root: PathBuf,
    /// Milliseconds between the starts of two passes.
    pub interval_ms: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Path to the structured log file.
    pub file: PathBuf,
}

impl SyncConfig {
    /// Tick period of the scheduler.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// The source root as a validated absolute path.
    pub fn source(&self) -> Result<SyncPath, crate::domain::DomainError> {
        SyncPath::new(self.source_root.clone())
    }

    /// The destination root as a validated absolute path.
    pub fn destination(&self) -> Result<SyncPath, crate::domain::DomainError> {
        SyncPath::new(self.destination_root.clone())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::new(),
            destination_root: PathBuf::new(),
            interval_ms: 60_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: PathBuf::from("treemirror.log"),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Valid log level strings.
pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration, returning every problem found.
    ///
    /// Besides value ranges this inspects the filesystem: the source root
    /// must be an existing directory and the destination must not be an
    /// existing non-directory.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.interval_ms == 0 {
            errors.push(ValidationError {
                field: "sync.interval_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        let source = validate_root("sync.source_root", &self.sync.source_root, &mut errors);
        let destination = validate_root(
            "sync.destination_root",
            &self.sync.destination_root,
            &mut errors,
        );

        if let Some(source) = &source {
            if !source.as_path().is_dir() {
                errors.push(ValidationError {
                    field: "sync.source_root".into(),
                    message: format!("{source} does not exist or is not a directory"),
                });
            }
        }

        if let Some(destination) = &destination {
            let path = destination.as_path();
            if path.exists() && !path.is_dir() {
                errors.push(ValidationError {
                    field: "sync.destination_root".into(),
                    message: format!("{destination} exists and is not a directory"),
                });
            }
        }

        if let (Some(source), Some(destination)) = (&source, &destination) {
            if source == destination {
                errors.push(ValidationError {
                    field: "sync.destination_root".into(),
                    message: "must differ from the source root".into(),
                });
            } else if destination.starts_with(source) || source.starts_with(destination) {
                errors.push(ValidationError {
                    field: "sync.destination_root".into(),
                    message: format!(
                        "{destination} and {source} must not contain one another"
                    ),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if self.logging.file.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "logging.file".into(),
                message: "must not be empty".into(),
            });
        } else if let (Some(destination), Ok(log_file)) =
            (&destination, SyncPath::new(self.logging.file.clone()))
        {
            // Anything below the destination that is absent from the source
            // is deleted on the next pass.
            if log_file.starts_with(destination) {
                errors.push(ValidationError {
                    field: "logging.file".into(),
                    message: format!("{log_file} must not be inside the destination root"),
                });
            }
        }

        errors
    }
}

fn validate_root(field: &str, path: &Path, errors: &mut Vec<ValidationError>) -> Option<SyncPath> {
    if path.as_os_str().is_empty() {
        errors.push(ValidationError {
            field: field.into(),
            message: "must not be empty".into(),
        });
        return None;
    }

    match SyncPath::new(path.to_path_buf()) {
        Ok(p) => Some(p),
        Err(e) => {
            errors.push(ValidationError {
                field: field.into(),
                message: e.to_string(),
            });
            None
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use treemirror_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .source_root(PathBuf::from("/data/photos"))
///     .destination_root(PathBuf::from("/mnt/backup/photos"))
///     .interval_ms(5_000)
///     .logging_file(PathBuf::from("/var/log/treemirror.log"))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn source_root(mut self, root: PathBuf) -> Self {
        self.config.sync.source_root = root;
        self
    }

    pub fn destination_root(mut self, root: PathBuf) -> Self {
        self.config.sync.destination_root = root;
        self
    }

    pub fn interval_ms(mut self, millis: u64) -> Self {
        self.config.sync.interval_ms = millis;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = file;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
