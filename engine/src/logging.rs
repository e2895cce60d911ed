//! Logging Initialization
//!
//! Installs a global `tracing` subscriber with a stdout layer and an optional
//! daily-rolling file layer.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_subscriber::prelude::*;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Log file name prefix inside the log directory
pub const LOG_FILE_PREFIX: &str = "kitgen.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is not set
    pub default_level: tracing::Level,
    /// Directory for rolling log files (None = stdout only)
    pub log_dir: Option<PathBuf>,
    /// Use ANSI colors on stdout
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: tracing::Level::INFO,
            log_dir: None,
            ansi: cfg!(debug_assertions),
        }
    }
}

impl LogConfig {
    /// Enables the rolling file layer
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Sets the default level
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.default_level = level;
        self
    }
}

/// Installs the global subscriber.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(config: LogConfig) {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.default_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(config.ansi);

    // Log to file for production debugging when a directory is configured.
    let file_layer = config.log_dir.as_ref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory {}: {}", dir.display(), e);
            return None;
        }
        let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer);

    // Avoid panics if already initialized (tests, repeated CLI setup).
    let _ = tracing::subscriber::set_global_default(subscriber);
}
