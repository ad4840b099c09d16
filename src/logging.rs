//! Logging setup for labrun.
//!
//! Every run logs to the console and to daily-rolling files, so the stage
//! trail of an experiment can be read back after the fact.
//!
//! - `labrun.<date>.log`: everything passing the env filter
//! - `error.<date>.log`: warnings and errors only
//!
//! The filter defaults to `info` and can be overridden with `RUST_LOG`.
//!
//! ## Usage
//!
//! ```no_run
//! use labrun::logging;
//!
//! // Initialize once at startup; `None` uses the platform data directory
//! let log_dir = logging::init(None).expect("Failed to initialize logging");
//!
//! tracing::info!(dir = %log_dir.display(), "Run started");
//! ```

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const LOG_PREFIX: &str = "labrun";

/// Default log directory, following platform conventions:
///
/// - Windows: `%APPDATA%/labrun/logs`
/// - macOS: `~/Library/Application Support/labrun/logs`
/// - Linux: `~/.local/share/labrun/logs`
///
/// # Errors
///
/// Returns an error if the platform has no data directory.
pub fn default_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(base_dir.join(LOG_PREFIX).join("logs"))
}

/// Resolves the log directory (`requested` or [`default_log_dir`]) and creates it.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn prepare_log_dir(requested: Option<&Path>) -> Result<PathBuf> {
    let log_dir = match requested {
        Some(dir) => dir.to_path_buf(),
        None => default_log_dir()?,
    };
    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }
    Ok(log_dir)
}

/// Installs the global subscriber: pretty console output plus the two rolling
/// files. Returns the directory the files are written to.
///
/// # Errors
///
/// Returns an error if the log directory or a file appender cannot be created.
pub fn init(requested_dir: Option<&Path>) -> Result<PathBuf> {
    let log_dir = prepare_log_dir(requested_dir)?;

    let all_logs_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create all-logs file appender")?;

    let error_logs_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix("error")
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create error-logs file appender")?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")?;

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_line_number(false)
        .with_file(false)
        .pretty();

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_logs_appender);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_logs_appender)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("A global logger is already installed")?;

    tracing::info!(log_dir = %log_dir.display(), "Logging initialized");
    Ok(log_dir)
}

/// Path of today's main log file in `log_dir`.
pub fn current_log_path(log_dir: &Path) -> PathBuf {
    let today = chrono::Local::now().format("%Y-%m-%d");
    log_dir.join(format!("{LOG_PREFIX}.{today}.log"))
}
