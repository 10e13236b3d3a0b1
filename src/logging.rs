//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

const LOG_FILE_PREFIX: &str = "ojsandbox.log";

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "ojsandbox=debug"
    } else {
        "ojsandbox=info"
    }
}

/// Installs the global subscriber. Console output goes to stderr so command
/// output on stdout stays clean.
///
/// `RUST_LOG` overrides the verbosity flag. When a log directory is
/// configured, the returned guard must be kept alive so buffered lines are
/// flushed on exit.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let (file_writer, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let installed = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(file_writer.map(|w| fmt::layer().json().with_writer(w)))
            .try_init(),
    };
    installed.context("Failed to install tracing subscriber")?;

    Ok(guard)
}
