//! # Logging Setup
//!
//! Installs the global tracing subscriber: a file layer under the configured directory
//! (truncated on start) and a stderr layer when debug output is requested.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::domain::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info,sectionkit=info";
const DEBUG_FILTER: &str = "info,sectionkit=debug";

/// Keep the returned guard alive for the lifetime of the process, or buffered lines are lost.
pub fn init(config: &LoggingConfig, debug: bool) -> Result<WorkerGuard> {
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create log directory {}", directory.display()))?;
    }

    // Start every run with a fresh log
    let log_path = directory.join(&config.file);
    if log_path.exists() {
        let _ = fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(directory, &config.file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let fallback = if debug { DEBUG_FILTER } else { DEFAULT_FILTER };
        EnvFilter::new(config.filter.as_deref().unwrap_or(fallback))
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let console_layer = debug.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
