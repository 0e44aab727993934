//! Tracing setup
//!
//! Console output plus a daily log file under `LogConfig::dir`. The returned
//! [`LogGuard`] owns the background file writer and must live until exit.

use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogConfig;
use crate::error::{CollectorError, Result};

/// Keeps the non-blocking file writer flushing until dropped
pub struct LogGuard {
    _file: WorkerGuard,
}

/// Output format for both console and file layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Build the default filter directive for a level name
///
/// Dependencies stay at `warn` unless the collector itself runs at `trace`.
pub fn filter_directive(level: &str) -> String {
    let level = match level.to_lowercase().as_str() {
        "trace" => return "trace".to_string(),
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };
    format!("warn,bio_collector={level}")
}

/// Initialize the global subscriber from an explicit configuration
pub fn init(config: &LogConfig) -> Result<LogGuard> {
    fs::create_dir_all(&config.dir)?;

    let file_appender = tracing_appender::rolling::daily(&config.dir, &config.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.level)));

    let (console, file) = match LogFormat::from_str(&config.format) {
        LogFormat::Json => (
            fmt::layer().json().boxed(),
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(file_writer)
                .boxed(),
        ),
        LogFormat::Pretty => (
            fmt::layer().with_target(false).boxed(),
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer)
                .boxed(),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| CollectorError::Internal(format!("logging already initialized: {}", e)))?;

    tracing::info!(dir = %config.dir.display(), prefix = %config.file_prefix, "Logging started");

    Ok(LogGuard { _file: guard })
}
