//! Tracing subscriber setup.
//!
//! Console output is always on. When `logging.directory` is set, three
//! daily-rolled files are written there as well:
//!
//! - `heartwatch.log`: everything the level filter admits except per-report
//!   lines.
//! - `alerts.log`: liveness alerts only, kept for 30 days.
//! - `reports.log`: one line per accepted heartbeat or event, kept for 7
//!   days.

use std::path::Path;
use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{EnvFilter, LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

use crate::api::REPORT_TARGET;
use crate::config::LoggingConfig;

/// Target used by the liveness alert sink.
const ALERT_TARGET: &str = "heartwatch_liveness::alerts";

const GENERAL_RETENTION_DAYS: usize = 14;
const ALERT_RETENTION_DAYS: usize = 30;
const REPORT_RETENTION_DAYS: usize = 7;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to open log file: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the file writers flushing. Drop it only at process exit.
#[must_use]
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

/// Builds the level filter, falling back to `info` on a bad directive.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn general_filter() -> Targets {
    Targets::new()
        .with_default(LevelFilter::TRACE)
        .with_target(REPORT_TARGET, LevelFilter::OFF)
}

fn alert_filter() -> Targets {
    Targets::new().with_target(ALERT_TARGET, Level::WARN)
}

fn report_filter() -> Targets {
    Targets::new().with_target(REPORT_TARGET, Level::INFO)
}

fn daily_appender(
    dir: &Path,
    file_name: &str,
    retention_days: usize,
) -> Result<RollingFileAppender, LoggingError> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_name)
        .max_log_files(retention_days)
        .build(dir)?)
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// Returns `LoggingError` if the log directory cannot be prepared or a
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let mut guards = Vec::new();

    let console = if config.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let files = match config.directory.as_deref() {
        Some(dir) => {
            let path = Path::new(dir);
            std::fs::create_dir_all(path).map_err(|source| LoggingError::CreateDir {
                path: dir.to_string(),
                source,
            })?;

            let (general, general_guard) = tracing_appender::non_blocking(daily_appender(
                path,
                "heartwatch.log",
                GENERAL_RETENTION_DAYS,
            )?);
            let (alerts, alerts_guard) = tracing_appender::non_blocking(daily_appender(
                path,
                "alerts.log",
                ALERT_RETENTION_DAYS,
            )?);
            let (reports, reports_guard) = tracing_appender::non_blocking(daily_appender(
                path,
                "reports.log",
                REPORT_RETENTION_DAYS,
            )?);
            guards.extend([general_guard, alerts_guard, reports_guard]);

            let general_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(general)
                .with_filter(general_filter());
            let alerts_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(alerts)
                .with_filter(alert_filter());
            let reports_layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(reports)
                .with_filter(report_filter());

            Some(general_layer.and_then(alerts_layer).and_then(reports_layer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(console)
        .with(files)
        .try_init()?;

    Ok(LoggingGuard { _guards: guards })
}
