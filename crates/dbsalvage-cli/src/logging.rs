//! Logging setup for the dbsalvage binary
//!
//! Console output goes to stderr so it never mixes with table output. With a
//! log directory, a daily-rotated JSON log is written as well; long exports
//! leave a record that can be searched afterwards.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for JSON log files, if any
    pub log_dir: Option<PathBuf>,

    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,

    /// Whether to include file/line information in console logs
    pub include_location: bool,
}

impl LoggingConfig {
    /// Console verbosity from the number of `-v` flags
    pub fn from_verbosity(verbose: u8, log_dir: Option<PathBuf>) -> Self {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        Self {
            log_dir,
            default_filter: format!(
                "warn,dbsalvage={level},dbsalvage_extract={level},\
                 dbsalvage_core={level},dbsalvage_drivers={level},dbsalvage_driver_sqlite={level}"
            ),
            include_location: verbose > 1,
        }
    }
}

/// Where JSON logs go when `--log-dir` is given without a directory
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dbsalvage")
        .join("logs")
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for as long as the program logs.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    // RUST_LOG takes precedence over the default filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let mut layers = Vec::new();

    let console_layer = fmt::layer()
        .with_target(config.include_location)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone())
        .boxed();
    layers.push(console_layer);

    let mut guard = None;
    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, "dbsalvage.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            // NEW fires once per span; ENTER would repeat on every poll
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        log_dir = ?config.log_dir,
        filter = %config.default_filter,
        "logging initialized"
    );
    Ok(guard)
}
