//! Structured logging for the flood map pipeline.
//!
//! Thin layer over `tracing`: every event carries the pipeline stage that
//! produced it and, where there is one, the input file it concerns. Output
//! goes to stderr and optionally to an append-only log file for batch runs.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use serde::Deserialize;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::ingest::tabular::IngestStats;
use crate::model::{IngestError, OverlayError, RowDrop};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Tabular,
    Overlay,
    Output,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Tabular => write!(f, "TAB"),
            Stage::Overlay => write!(f, "KMZ"),
            Stage::Output => write!(f, "OUT"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - nothing to do this run, the caller decides what next
    Expected,
    /// Unexpected failure - broken input or a filesystem problem
    Unexpected,
    /// Unknown - possibly a new source schema rather than a broken file
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `min_level` when set. Calling this more
/// than once keeps the first subscriber; only a log file that cannot be
/// opened is reported as an error.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&Path>,
    console_timestamps: bool,
) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.as_filter()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    if console_timestamps {
        layers.push(console.with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string())).boxed());
    } else {
        layers.push(console.without_time().boxed());
    }

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
                .boxed(),
        );
    }

    // Already initialised: keep the existing subscriber.
    let _ = tracing_subscriber::registry().with(layers).with(filter).try_init();
    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

macro_rules! stage_event {
    ($level:expr, $stage:expr, $file:expr, $message:expr) => {
        match $file {
            Some(file) => tracing::event!($level, stage = %$stage, file = file, "{}", $message),
            None => tracing::event!($level, stage = %$stage, "{}", $message),
        }
    };
}

/// Log a general informational message
pub fn info(stage: Stage, file: Option<&str>, message: &str) {
    stage_event!(tracing::Level::INFO, stage, file, message);
}

/// Log a warning message
pub fn warn(stage: Stage, file: Option<&str>, message: &str) {
    stage_event!(tracing::Level::WARN, stage, file, message);
}

/// Log an error message
pub fn error(stage: Stage, file: Option<&str>, message: &str) {
    stage_event!(tracing::Level::ERROR, stage, file, message);
}

/// Log a debug message
pub fn debug(stage: Stage, file: Option<&str>, message: &str) {
    stage_event!(tracing::Level::DEBUG, stage, file, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a tabular ingestion failure
pub fn classify_ingest_failure(err: &IngestError) -> FailureType {
    match err {
        IngestError::NoInput { .. } => FailureType::Expected,
        // A header we do not know yet looks the same as a broken export.
        IngestError::MissingColumn { .. } | IngestError::MalformedFile { .. } => FailureType::Unknown,
        IngestError::Io { .. } | IngestError::Output { .. } => FailureType::Unexpected,
    }
}

/// Classify an overlay extraction failure
pub fn classify_overlay_failure(err: &OverlayError) -> FailureType {
    match err {
        OverlayError::NotFound { what: "archive", .. } => FailureType::Unknown,
        OverlayError::NotFound { .. } | OverlayError::MalformedArchive { .. } | OverlayError::Io { .. } => {
            FailureType::Unexpected
        }
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a tabular failure with automatic classification
pub fn log_ingest_failure(file: Option<&str>, operation: &str, err: &IngestError) {
    let failure_type = classify_ingest_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Stage::Tabular, file, &message),
        FailureType::Unexpected => error(Stage::Tabular, file, &message),
        FailureType::Unknown => warn(Stage::Tabular, file, &message),
    }
}

/// Log an overlay failure with automatic classification
pub fn log_overlay_failure(archive: &Path, operation: &str, err: &OverlayError) {
    let failure_type = classify_overlay_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);
    let archive = archive.display().to_string();

    match failure_type {
        FailureType::Expected => debug(Stage::Overlay, Some(&archive), &message),
        FailureType::Unexpected => error(Stage::Overlay, Some(&archive), &message),
        FailureType::Unknown => warn(Stage::Overlay, Some(&archive), &message),
    }
}

/// Log a single dropped row. Drops are routine, so this stays at debug.
pub fn log_row_drop(file: &str, row: usize, reason: RowDrop) {
    debug(Stage::Tabular, Some(file), &format!("row {} dropped: {}", row, reason));
}

// ---------------------------------------------------------------------------
// Ingest Summary Logging
// ---------------------------------------------------------------------------

pub fn summary_line(stats: &IngestStats) -> String {
    format!(
        "Ingest complete: {}/{} rows kept, {} dropped ({} coordinates, {} depth), {} files skipped",
        stats.rows_kept,
        stats.rows_read,
        stats.rows_dropped(),
        stats.dropped_coordinates,
        stats.dropped_depth,
        stats.files_skipped
    )
}

/// Log a summary of one ingestion run
pub fn log_ingest_summary(stats: &IngestStats) {
    let message = summary_line(stats);

    if stats.rows_kept == 0 {
        error(Stage::Tabular, None, &message);
    } else if stats.rows_dropped() > 0 || stats.files_skipped > 0 {
        warn(Stage::Tabular, None, &message);
    } else {
        info(Stage::Tabular, None, &message);
    }
}
