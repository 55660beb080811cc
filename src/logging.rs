/// Diagnostics channel for the consumption pipeline
///
/// Every stage receives a `&mut Diagnostics` and records the anomalies it
/// tolerated (skipped rows, thin partitions, ...) together with progress
/// messages. The records are returned to the caller with the run output and
/// are also forwarded to the `tracing` facade, so a binary that installs a
/// subscriber sees them live. The library never installs one itself.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
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

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Read,
    Merge,
    Filter,
    Aggregate,
    Correlate,
    Inspect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Read => write!(f, "READ"),
            Stage::Merge => write!(f, "MERGE"),
            Stage::Filter => write!(f, "FILTER"),
            Stage::Aggregate => write!(f, "AGG"),
            Stage::Correlate => write!(f, "CORR"),
            Stage::Inspect => write!(f, "INSPECT"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub level: LogLevel,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.level, self.stage, self.message)
    }
}

/// Ordered collection of diagnostics for one run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message and forward it to `tracing`.
    pub fn record(&mut self, level: LogLevel, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(stage = %stage, "{}", message),
            LogLevel::Info => tracing::info!(stage = %stage, "{}", message),
            LogLevel::Warning => tracing::warn!(stage = %stage, "{}", message),
            LogLevel::Error => tracing::error!(stage = %stage, "{}", message),
        }
        self.records.push(Diagnostic {
            level,
            stage,
            message,
        });
    }

    pub fn debug(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(LogLevel::Debug, stage, message);
    }

    pub fn info(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(LogLevel::Info, stage, message);
    }

    pub fn warn(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(LogLevel::Warning, stage, message);
    }

    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    /// Records at or above `min_level`.
    pub fn at_least(&self, min_level: LogLevel) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(move |d| d.level >= min_level)
    }

    /// True if any record at or above `min_level` contains `needle`.
    pub fn contains(&self, min_level: LogLevel, needle: &str) -> bool {
        self.at_least(min_level).any(|d| d.message.contains(needle))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of rows skipped while reading or aggregating.
///
/// Nothing skipped is informational, partial skipping is a warning, losing
/// every row is an error-level record (the caller decides whether an empty
/// result is fatal).
pub fn log_skip_summary(diag: &mut Diagnostics, stage: Stage, what: &str, total: usize, skipped: usize) {
    let message = format!(
        "{}: {}/{} kept, {} skipped",
        what,
        total - skipped.min(total),
        total,
        skipped
    );

    if skipped == 0 {
        diag.info(stage, message);
    } else if skipped >= total {
        diag.record(LogLevel::Error, stage, message);
    } else {
        diag.warn(stage, message);
    }
}

/// Install a `tracing` subscriber for command-line use.
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init_logger(default_level: LogLevel) {
    let level = match default_level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warning => "warn",
        LogLevel::Error => "error",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
