/// Core data types for the consumption pipeline.
///
/// This module defines the shared output model imported by the aggregation
/// and correlation stages, the aggregation functions, and the crate-wide
/// error type. The canonical table itself lives in `table`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Unit conversions
// ---------------------------------------------------------------------------

/// Electricity exports report the mean power over each half hour in watts.
/// Energy in kWh = W * 0.5 h / 1000.
pub const KWH_PER_WATT_HALF_HOUR: f64 = 0.0005;

/// Daily gas readings are re-centered on noon.
pub const DAILY_READING_OFFSET_HOURS: i64 = 12;

// ---------------------------------------------------------------------------
// Aggregation functions
// ---------------------------------------------------------------------------

/// How a group of values (a resampling bucket, an hour-of-day slot, ...)
/// is collapsed into one number.
///
/// Missing values are ignored. On an empty group `Sum` and `Count` yield
/// `0.0`, everything else yields a missing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregator {
    Sum,
    #[default]
    Mean,
    Median,
    Min,
    Max,
    Count,
    First,
    Last,
}

impl Aggregator {
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        match self {
            Aggregator::Sum => Some(values.iter().sum()),
            Aggregator::Count => Some(values.len() as f64),
            _ if values.is_empty() => None,
            Aggregator::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregator::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Some(sorted[mid])
                }
            }
            Aggregator::Min => values.iter().copied().reduce(f64::min),
            Aggregator::Max => values.iter().copied().reduce(f64::max),
            Aggregator::First => values.first().copied(),
            Aggregator::Last => values.last().copied(),
        }
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregator::Sum => "sum",
            Aggregator::Mean => "mean",
            Aggregator::Median => "median",
            Aggregator::Min => "min",
            Aggregator::Max => "max",
            Aggregator::Count => "count",
            Aggregator::First => "first",
            Aggregator::Last => "last",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------------------------------------------------------
// Aggregated output
// ---------------------------------------------------------------------------

/// The synthetic axis a `SeriesSet` is indexed by.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Axis {
    /// Days since January 1st of `reference_year` (0-based).
    DayOfYear { reference_year: i32 },
    /// Fractional hour of the day in [0, 24].
    HourOfDay,
    /// Fractional day of the week in [0, 7], Monday = 0.
    DayOfWeek,
    /// Values of another variable (scatter plots).
    Variable { name: String },
}

/// How a caller is expected to draw a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStyle {
    Line,
    /// Step drawn around the mid point of each x value.
    Step,
    Scatter,
}

/// One labeled curve of a `SeriesSet`. `None` marks a gap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub style: SeriesStyle,
    pub points: Vec<(f64, Option<f64>)>,
}

impl Series {
    pub fn line(label: impl Into<String>, points: Vec<(f64, Option<f64>)>) -> Self {
        Series {
            label: label.into(),
            style: SeriesStyle::Line,
            points,
        }
    }

    /// Number of points carrying a value.
    pub fn value_count(&self) -> usize {
        self.points.iter().filter(|(_, y)| y.is_some()).count()
    }

    pub fn value_at(&self, x: f64) -> Option<f64> {
        self.points
            .iter()
            .find(|(px, _)| (px - x).abs() < 1e-9)
            .and_then(|(_, y)| *y)
    }
}

/// A labeled collection of series produced by one aggregation or
/// correlation request, consumed by rendering/export callers.
///
/// The title is unique per variable and request kind; uniqueness across a
/// whole run is the caller's business.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSet {
    pub title: String,
    pub x_axis: Axis,
    pub y_label: String,
    pub series: Vec<Series>,
}

impl SeriesSet {
    pub fn find(&self, label: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.label == label)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that abort a pipeline run.
///
/// Isolated bad rows and thin partitions are not errors: they are recorded
/// in `logging::Diagnostics` and skipped.
#[derive(Debug, thiserror::Error)]
pub enum ConsoError {
    /// A declared path or glob does not resolve to an existing file.
    #[error("source not found: {} ({hint})", path.display())]
    SourceNotFound { path: PathBuf, hint: String },

    /// File content does not follow the reader's grammar.
    #[error("format error in {}{}: {message}", path.display(), line.map(|l| format!(" line {}", l)).unwrap_or_default())]
    SourceFormat {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    /// A requested variable is not a column of the table.
    #[error("variable '{name}' not found in data, possible options: {available:?}")]
    UnknownVariable { name: String, available: Vec<String> },

    /// Unrecognized module, option or option value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Column lengths or names violate the table invariants.
    #[error("invalid table: {0}")]
    InvalidTable(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Any of the above, tagged with the pipeline step it came from.
    #[error("step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<ConsoError>,
    },
}

impl ConsoError {
    pub fn format(path: impl Into<PathBuf>, line: Option<usize>, message: impl Into<String>) -> Self {
        ConsoError::SourceFormat {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// The underlying error, looking through `Step` wrappers.
    pub fn root(&self) -> &ConsoError {
        match self {
            ConsoError::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T, E = ConsoError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
