/// Daily gas consumption export reader
///
/// Semicolon separated, comma decimal, ISO-8859-1. The file opens with a
/// fixed preamble (3 raw lines) followed by a header block (5 non-blank
/// lines); data rows follow as `DD/MM/YYYY;<reading>;...`.
///
/// A reading covers a whole day, so its timestamp is moved to noon. That
/// keeps date-range filters and joins with sub-daily series meaningful.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::ingest::{locate_export, read_latin1};
use crate::logging::{Diagnostics, Stage};
use crate::model::{ConsoError, DAILY_READING_OFFSET_HOURS, Result};
use crate::table::Table;
use crate::timefmt::parse_dmy;

pub const DEFAULT_FNAME_GLOB: &str = "ma-conso-quotidienne-*.csv";
pub const DEFAULT_VARIABLE_NAME: &str = "Gas (m3)";

/// Raw lines skipped before anything else.
const PREAMBLE_LINES: usize = 3;
/// Non-blank lines forming the header block after the preamble.
const HEADER_LINES: usize = 5;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GasSource {
    pub dir_path: PathBuf,
    #[serde(default = "default_fname_glob")]
    pub fname_glob: String,
    #[serde(default = "default_variable_name")]
    pub variable_name: String,
}

fn default_fname_glob() -> String {
    DEFAULT_FNAME_GLOB.to_string()
}

fn default_variable_name() -> String {
    DEFAULT_VARIABLE_NAME.to_string()
}

impl GasSource {
    pub fn new(dir_path: impl Into<PathBuf>) -> Self {
        GasSource {
            dir_path: dir_path.into(),
            fname_glob: default_fname_glob(),
            variable_name: default_variable_name(),
        }
    }
}

pub fn read(src: &GasSource, diag: &mut Diagnostics) -> Result<Table> {
    diag.info(Stage::Read, format!("Reading data from {}", src.dir_path.display()));
    let path = locate_export(&src.dir_path, &src.fname_glob, diag)?;
    let content = read_latin1(&path)?;
    parse_export(&content, &src.variable_name, &path)
}

/// Parse export content into a one-column table indexed at noon.
pub fn parse_export(content: &str, variable_name: &str, path: &Path) -> Result<Table> {
    let body: String = content
        .lines()
        .skip(PREAMBLE_LINES)
        .filter(|line| !line.trim().is_empty())
        .skip(HEADER_LINES)
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let first_data_line = PREAMBLE_LINES + HEADER_LINES + 1;
    let mut index: Vec<NaiveDateTime> = Vec::new();
    let mut readings: Vec<Option<f64>> = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let line = Some(first_data_line + i);
        let record = record.map_err(|e| ConsoError::format(path, line, e.to_string()))?;

        let date_field = record.get(0).unwrap_or("");
        let date = parse_dmy(date_field)
            .ok_or_else(|| ConsoError::format(path, line, format!("invalid date '{}'", date_field)))?;

        let reading = match record.get(1).map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.replace(',', ".")
                    .parse::<f64>()
                    .map_err(|_| ConsoError::format(path, line, format!("invalid reading '{}'", raw)))?,
            ),
        };

        index.push(date.and_time(NaiveTime::MIN));
        readings.push(reading);
    }

    let table = Table::single(index, variable_name, readings)?;
    Ok(table.shift_index(Duration::hours(DAILY_READING_OFFSET_HOURS)))
}

// ============================================================================
// Tests
// ============================================================================
