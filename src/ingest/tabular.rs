/// Generic delimited-file reader.
///
/// One column holds the timestamps (by header name or position, first
/// column by default); every other numeric column is passed through
/// unchanged. Empty cells are missing values.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::ingest::{read_utf8, require_file};
use crate::logging::{Diagnostics, Stage};
use crate::model::{ConsoError, Result};
use crate::table::{Column, Table};
use crate::timefmt::parse_timestamp;

/// Which column is the time index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IndexColumn {
    Position(usize),
    Name(String),
}

impl Default for IndexColumn {
    fn default() -> Self {
        IndexColumn::Position(0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TabularSource {
    pub file_path: PathBuf,
    #[serde(default)]
    pub index_col: IndexColumn,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

impl TabularSource {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        TabularSource {
            file_path: file_path.into(),
            index_col: IndexColumn::default(),
            delimiter: default_delimiter(),
        }
    }
}

pub fn read(src: &TabularSource, diag: &mut Diagnostics) -> Result<Table> {
    require_file(&src.file_path)?;
    diag.info(Stage::Read, format!("Reading data from {}", src.file_path.display()));
    let content = read_utf8(&src.file_path)?;
    parse_table(&content, src, &src.file_path, diag)
}

pub fn parse_table(content: &str, src: &TabularSource, path: &Path, diag: &mut Diagnostics) -> Result<Table> {
    if !src.delimiter.is_ascii() {
        return Err(ConsoError::Configuration(format!(
            "delimiter '{}' must be a single ASCII character",
            src.delimiter
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(src.delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ConsoError::format(path, Some(1), format!("unreadable header: {}", e)))?
        .clone();

    let index_pos = match &src.index_col {
        IndexColumn::Position(p) if *p < headers.len() => *p,
        IndexColumn::Position(p) => {
            return Err(ConsoError::format(
                path,
                Some(1),
                format!("index column {} out of range ({} columns)", p, headers.len()),
            ));
        }
        IndexColumn::Name(name) => headers.iter().position(|h| h == name).ok_or_else(|| {
            ConsoError::format(path, Some(1), format!("index column '{}' not in header", name))
        })?,
    };

    let value_positions: Vec<usize> = (0..headers.len()).filter(|&p| p != index_pos).collect();
    let mut index: Vec<NaiveDateTime> = Vec::new();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); value_positions.len()];

    for (i, record) in reader.records().enumerate() {
        let line = Some(i + 2);
        let record = record.map_err(|e| ConsoError::format(path, line, e.to_string()))?;
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }

        let raw_ts = record.get(index_pos).unwrap_or("");
        let ts = parse_timestamp(raw_ts)
            .ok_or_else(|| ConsoError::format(path, line, format!("invalid timestamp '{}'", raw_ts)))?;
        index.push(ts);

        for (slot, &pos) in value_positions.iter().enumerate() {
            cells[slot].push(record.get(pos).unwrap_or("").to_string());
        }
    }

    let mut columns = Vec::with_capacity(value_positions.len());
    for (slot, &pos) in value_positions.iter().enumerate() {
        let name = headers.get(pos).unwrap_or("").to_string();
        match parse_numeric(&cells[slot]) {
            Some(values) => columns.push(Column::new(name, values)),
            None => diag.warn(
                Stage::Read,
                format!("Column '{}' in {} is not numeric, dropped", name, path.display()),
            ),
        }
    }

    Table::from_columns(index, columns)
        .map_err(|e| ConsoError::format(path, None, e.to_string()))
}

/// `None` when a non-empty cell is not a number.
fn parse_numeric(cells: &[String]) -> Option<Vec<Option<f64>>> {
    cells
        .iter()
        .map(|cell| {
            if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
                Some(None)
            } else {
                cell.parse::<f64>().ok().map(Some)
            }
        })
        .collect()
}
