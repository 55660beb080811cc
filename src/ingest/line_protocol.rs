/// Line-protocol dump reader
///
/// Syntax of a data line:
///
/// ```text
/// <measurement>[,<tags>] <field_key>=<field_value>[,<field_key>=<field_value>] <timestamp>
/// ```
///
/// The dump opens with a 7-line preamble (export banner, DDL and context
/// comments) and may contain further `#` comments. Timestamps are
/// nanoseconds since the Unix epoch. Measurement and tags are ignored:
/// every field key becomes a column, the per-field series are outer-joined
/// on timestamp and the result is averaged per minute to even out
/// irregular write times.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

use crate::ingest::{read_utf8, require_file};
use crate::logging::{Diagnostics, Stage};
use crate::model::{Aggregator, ConsoError, Result};
use crate::resample::Frequency;
use crate::table::{Keep, Table};

/// Lines written by the exporter before the first data line.
const PREAMBLE_LINES: usize = 7;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineProtocolSource {
    pub file_path: PathBuf,
}

impl LineProtocolSource {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        LineProtocolSource {
            file_path: file_path.into(),
        }
    }
}

pub fn read(src: &LineProtocolSource, diag: &mut Diagnostics) -> Result<Table> {
    require_file(&src.file_path)?;
    diag.info(Stage::Read, format!("Reading data from {}", src.file_path.display()));
    let content = read_utf8(&src.file_path)?;
    let table = parse_dump(&content, &src.file_path, diag)?;
    diag.info(
        Stage::Read,
        format!("{} one-minute rows, columns {:?}", table.len(), table.column_names()),
    );
    Ok(table)
}

/// Parse a dump into a one-minute mean table, one column per field key.
pub fn parse_dump(content: &str, path: &Path, diag: &mut Diagnostics) -> Result<Table> {
    // Field keys in order of first appearance, each with its own series.
    let mut keys: Vec<String> = Vec::new();
    let mut series: HashMap<String, (Vec<NaiveDateTime>, Vec<Option<f64>>)> = HashMap::new();
    let mut unsupported = 0;

    for (i, raw) in content.lines().enumerate().skip(PREAMBLE_LINES) {
        let line_no = Some(i + 1);
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.len() < 3 {
            return Err(ConsoError::format(
                path,
                line_no,
                "expected '<measurement> <fields> <timestamp>'",
            ));
        }
        let fields = tokens[1];
        let timestamp = parse_timestamp_ns(tokens[2])
            .ok_or_else(|| ConsoError::format(path, line_no, format!("invalid timestamp '{}'", tokens[2])))?;

        for field in fields.split(',') {
            let (key, raw_value) = field
                .split_once('=')
                .ok_or_else(|| ConsoError::format(path, line_no, format!("invalid field '{}'", field)))?;

            let Some(value) = parse_field_value(raw_value) else {
                diag.debug(Stage::Read, format!("Non-numeric field '{}' on line {}", field, i + 1));
                unsupported += 1;
                continue;
            };

            let entry = series.entry(key.to_string()).or_insert_with(|| {
                keys.push(key.to_string());
                (Vec::new(), Vec::new())
            });
            entry.0.push(timestamp);
            entry.1.push(Some(value));
        }
    }

    if unsupported > 0 {
        diag.warn(Stage::Read, format!("{} non-numeric fields skipped", unsupported));
    }

    let mut combined = Table::new();
    for key in &keys {
        let Some((index, values)) = series.remove(key) else {
            continue;
        };
        let field_table = Table::single(index, key.as_str(), values)?;
        let duplicates = field_table.duplicate_count();
        if duplicates > 0 {
            diag.warn(
                Stage::Read,
                format!("{} repeated timestamps for field '{}', keeping last", duplicates, key),
            );
        }
        let field_table = field_table.drop_duplicate_index(Keep::Last);
        combined = if combined.is_empty() {
            field_table.sort_by_index()
        } else {
            combined.outer_join(&field_table)
        };
    }

    Ok(combined.resample(&Frequency::minutes(1), Aggregator::Mean))
}

fn parse_timestamp_ns(s: &str) -> Option<NaiveDateTime> {
    let ns: i64 = s.trim().parse().ok()?;
    Some(DateTime::from_timestamp_nanos(ns).naive_utc())
}

/// Floats, and integers with their `i`/`u` suffix. Strings and booleans
/// have no place in a numeric table.
fn parse_field_value(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let number = raw
        .strip_suffix('i')
        .or_else(|| raw.strip_suffix('u'))
        .unwrap_or(raw);
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// Tests
// ============================================================================
