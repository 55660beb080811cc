/// Half-hourly electricity export reader
///
/// The export alternates date marker lines and time marker lines:
///
/// ```text
/// 01/01/2021;Puissance atteinte (W);
/// 00:30:00;420;Réelle
/// 01:00:00;380;Réelle
/// ```
///
/// Power is the mean over the half hour ending at the time marker, in
/// watts. Only entries on the half-hour grid are kept: the export contains
/// entries at irregular times (always in the same part of the year) and
/// misses some intervals, neither of which is explained by the vendor.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::ingest::{locate_export, read_latin1};
use crate::logging::{Diagnostics, Stage, log_skip_summary};
use crate::model::{ConsoError, KWH_PER_WATT_HALF_HOUR, Result};
use crate::table::{Keep, Table};

pub const DEFAULT_FNAME_GLOB: &str = "mes-puissances-atteintes-30min-*.csv";
pub const DEFAULT_VARIABLE_NAME: &str = "Electricity (kWh)";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElectricitySource {
    /// Directory holding the export.
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

impl ElectricitySource {
    pub fn new(dir_path: impl Into<PathBuf>) -> Self {
        ElectricitySource {
            dir_path: dir_path.into(),
            fname_glob: default_fname_glob(),
            variable_name: default_variable_name(),
        }
    }
}

/// Locate and parse the export.
pub fn read(src: &ElectricitySource, diag: &mut Diagnostics) -> Result<Table> {
    diag.info(Stage::Read, format!("Reading data from {}", src.dir_path.display()));
    let path = locate_export(&src.dir_path, &src.fname_glob, diag)?;
    let content = read_latin1(&path)?;
    parse_export(&content, &src.variable_name, &path, diag)
}

/// Parse export content into a one-column table of kWh per half hour.
///
/// Duplicate timestamps (present in real exports) keep the last entry.
pub fn parse_export(
    content: &str,
    variable_name: &str,
    path: &Path,
    diag: &mut Diagnostics,
) -> Result<Table> {
    let mut current_date: Option<NaiveDate> = None;
    let mut timestamps: Vec<NaiveDateTime> = Vec::new();
    let mut energy: Vec<Option<f64>> = Vec::new();
    let mut entries = 0;
    let mut skipped = 0;

    for (i, raw) in content.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        let first_field = line.split(';').next().unwrap_or("");

        if line.contains('/') {
            let date = crate::timefmt::parse_dmy(first_field).ok_or_else(|| {
                ConsoError::format(path, Some(line_no), format!("invalid date marker '{}'", first_field))
            })?;
            current_date = Some(date);
        } else if line.contains(':') {
            entries += 1;
            let mut fields = line.split(';');
            let time_field = fields.next().unwrap_or("");
            let watts_field = fields.next().ok_or_else(|| {
                ConsoError::format(path, Some(line_no), "time marker line without a power value")
            })?;

            let (hh, mm, ss) = parse_hms(time_field).ok_or_else(|| {
                ConsoError::format(path, Some(line_no), format!("invalid time marker '{}'", time_field))
            })?;
            if !(mm == 0 || mm == 30) || ss != 0 {
                diag.debug(Stage::Read, format!("Strange entry detected: {}", line));
                skipped += 1;
                continue;
            }

            let date = current_date.ok_or_else(|| {
                ConsoError::format(path, Some(line_no), "time marker before any date marker")
            })?;
            let time = NaiveTime::from_hms_opt(hh, mm, ss).ok_or_else(|| {
                ConsoError::format(path, Some(line_no), format!("invalid time marker '{}'", time_field))
            })?;
            let watts: f64 = watts_field.trim().parse().map_err(|_| {
                ConsoError::format(path, Some(line_no), format!("invalid power value '{}'", watts_field))
            })?;

            timestamps.push(date.and_time(time));
            energy.push(Some(watts * KWH_PER_WATT_HALF_HOUR));
        }
    }

    if entries > 0 {
        log_skip_summary(diag, Stage::Read, "off-grid electricity entries", entries, skipped);
    }

    let table = Table::single(timestamps, variable_name, energy)?;
    let duplicates = table.duplicate_count();
    if duplicates > 0 {
        diag.warn(
            Stage::Read,
            format!("{} duplicate timestamps in {}, keeping last", duplicates, path.display()),
        );
    }
    Ok(table.drop_duplicate_index(Keep::Last))
}

fn parse_hms(s: &str) -> Option<(u32, u32, u32)> {
    let mut parts = s.trim().split(':');
    let hh = parts.next()?.parse().ok()?;
    let mm = parts.next()?.parse().ok()?;
    let ss = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((hh, mm, ss))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;

    fn parse(content: &str) -> (Result<Table>, Diagnostics) {
        let mut diag = Diagnostics::new();
        let result = parse_export(content, DEFAULT_VARIABLE_NAME, Path::new("elec.csv"), &mut diag);
        (result, diag)
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn assert_close(actual: &[Option<f64>], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            let a = a.expect("value should be present");
            assert!((a - e).abs() < 1e-12, "expected {}, got {}", e, a);
        }
    }

    #[test]
    fn test_off_grid_entry_skipped_and_on_grid_converted() {
        let content = "Récapitulatif de mes puissances atteintes en W;;\n\
                       01/01/2021;;\n\
                       08:15:00;120;X\n\
                       08:30:00;120;X\n";
        let (table, diag) = parse(content);
        let table = table.unwrap();

        assert_eq!(table.index(), &[at(2021, 1, 1, 8, 30)]);
        let value = table.column(DEFAULT_VARIABLE_NAME).unwrap()[0].unwrap();
        assert!((value - 0.06).abs() < 1e-12, "120 W over 30 min is 0.06 kWh, got {}", value);
        assert!(diag.contains(LogLevel::Debug, "Strange entry detected: 08:15:00;120;X"));
        assert!(diag.contains(LogLevel::Warning, "1 skipped"));
    }

    #[test]
    fn test_non_zero_seconds_are_skipped() {
        let (table, _) = parse("01/01/2021;;\n08:30:10;100;X\n09:00:00;100;X\n");
        assert_eq!(table.unwrap().index(), &[at(2021, 1, 1, 9, 0)]);
    }

    #[test]
    fn test_dates_switch_between_blocks() {
        let content = "01/01/2021;;\n23:30:00;200;X\n02/01/2021;;\n00:00:00;400;X\n";
        let table = parse(content).0.unwrap();
        assert_eq!(table.index(), &[at(2021, 1, 1, 23, 30), at(2021, 1, 2, 0, 0)]);
        assert_close(table.column(DEFAULT_VARIABLE_NAME).unwrap(), &[0.1, 0.2]);
    }

    #[test]
    fn test_duplicates_keep_last() {
        let content = "01/01/2021;;\n08:30:00;100;X\n08:30:00;300;X\n";
        let (table, diag) = parse(content);
        let table = table.unwrap();
        assert_eq!(table.len(), 1);
        assert_close(table.column(DEFAULT_VARIABLE_NAME).unwrap(), &[0.15]);
        assert!(diag.contains(LogLevel::Warning, "1 duplicate timestamps"));
    }

    #[test]
    fn test_time_before_date_is_a_format_error() {
        let (result, _) = parse("08:30:00;120;X\n");
        assert!(matches!(result, Err(ConsoError::SourceFormat { line: Some(1), .. })));
    }

    #[test]
    fn test_invalid_power_is_a_format_error() {
        let (result, _) = parse("01/01/2021;;\n08:30:00;abc;X\n");
        assert!(matches!(result, Err(ConsoError::SourceFormat { line: Some(2), .. })));
    }

    #[test]
    fn test_invalid_date_marker_is_a_format_error() {
        let (result, _) = parse("32/01/2021;;\n");
        assert!(matches!(result, Err(ConsoError::SourceFormat { .. })));
    }

    #[test]
    fn test_custom_variable_name() {
        let mut diag = Diagnostics::new();
        let table = parse_export("01/01/2021;;\n00:30:00;2;X\n", "Power", Path::new("e.csv"), &mut diag).unwrap();
        assert_eq!(table.column_names(), vec!["Power"]);
    }
}
