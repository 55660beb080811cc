/// Table inspection: a summary for the terminal and an optional CSV dump.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::logging::{Diagnostics, Stage};
use crate::model::{Aggregator, ConsoError, Result};
use crate::table::Table;

const CSV_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InspectConfig {
    #[serde(default)]
    pub to_csv_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub rows: usize,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    pub duplicated_timestamps: usize,
    pub columns: Vec<ColumnSummary>,
    /// Head/tail preview of the table.
    #[serde(skip)]
    pub preview: String,
}

impl TableSummary {
    pub fn of(table: &Table) -> Self {
        let columns = table
            .columns()
            .iter()
            .map(|c| {
                let values: Vec<f64> = c.values.iter().flatten().copied().collect();
                ColumnSummary {
                    name: c.name.clone(),
                    count: values.len(),
                    mean: Aggregator::Mean.apply(&values),
                    min: Aggregator::Min.apply(&values),
                    max: Aggregator::Max.apply(&values),
                }
            })
            .collect();

        TableSummary {
            rows: table.len(),
            first: table.index().iter().min().copied(),
            last: table.index().iter().max().copied(),
            duplicated_timestamps: table.duplicate_count(),
            columns,
            preview: table.to_string(),
        }
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for TableSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} DATA INFO BEG {}", "-".repeat(20), "-".repeat(20))?;
        match (self.first, self.last) {
            (Some(first), Some(last)) => {
                writeln!(f, "Time index: {} entries, {} to {}", self.rows, first, last)?
            }
            _ => writeln!(f, "Time index: {} entries", self.rows)?,
        }
        if self.duplicated_timestamps > 0 {
            writeln!(f, "Duplicated timestamps: {}", self.duplicated_timestamps)?;
        }
        writeln!(f, "Data columns (total {} columns):", self.columns.len())?;
        writeln!(
            f,
            " {:<3} {:<24} {:>10} {:>12} {:>12} {:>12}",
            "#", "Column", "Non-null", "Mean", "Min", "Max"
        )?;
        for (i, c) in self.columns.iter().enumerate() {
            writeln!(
                f,
                " {:<3} {:<24} {:>10} {:>12} {:>12} {:>12}",
                i,
                c.name,
                c.count,
                fmt_opt(c.mean),
                fmt_opt(c.min),
                fmt_opt(c.max)
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.preview)?;
        write!(f, "{} DATA INFO END {}", "-".repeat(20), "-".repeat(20))
    }
}

/// Summarize `table` and dump it to CSV when requested. The table is left
/// unmodified.
pub fn inspect(table: &Table, config: &InspectConfig, diag: &mut Diagnostics) -> Result<TableSummary> {
    let summary = TableSummary::of(table);
    diag.debug(
        Stage::Inspect,
        format!("{} rows, {} columns", summary.rows, summary.columns.len()),
    );
    if let Some(path) = &config.to_csv_file {
        write_csv(table, path)?;
        diag.info(Stage::Inspect, format!("Dumped data to file {}", path.display()));
    }
    Ok(summary)
}

/// Write the table with a leading `time` column; missing values are empty
/// cells.
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["time".to_string()];
    header.extend(table.column_names());
    writer.write_record(&header)?;

    for (row, ts) in table.index().iter().enumerate() {
        let mut record = vec![ts.format(CSV_TIMESTAMP_FORMAT).to_string()];
        record.extend(
            table
                .columns()
                .iter()
                .map(|c| c.values[row].map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }

    writer.flush().map_err(|source| ConsoError::Io {
        path: path.to_path_buf(),
        source,
    })
}
