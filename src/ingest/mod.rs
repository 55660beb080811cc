//! Source readers.
//!
//! Each reader turns one external file into a canonical `Table`:
//! - `tabular`: generic delimited file with a timestamp column.
//! - `electricity`: half-hourly power export (date/time marker lines).
//! - `gas`: daily gas consumption export.
//! - `line_protocol`: measurement line-protocol dump.
//!
//! Readers fail with `SourceNotFound` when their path does not resolve and
//! with `SourceFormat` when the content is unusable; isolated irregular
//! rows are recorded in the diagnostics and skipped.

pub mod electricity;
pub mod gas;
pub mod line_protocol;
pub mod tabular;

use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::{Diagnostics, Stage};
use crate::model::{ConsoError, Result};
use crate::table::Table;

pub use electricity::ElectricitySource;
pub use gas::GasSource;
pub use line_protocol::LineProtocolSource;
pub use tabular::TabularSource;

/// Reader variant plus its parameters, as declared by one pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDescriptor {
    Tabular(TabularSource),
    Electricity(ElectricitySource),
    Gas(GasSource),
    LineProtocol(LineProtocolSource),
}

impl SourceDescriptor {
    /// Read the source into a fresh table.
    pub fn read(&self, diag: &mut Diagnostics) -> Result<Table> {
        match self {
            SourceDescriptor::Tabular(src) => tabular::read(src, diag),
            SourceDescriptor::Electricity(src) => electricity::read(src, diag),
            SourceDescriptor::Gas(src) => gas::read(src, diag),
            SourceDescriptor::LineProtocol(src) => line_protocol::read(src, diag),
        }
    }
}

// ============================================================================
// File helpers
// ============================================================================

/// The path must name an existing file.
pub(crate) fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConsoError::SourceNotFound {
            path: path.to_path_buf(),
            hint: "check the pipeline file".to_string(),
        })
    }
}

/// Resolve the single export file matching `fname_glob` inside `dir`.
///
/// The directory must exist. The first match in sorted order wins; more
/// than one match is reported. Without a match the literal
/// `dir/fname_glob` must exist.
pub(crate) fn locate_export(dir: &Path, fname_glob: &str, diag: &mut Diagnostics) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(ConsoError::SourceNotFound {
            path: dir.to_path_buf(),
            hint: "data directory missing, check the pipeline file".to_string(),
        });
    }

    let pattern = dir.join(fname_glob);
    let pattern_str = pattern.to_string_lossy();
    let mut matches: Vec<PathBuf> = glob::glob(&pattern_str)
        .map_err(|e| ConsoError::Configuration(format!("invalid file name glob '{}': {}", fname_glob, e)))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    matches.sort();

    match matches.len() {
        0 => {
            if pattern.is_file() {
                Ok(pattern)
            } else {
                Err(ConsoError::SourceNotFound {
                    path: pattern,
                    hint: "no matching file in the data directory".to_string(),
                })
            }
        }
        1 => Ok(matches.remove(0)),
        n => {
            diag.warn(
                Stage::Read,
                format!(
                    "{} files match '{}' in {}, using {}",
                    n,
                    fname_glob,
                    dir.display(),
                    matches[0].display()
                ),
            );
            Ok(matches.remove(0))
        }
    }
}

/// Read a file written in ISO-8859-1, the encoding of the vendor exports.
/// Every byte maps to the code point of the same value.
pub(crate) fn read_latin1(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| ConsoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(bytes.iter().map(|&b| char::from(b)).collect())
}

pub(crate) fn read_utf8(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ConsoError::Io {
        path: path.to_path_buf(),
        source,
    })
}
