//! Temporal aggregation and correlation over the canonical table.
//!
//! Every entry point borrows the table, leaves it unmodified and returns
//! labeled `SeriesSet`s for a rendering or export caller.
//!
//! Submodules:
//! - `grouping`: partitions rows into labeled sub-tables.
//! - `daily`: day-of-year overlay, one curve per year.
//! - `hourly`: hour-of-day profile per partition.
//! - `weekly`: day-of-week profile per partition plus a daily-mean step.
//! - `correlation`: frequency-aligned scatter pairs.

pub mod correlation;
pub mod daily;
pub mod grouping;
pub mod hourly;
pub mod weekly;

use serde::{Deserialize, Deserializer};

use crate::model::Result;
use crate::table::Table;

/// The variables a request works on: `requested` verbatim, or every column
/// of the table when nothing is requested.
pub fn resolve_variables(table: &Table, requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(table.column_names());
    }
    for name in requested {
        if !table.has_column(name) {
            return Err(table.unknown_variable(name));
        }
    }
    Ok(requested.to_vec())
}

/// Accept either a single name or a list of names.
pub(crate) fn deserialize_variables<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConsoError;
    use crate::table::Column;
    use chrono::NaiveDate;

    fn table() -> Table {
        let ts = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Table::from_columns(
            vec![ts],
            vec![Column::new("gas", vec![Some(1.0)]), Column::new("elec", vec![Some(2.0)])],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_request_means_all_columns() {
        assert_eq!(resolve_variables(&table(), &[]).unwrap(), vec!["gas", "elec"]);
    }

    #[test]
    fn test_unknown_variable_lists_available_names() {
        let err = resolve_variables(&table(), &["water".to_string()]).unwrap_err();
        match err {
            ConsoError::UnknownVariable { name, available } => {
                assert_eq!(name, "water");
                assert_eq!(available, vec!["gas", "elec"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_variables_accept_single_name() {
        #[derive(Deserialize)]
        struct Request {
            #[serde(deserialize_with = "deserialize_variables")]
            variables: Vec<String>,
        }
        let one: Request = toml::from_str("variables = \"gas\"").unwrap();
        assert_eq!(one.variables, vec!["gas"]);
        let many: Request = toml::from_str("variables = [\"gas\", \"elec\"]").unwrap();
        assert_eq!(many.variables, vec!["gas", "elec"]);
    }
}
