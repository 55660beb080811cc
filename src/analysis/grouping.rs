/// Grouping conditions: rules that split a table's rows into labeled,
/// independent sub-tables for the hourly and weekly profiles.

use std::fmt;

use chrono::Datelike;
use serde::Deserialize;

use crate::model::{ConsoError, Result};
use crate::query::Query;
use crate::table::Table;
use crate::timefmt::{quarter, weekday};

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "RawCondition")]
pub enum GroupingCondition {
    /// One partition per calendar year, labeled `"2021"`, ...
    #[default]
    ByYear,
    /// `"Nov-Apr"` (heating season) then `"May-Oct"`.
    BySeasonHotCold,
    /// `"Work day"` (Monday to Friday) then `"Weekend"`.
    ByWeekday,
    /// `"Q1"` .. `"Q4"`.
    ByQuarter,
    /// One partition per predicate, labeled with its text. Partitions may
    /// share rows.
    ByQueryList(Vec<Query>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCondition {
    Keyword(String),
    Queries(Vec<String>),
}

impl TryFrom<RawCondition> for GroupingCondition {
    type Error = ConsoError;

    fn try_from(raw: RawCondition) -> Result<Self> {
        match raw {
            RawCondition::Keyword(keyword) => GroupingCondition::from_keyword(&keyword),
            RawCondition::Queries(queries) => queries
                .iter()
                .map(|q| Query::parse(q))
                .collect::<Result<Vec<_>>>()
                .map(GroupingCondition::ByQueryList),
        }
    }
}

impl GroupingCondition {
    pub fn from_keyword(keyword: &str) -> Result<Self> {
        match keyword {
            "year" => Ok(GroupingCondition::ByYear),
            "hot-cold" => Ok(GroupingCondition::BySeasonHotCold),
            "weekend" => Ok(GroupingCondition::ByWeekday),
            "quarter" => Ok(GroupingCondition::ByQuarter),
            other => Err(ConsoError::Configuration(format!(
                "unrecognised option '{}' for sorting, expected 'year', 'hot-cold', 'weekend', 'quarter' or a list of queries",
                other
            ))),
        }
    }

    /// Split `table` into `(label, sub-table)` pairs, in label order.
    pub fn partition(&self, table: &Table) -> Result<Vec<(String, Table)>> {
        let parts = match self {
            GroupingCondition::ByYear => table
                .years()
                .into_iter()
                .map(|year| (year.to_string(), table.filter_rows(|_, ts| ts.year() == year)))
                .collect(),
            GroupingCondition::BySeasonHotCold => {
                let warm = |month: u32| (5..=10).contains(&month);
                vec![
                    ("Nov-Apr".to_string(), table.filter_rows(|_, ts| !warm(ts.month()))),
                    ("May-Oct".to_string(), table.filter_rows(|_, ts| warm(ts.month()))),
                ]
            }
            GroupingCondition::ByWeekday => vec![
                ("Work day".to_string(), table.filter_rows(|_, ts| weekday(ts) < 5)),
                ("Weekend".to_string(), table.filter_rows(|_, ts| weekday(ts) >= 5)),
            ],
            GroupingCondition::ByQuarter => (1..=4)
                .map(|q| (format!("Q{}", q), table.filter_rows(|_, ts| quarter(ts) == q)))
                .collect(),
            GroupingCondition::ByQueryList(queries) => {
                let mut parts = Vec::with_capacity(queries.len());
                for query in queries {
                    parts.push((query.source().to_string(), query.apply(table)?));
                }
                parts
            }
        };
        Ok(parts)
    }
}

impl fmt::Display for GroupingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupingCondition::ByYear => write!(f, "year"),
            GroupingCondition::BySeasonHotCold => write!(f, "hot-cold"),
            GroupingCondition::ByWeekday => write!(f, "weekend"),
            GroupingCondition::ByQuarter => write!(f, "quarter"),
            GroupingCondition::ByQueryList(queries) => {
                let sources: Vec<&str> = queries.iter().map(Query::source).collect();
                write!(f, "{:?}", sources)
            }
        }
    }
}
