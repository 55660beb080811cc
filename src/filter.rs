//! The filter chain.
//!
//! Operations run in a fixed order whatever the configuration:
//! deduplication, resampling, start bound, end bound, query. Each one is a
//! no-op when its option is unset, and each one's output feeds the next.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};

use crate::logging::{Diagnostics, Stage};
use crate::model::{Aggregator, ConsoError, Result};
use crate::query::Query;
use crate::resample::Frequency;
use crate::table::{Keep, Table};
use crate::timefmt::parse_timestamp;

/// `"keep_first"` or `"keep_last"`; `"none"` or `false` disables
/// deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupMode {
    KeepFirst,
    KeepLast,
}

impl DedupMode {
    fn keep(&self) -> Keep {
        match self {
            DedupMode::KeepFirst => Keep::First,
            DedupMode::KeepLast => Keep::Last,
        }
    }
}

impl fmt::Display for DedupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupMode::KeepFirst => write!(f, "first"),
            DedupMode::KeepLast => write!(f, "last"),
        }
    }
}

fn parse_dedup(value: &str) -> Result<Option<DedupMode>> {
    match value {
        "keep_first" => Ok(Some(DedupMode::KeepFirst)),
        "keep_last" => Ok(Some(DedupMode::KeepLast)),
        "none" => Ok(None),
        other => Err(ConsoError::Configuration(format!(
            "unknown option remove_duplicates = '{}', expected 'keep_first', 'keep_last' or 'none'",
            other
        ))),
    }
}

fn deserialize_dedup<'de, D>(deserializer: D) -> std::result::Result<Option<DedupMode>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Mode(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Flag(false) => Ok(None),
        Raw::Flag(true) => Ok(Some(DedupMode::KeepLast)),
        Raw::Mode(mode) => parse_dedup(&mode).map_err(serde::de::Error::custom),
    }
}

fn deserialize_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| {
        parse_timestamp(&s).ok_or_else(|| serde::de::Error::custom(format!("unparseable date '{}'", s)))
    })
    .transpose()
}

fn default_dedup() -> Option<DedupMode> {
    Some(DedupMode::KeepLast)
}

/// Parameters of one filter step. Everything is validated when the
/// pipeline file is loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    #[serde(default = "default_dedup", deserialize_with = "deserialize_dedup")]
    pub remove_duplicates: Option<DedupMode>,
    #[serde(default)]
    pub resample: Option<Frequency>,
    #[serde(default, deserialize_with = "deserialize_date")]
    pub start_date: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "deserialize_date")]
    pub end_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub query: Option<Query>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            remove_duplicates: default_dedup(),
            resample: None,
            start_date: None,
            end_date: None,
            query: None,
        }
    }
}

impl FilterConfig {
    /// A configuration that does nothing.
    pub fn none() -> Self {
        FilterConfig {
            remove_duplicates: None,
            ..Self::default()
        }
    }
}

/// Run the chain over `table`, returning the filtered copy.
pub fn apply(table: &Table, config: &FilterConfig, diag: &mut Diagnostics) -> Result<Table> {
    let mut out = table.clone();

    if let Some(mode) = config.remove_duplicates {
        diag.info(Stage::Filter, format!("Removing duplicates - keeping {} entry", mode));
        out = out.drop_duplicate_index(mode.keep());
    }

    if let Some(freq) = &config.resample {
        diag.info(Stage::Filter, format!("Resampling with rule {}", freq));
        out = out.resample(freq, Aggregator::Mean);
    }

    if let Some(start) = config.start_date {
        diag.info(Stage::Filter, format!("Removing data before {}", start));
        out = out.filter_rows(|_, ts| *ts >= start);
    }

    if let Some(end) = config.end_date {
        diag.info(Stage::Filter, format!("Removing data after {}", end));
        out = out.filter_rows(|_, ts| *ts < end);
    }

    if let Some(query) = &config.query {
        diag.info(Stage::Filter, format!("Querying data with '{}'", query));
        out = query.apply(&out)?;
    }

    Ok(out)
}
