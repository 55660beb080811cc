/// Hourly profile: the shape of an average day, per partition.

use serde::Deserialize;

use crate::analysis::grouping::GroupingCondition;
use crate::analysis::{deserialize_variables, resolve_variables};
use crate::logging::{Diagnostics, Stage};
use crate::model::{Aggregator, Axis, Result, Series, SeriesSet};
use crate::table::Table;
use crate::timefmt::minute_of_day;

/// Partitions with fewer hourly points cannot describe a daily curve.
pub const MIN_HOURLY_POINTS: usize = 12;

/// Name of the derived column visible to query grouping conditions.
pub const HOUR_COLUMN: &str = "hour";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HourlyConfig {
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub variables: Vec<String>,
    #[serde(default)]
    pub sort_by: GroupingCondition,
    #[serde(default)]
    pub aggfunc: Aggregator,
}

pub fn hourly_profile(table: &Table, config: &HourlyConfig, diag: &mut Diagnostics) -> Result<Vec<SeriesSet>> {
    let variables = resolve_variables(table, &config.variables)?;
    let title = format!("Hourly {} over the day", config.aggfunc);
    diag.info(Stage::Aggregate, format!("Computing '{}'", title));

    let hours = table
        .index()
        .iter()
        .map(|ts| Some(minute_of_day(ts) as f64 / 60.0))
        .collect();
    let with_hour = table.with_column(HOUR_COLUMN, hours)?;

    let mut profiles = Vec::new();
    for (label, part) in config.sort_by.partition(&with_hour)? {
        let keys: Vec<i64> = part.index().iter().map(|ts| minute_of_day(ts) as i64).collect();
        profiles.push((label, part.aggregate_by_key(&keys, config.aggfunc, &[HOUR_COLUMN])));
    }

    let mut sets = Vec::new();
    for var in &variables {
        let mut series = Vec::new();
        for (label, profile) in &profiles {
            let Some(values) = profile.column(var) else {
                diag.info(Stage::Aggregate, format!("No data for '{}' in '{}'.", var, label));
                continue;
            };
            let mut points: Vec<(f64, Option<f64>)> = profile
                .keys
                .iter()
                .zip(values)
                .filter_map(|(minute, v)| v.map(|v| (*minute as f64 / 60.0, Some(v))))
                .collect();
            if points.len() < MIN_HOURLY_POINTS {
                diag.info(
                    Stage::Aggregate,
                    format!("Insufficient data ({}) for '{}' in '{}'.", points.len(), var, label),
                );
                continue;
            }
            // Close the day: midnight is drawn again at hour 24.
            let first = points[0].1;
            points.push((24.0, first));
            series.push(Series::line(label.clone(), points));
        }

        if series.is_empty() {
            diag.warn(Stage::Aggregate, format!("No data for '{}'.", var));
            continue;
        }
        sets.push(SeriesSet {
            title: format!("{} - {}", var, title),
            x_axis: Axis::HourOfDay,
            y_label: var.clone(),
            series,
        });
    }
    Ok(sets)
}
