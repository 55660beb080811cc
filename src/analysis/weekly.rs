/// Weekly profile: the shape of an average week, per partition, with the
/// mean of each weekday drawn as a step underneath.

use serde::Deserialize;

use crate::analysis::grouping::GroupingCondition;
use crate::analysis::{deserialize_variables, resolve_variables};
use crate::logging::{Diagnostics, Stage};
use crate::model::{Aggregator, Axis, Result, Series, SeriesSet, SeriesStyle};
use crate::resample::Frequency;
use crate::table::{KeyedAggregate, Table};
use crate::timefmt::{minute_of_day, weekday};

/// Name of the derived column visible to query grouping conditions.
pub const DAY_COLUMN: &str = "day";

pub const DAILY_MEAN_LABEL: &str = "Daily mean";

const MINUTES_PER_DAY: f64 = 1440.0;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeeklyConfig {
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub variables: Vec<String>,
    #[serde(default)]
    pub sort_by: GroupingCondition,
}

/// Fractional day of the week (Monday = 0) in hundredths of a day, halves
/// rounded to even.
fn day_key(ts: &chrono::NaiveDateTime) -> i64 {
    let day = weekday(ts) as f64 + minute_of_day(ts) as f64 / MINUTES_PER_DAY;
    (day * 100.0).round_ties_even() as i64
}

pub fn weekly_profile(table: &Table, config: &WeeklyConfig, diag: &mut Diagnostics) -> Result<Vec<SeriesSet>> {
    let variables = resolve_variables(table, &config.variables)?;
    let title = "Trend over the week";
    diag.info(Stage::Aggregate, format!("Computing '{}'", title));

    let daily_means = weekday_means(table);

    let days = table
        .index()
        .iter()
        .map(|ts| Some(day_key(ts) as f64 / 100.0))
        .collect();
    let with_day = table.with_column(DAY_COLUMN, days)?;

    let mut profiles = Vec::new();
    for (label, part) in config.sort_by.partition(&with_day)? {
        let keys: Vec<i64> = part.index().iter().map(day_key).collect();
        profiles.push((label, part.aggregate_by_key(&keys, Aggregator::Mean, &[DAY_COLUMN])));
    }

    let mut sets = Vec::new();
    for var in &variables {
        let mut series = Vec::new();
        for (label, profile) in &profiles {
            let Some(values) = profile.column(var) else {
                diag.info(Stage::Aggregate, format!("No data for '{}' in '{}'.", var, label));
                continue;
            };
            let points = profile
                .keys
                .iter()
                .zip(values)
                .filter_map(|(key, v)| v.map(|v| (*key as f64 / 100.0, Some(v))))
                .collect();
            series.push(Series::line(label.clone(), points));
        }

        if let Some(step) = daily_mean_step(&daily_means, var) {
            series.push(step);
        }

        if series.is_empty() {
            diag.warn(Stage::Aggregate, format!("No data for '{}'.", var));
            continue;
        }
        sets.push(SeriesSet {
            title: format!("{} - {}", var, title),
            x_axis: Axis::DayOfWeek,
            y_label: var.clone(),
            series,
        });
    }
    Ok(sets)
}

/// Mean of the daily means, per weekday, over the whole table.
fn weekday_means(table: &Table) -> KeyedAggregate {
    let daily = table.resample(&Frequency::days(1), Aggregator::Mean);
    let keys: Vec<i64> = daily.index().iter().map(|ts| weekday(ts) as i64).collect();
    daily.aggregate_by_key(&keys, Aggregator::Mean, &[])
}

/// Step series centered on each weekday (x = 0.5 .. 6.5), extended to the
/// edges of the week with the Monday and Sunday values.
fn daily_mean_step(means: &KeyedAggregate, var: &str) -> Option<Series> {
    let values = means.column(var)?;
    let mut points: Vec<(f64, Option<f64>)> = means
        .keys
        .iter()
        .zip(values)
        .map(|(day, v)| (*day as f64 + 0.5, *v))
        .collect();

    if let Some(&(x, monday)) = points.first() {
        if x == 0.5 {
            points.insert(0, (0.0, monday));
        }
    }
    if let Some(&(x, sunday)) = points.last() {
        if x == 6.5 {
            points.push((7.0, sunday));
        }
    }

    Some(Series {
        label: DAILY_MEAN_LABEL.to_string(),
        style: SeriesStyle::Step,
        points,
    })
}
