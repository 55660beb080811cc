/// Daily overlay: one curve per year on the earliest year's calendar.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::analysis::{deserialize_variables, resolve_variables};
use crate::logging::{Diagnostics, Stage};
use crate::model::{Aggregator, Axis, Result, Series, SeriesSet};
use crate::resample::Frequency;
use crate::table::Table;
use crate::timefmt::is_leap_year;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DailyConfig {
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub variables: Vec<String>,
    #[serde(default = "default_rolling_days")]
    pub rolling_average_days: usize,
    #[serde(default = "default_aggfunc")]
    pub aggfunc: Aggregator,
}

fn default_rolling_days() -> usize {
    1
}

fn default_aggfunc() -> Aggregator {
    Aggregator::Sum
}

impl Default for DailyConfig {
    fn default() -> Self {
        DailyConfig {
            variables: Vec::new(),
            rolling_average_days: default_rolling_days(),
            aggfunc: default_aggfunc(),
        }
    }
}

/// Aggregate per day, optionally smooth, and overlay the years.
///
/// x is the 0-based day offset from January 1st of the reference year.
/// When the reference year is not leap, a leap year's February 29th is
/// dropped; a leap reference year keeps its own February 29th slot empty
/// for the other years.
pub fn daily_overlay(table: &Table, config: &DailyConfig, diag: &mut Diagnostics) -> Result<Vec<SeriesSet>> {
    let variables = resolve_variables(table, &config.variables)?;
    let title = format!("Daily {} over the year", config.aggfunc);
    diag.info(Stage::Aggregate, format!("Computing '{}'", title));

    let years = table.years();
    let Some(&reference_year) = years.first() else {
        diag.warn(Stage::Aggregate, format!("No data for '{}'", title));
        return Ok(Vec::new());
    };
    let Some(jan_first) = NaiveDate::from_ymd_opt(reference_year, 1, 1) else {
        return Ok(Vec::new());
    };
    let drop_leap_day = !is_leap_year(reference_year);

    let mut daily = table.resample(&Frequency::days(1), config.aggfunc);
    if config.rolling_average_days > 1 {
        daily = daily.rolling_mean(config.rolling_average_days);
    }

    let mut sets = Vec::with_capacity(variables.len());
    for var in &variables {
        let values = daily.require_column(var)?;
        let mut series = Vec::with_capacity(years.len());
        for &year in &years {
            let skip_feb_29 = drop_leap_day && is_leap_year(year);
            let points: Vec<(f64, Option<f64>)> = daily
                .index()
                .iter()
                .zip(values)
                .filter(|(ts, _)| ts.year() == year)
                .filter(|(ts, _)| !(skip_feb_29 && ts.month() == 2 && ts.day() == 29))
                .filter_map(|(ts, v)| {
                    let day = NaiveDate::from_ymd_opt(reference_year, ts.month(), ts.day())?;
                    Some(((day - jan_first).num_days() as f64, *v))
                })
                .collect();
            series.push(Series::line(year.to_string(), points));
        }
        sets.push(SeriesSet {
            title: format!("{} - {}", var, title),
            x_axis: Axis::DayOfYear { reference_year },
            y_label: var.clone(),
            series,
        });
    }
    Ok(sets)
}
