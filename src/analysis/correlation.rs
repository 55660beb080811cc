/// Correlation of variable pairs.
///
/// Two variables rarely share a sampling rate (an hourly thermometer and a
/// daily meter, say). Each pair is aligned on the median interval of its
/// sparser series, averaging both variables over that interval, and the
/// rows with both values present become scatter points.

use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;

use crate::analysis::{deserialize_variables, resolve_variables};
use crate::logging::{Diagnostics, Stage};
use crate::model::{Aggregator, Axis, Result, Series, SeriesSet, SeriesStyle};
use crate::resample::{Frequency, describe_duration};
use crate::table::Table;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrelationConfig {
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub x_vars: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub y_vars: Vec<String>,
}

/// One scatter set per unordered pair of distinct variables.
pub fn correlate(table: &Table, config: &CorrelationConfig, diag: &mut Diagnostics) -> Result<Vec<SeriesSet>> {
    let x_vars = resolve_variables(table, &config.x_vars)?;
    let y_vars = resolve_variables(table, &config.y_vars)?;

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut sets = Vec::new();
    for x in &x_vars {
        for y in &y_vars {
            if x == y {
                continue;
            }
            let pair_key = if x < y { (x.clone(), y.clone()) } else { (y.clone(), x.clone()) };
            if !seen.insert(pair_key) {
                continue;
            }

            let title = format!("{} vs {}", y, x);
            diag.info(Stage::Correlate, format!("Correlating '{}'", title));
            if let Some(set) = correlate_pair(table, x, y, &title, diag)? {
                sets.push(set);
            }
        }
    }
    Ok(sets)
}

fn correlate_pair(
    table: &Table,
    x: &str,
    y: &str,
    title: &str,
    diag: &mut Diagnostics,
) -> Result<Option<SeriesSet>> {
    let pair = table
        .select_columns(&[x.to_string(), y.to_string()])?
        .drop_empty_rows()
        .sort_by_index();

    let sparser = if pair.count(y) < pair.count(x) { y } else { x };
    let Some(interval) = median_interval(&pair, sparser)? else {
        diag.warn(
            Stage::Correlate,
            format!("Not enough '{}' observations to align '{}', skipped", sparser, title),
        );
        return Ok(None);
    };
    let Some(freq) = Frequency::fixed(interval) else {
        diag.warn(
            Stage::Correlate,
            format!("'{}' has a zero median interval, '{}' skipped", sparser, title),
        );
        return Ok(None);
    };
    diag.debug(
        Stage::Correlate,
        format!("Aligning '{}' on {} ('{}' is sparser)", title, describe_duration(interval), sparser),
    );

    let aligned = pair.resample(&freq, Aggregator::Mean).drop_incomplete_rows();
    let xs = aligned.require_column(x)?;
    let ys = aligned.require_column(y)?;
    let points = xs
        .iter()
        .zip(ys)
        .filter_map(|(xv, yv)| match (xv, yv) {
            (Some(xv), Some(yv)) => Some((*xv, Some(*yv))),
            _ => None,
        })
        .collect();

    Ok(Some(SeriesSet {
        title: title.to_string(),
        x_axis: Axis::Variable { name: x.to_string() },
        y_label: y.to_string(),
        series: vec![Series {
            label: format!("Mean values over {}", describe_duration(interval)),
            style: SeriesStyle::Scatter,
            points,
        }],
    }))
}

/// Median gap between consecutive observations of `var`; `None` with fewer
/// than two observations. `table` must be sorted.
fn median_interval(table: &Table, var: &str) -> Result<Option<Duration>> {
    let values = table.require_column(var)?;
    let observed: Vec<NaiveDateTime> = table
        .index()
        .iter()
        .zip(values)
        .filter(|(_, v)| v.is_some())
        .map(|(ts, _)| *ts)
        .collect();

    let mut deltas: Vec<Duration> = observed.windows(2).map(|w| w[1] - w[0]).collect();
    if deltas.is_empty() {
        return Ok(None);
    }
    deltas.sort();
    let mid = deltas.len() / 2;
    let median = if deltas.len() % 2 == 0 {
        (deltas[mid - 1] + deltas[mid]) / 2
    } else {
        deltas[mid]
    };
    Ok(Some(median))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use crate::table::Column;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// 100 hourly temperatures joined with 10 daily noon readings.
    fn hourly_and_daily() -> Table {
        let hourly: Vec<NaiveDateTime> = (0..100).map(|i| start() + Duration::hours(i)).collect();
        let temperature = Table::single(
            hourly,
            "temperature",
            (0..100).map(|i| Some(15.0 + (i % 24) as f64)).collect(),
        )
        .unwrap();
        let daily: Vec<NaiveDateTime> = (0..10).map(|d| start() + Duration::days(d) + Duration::hours(12)).collect();
        let gas = Table::single(daily, "gas", (0..10).map(|d| Some(d as f64)).collect()).unwrap();
        temperature.outer_join(&gas)
    }

    #[test]
    fn test_alignment_on_sparser_series() {
        let table = hourly_and_daily();
        let mut diag = Diagnostics::new();
        let sets = correlate(&table, &CorrelationConfig::default(), &mut diag).unwrap();

        // (temperature, gas) and (gas, temperature) are the same pair.
        assert_eq!(sets.len(), 1);
        let set = &sets[0];
        assert_eq!(set.title, "gas vs temperature");
        assert_eq!(set.x_axis, Axis::Variable { name: "temperature".to_string() });

        let series = &set.series[0];
        assert_eq!(series.label, "Mean values over 1 day");
        assert_eq!(series.style, SeriesStyle::Scatter);
        // Hourly data covers days 1 to 5 only.
        assert_eq!(series.points.len(), 5);
        assert!(series.points.iter().all(|(x, y)| x.is_finite() && y.is_some()));
        assert_eq!(series.points[0], (26.5, Some(0.0)));
    }

    #[test]
    fn test_explicit_axes() {
        let mut table = hourly_and_daily();
        let n = table.len();
        table = table.with_column("elec", vec![Some(1.0); n]).unwrap();
        let config = CorrelationConfig {
            x_vars: vec!["temperature".to_string()],
            y_vars: vec!["gas".to_string(), "elec".to_string(), "temperature".to_string()],
        };
        let mut diag = Diagnostics::new();
        let sets = correlate(&table, &config, &mut diag).unwrap();
        let titles: Vec<_> = sets.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["gas vs temperature", "elec vs temperature"]);
    }

    #[test]
    fn test_single_observation_pair_is_skipped() {
        let index = vec![start(), start() + Duration::hours(1)];
        let table = Table::from_columns(
            index,
            vec![
                Column::new("a", vec![Some(1.0), Some(2.0)]),
                Column::new("b", vec![Some(3.0), None]),
            ],
        )
        .unwrap();
        let mut diag = Diagnostics::new();
        let sets = correlate(&table, &CorrelationConfig::default(), &mut diag).unwrap();
        assert!(sets.is_empty());
        assert!(diag.contains(LogLevel::Warning, "Not enough 'b' observations"));
    }

    #[test]
    fn test_repeated_timestamps_give_zero_interval() {
        let index = vec![start(), start(), start()];
        let table = Table::from_columns(
            index,
            vec![
                Column::new("a", vec![Some(1.0), Some(2.0), Some(3.0)]),
                Column::new("b", vec![Some(1.0), Some(2.0), Some(3.0)]),
            ],
        )
        .unwrap();
        let mut diag = Diagnostics::new();
        assert!(correlate(&table, &CorrelationConfig::default(), &mut diag).unwrap().is_empty());
        assert!(diag.contains(LogLevel::Warning, "zero median interval"));
    }

    #[test]
    fn test_median_interval_of_even_count_averages() {
        let index = vec![
            start(),
            start() + Duration::hours(1),
            start() + Duration::hours(3),
            start() + Duration::hours(6),
            start() + Duration::hours(10),
        ];
        let table = Table::single(index, "v", vec![Some(1.0); 5]).unwrap();
        assert_eq!(median_interval(&table, "v").unwrap(), Some(Duration::minutes(150)));
    }
}
