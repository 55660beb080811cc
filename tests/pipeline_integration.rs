/// Integration tests for whole pipeline runs
///
/// Each test writes its source files into a temporary directory, declares
/// a pipeline in TOML the way a user would, runs it and checks the table,
/// series sets and diagnostics that come out.
///
/// Run with: cargo test --test pipeline_integration

use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use suiviconso::logging::LogLevel;
use suiviconso::model::{Axis, SeriesStyle};
use suiviconso::{ConsoError, PipelineConfig, RunOutput, run};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

fn run_pipeline(toml: &str) -> RunOutput {
    let config = PipelineConfig::from_toml_str(toml).unwrap_or_else(|e| panic!("bad pipeline: {}\n{}", e, toml));
    run(&config).unwrap_or_else(|e| panic!("pipeline failed: {}", e))
}

/// CSV with a `time` column and one value column.
fn csv_series(name: &str, rows: &[(NaiveDateTime, f64)]) -> String {
    let mut out = format!("time,{}\n", name);
    for (ts, v) in rows {
        out.push_str(&format!("{},{}\n", ts.format("%Y-%m-%d %H:%M:%S"), v));
    }
    out
}

fn gas_export(rows: &[(&str, &str)]) -> String {
    let mut out = String::from(
        "Ma consommation quotidienne\nReference;123456\nPeriode;export\n\n\
         Releves\nUnite;m3\n\nType;Quotidien\nSource;Compteur\n\
         Date;Consommation (m3);Consommation (kWh)\n",
    );
    for (date, reading) in rows {
        out.push_str(&format!("{};{};0\n", date, reading));
    }
    out
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

#[test]
fn distinct_columns_are_outer_joined() {
    let dir = TempDir::new().unwrap();
    let temp = write(
        dir.path(),
        "temp.csv",
        &csv_series("Temperature", &[(at(2021, 1, 1, 0, 0), 19.0), (at(2021, 1, 1, 1, 0), 20.0)]),
    );
    let hum = write(
        dir.path(),
        "hum.csv",
        &csv_series("Humidity", &[(at(2021, 1, 1, 1, 0), 40.0), (at(2021, 1, 1, 2, 0), 42.0)]),
    );

    let output = run_pipeline(&format!(
        "[temperature]\nmodule = \"csv\"\nfile_path = '{}'\n\n[humidity]\nmodule = \"csv\"\nfile_path = '{}'\n",
        temp, hum
    ));

    let table = &output.table;
    assert_eq!(table.column_names(), vec!["Temperature", "Humidity"]);
    assert_eq!(
        table.index(),
        &[at(2021, 1, 1, 0, 0), at(2021, 1, 1, 1, 0), at(2021, 1, 1, 2, 0)]
    );
    assert_eq!(table.column("Temperature").unwrap(), &[Some(19.0), Some(20.0), None]);
    assert_eq!(table.column("Humidity").unwrap(), &[None, Some(40.0), Some(42.0)]);
}

#[test]
fn same_columns_are_concatenated() {
    let dir = TempDir::new().unwrap();
    let y2021 = dir.path().join("2021");
    let y2022 = dir.path().join("2022");
    fs::create_dir(&y2021).unwrap();
    fs::create_dir(&y2022).unwrap();
    write(
        &y2021,
        "ma-conso-quotidienne-2021.csv",
        &gas_export(&[("30/12/2021", "3,5"), ("31/12/2021", "4")]),
    );
    write(
        &y2022,
        "ma-conso-quotidienne-2022.csv",
        &gas_export(&[("01/01/2022", "2,25"), ("02/01/2022", ""), ("03/01/2022", "1")]),
    );

    let output = run_pipeline(&format!(
        "[gas_2021]\nmodule = \"gas\"\ndir_path = '{}'\n\n[gas_2022]\nmodule = \"gas\"\ndir_path = '{}'\n",
        y2021.display(),
        y2022.display()
    ));

    let table = &output.table;
    assert_eq!(table.len(), 5);
    assert_eq!(table.column_names(), vec!["Gas (m3)"]);
    assert_eq!(table.index()[0], at(2021, 12, 30, 12, 0));
    assert_eq!(
        table.column("Gas (m3)").unwrap(),
        &[Some(3.5), Some(4.0), Some(2.25), None, Some(1.0)]
    );
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

#[test]
fn electricity_export_keeps_grid_entries_only() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "mes-puissances-atteintes-30min-004.csv",
        "Recapitulatif de mes puissances atteintes en W;;\n\
         Date et heure de releve par le distributeur;Puissance atteinte (W);Nature de la releve\n\
         01/01/2021;;\n\
         08:00:00;100;Reelle\n\
         08:15:00;120;Reelle\n\
         08:30:00;120;Reelle\n\
         08:30:00;140;Reelle\n",
    );

    let output = run_pipeline(&format!("[electricity]\ndir_path = '{}'\n", dir.path().display()));

    let table = &output.table;
    assert_eq!(table.index(), &[at(2021, 1, 1, 8, 0), at(2021, 1, 1, 8, 30)]);
    let values = table.column("Electricity (kWh)").unwrap();
    assert!((values[0].unwrap() - 0.05).abs() < 1e-12);
    // Duplicate 08:30 keeps the last reading: 140 W over half an hour.
    assert!((values[1].unwrap() - 0.07).abs() < 1e-12);

    let diag = &output.diagnostics;
    assert!(diag.contains(LogLevel::Debug, "Strange entry detected: 08:15:00;120;Reelle"));
    assert!(diag.contains(LogLevel::Warning, "keeping last"));
}

#[test]
fn electricity_quarter_hour_line_is_skipped() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "mes-puissances-atteintes-30min-001.csv",
        "01/01/2021;;\n08:15:00;120;X\n08:30:00;120;X\n",
    );

    let output = run_pipeline(&format!("[electricity]\ndir_path = '{}'\n", dir.path().display()));
    assert_eq!(output.table.index(), &[at(2021, 1, 1, 8, 30)]);
    let value = output.table.column("Electricity (kWh)").unwrap()[0].unwrap();
    assert!((value - 0.06).abs() < 1e-12);
}

#[test]
fn missing_source_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::from_toml_str(&format!(
        "[gas]\ndir_path = '{}'\n\n[daily]\n",
        dir.path().join("nowhere").display()
    ))
    .unwrap();

    let err = run(&config).unwrap_err();
    assert!(matches!(err, ConsoError::Step { ref step, .. } if step == "gas"));
    assert!(matches!(err.root(), ConsoError::SourceNotFound { .. }));
}

#[test]
fn line_protocol_dump_is_inspected_and_dumped() {
    let dir = TempDir::new().unwrap();
    // 2021-01-01T00:00:00Z in nanoseconds.
    let t0: i64 = 1_609_459_200_000_000_000;
    let s: i64 = 1_000_000_000;
    let dump = write(
        dir.path(),
        "home.lp",
        &format!(
            "# INFLUXDB EXPORT\n# DDL\nCREATE DATABASE home\n# DML\n# CONTEXT-DATABASE:home\n\
             # CONTEXT-RETENTION-POLICY:autogen\n# writing tsm data\n\
             climate,room=living temperature=20,humidity=40 {}\n\
             climate,room=living temperature=22,humidity=44 {}\n\
             climate,room=living temperature=25 {}\n",
            t0,
            t0 + 20 * s,
            t0 + 65 * s
        ),
    );
    let csv_out = dir.path().join("dump.csv");

    let output = run_pipeline(&format!(
        "[line_protocol]\nfile_path = '{}'\n\n[inspect]\nto_csv_file = '{}'\n",
        dump,
        csv_out.display()
    ));

    assert_eq!(output.summaries.len(), 1);
    let summary = &output.summaries[0];
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.columns[0].name, "temperature");
    assert_eq!(summary.columns[0].mean, Some(23.0));
    assert_eq!(summary.columns[1].count, 1);

    let dumped = fs::read_to_string(&csv_out).unwrap();
    assert_eq!(
        dumped,
        "time,temperature,humidity\n2021-01-01 00:00:00,21,42\n2021-01-01 00:01:00,25,\n"
    );
}

// ---------------------------------------------------------------------------
// Filter chain
// ---------------------------------------------------------------------------

#[test]
fn duplicate_timestamps_keep_last_by_default() {
    let dir = TempDir::new().unwrap();
    let data = write(
        dir.path(),
        "data.csv",
        &csv_series(
            "v",
            &[(at(2021, 1, 1, 0, 0), 1.0), (at(2021, 1, 1, 0, 0), 2.0), (at(2021, 1, 1, 1, 0), 3.0)],
        ),
    );

    let output = run_pipeline(&format!("[csv]\nfile_path = '{}'\n\n[filter]\n", data));
    assert_eq!(output.table.len(), 2);
    assert_eq!(output.table.column("v").unwrap(), &[Some(2.0), Some(3.0)]);

    let output = run_pipeline(&format!(
        "[csv]\nfile_path = '{}'\n\n[filter]\nremove_duplicates = \"keep_first\"\n",
        data
    ));
    assert_eq!(output.table.column("v").unwrap(), &[Some(1.0), Some(3.0)]);
}

#[test]
fn filter_chain_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let rows: Vec<(NaiveDateTime, f64)> = (0..200)
        .map(|i| (at(2021, 1, 1, 0, 0) + Duration::minutes(17 * i), (i % 13) as f64))
        .collect();
    let data = write(dir.path(), "data.csv", &csv_series("v", &rows));

    let filter = "remove_duplicates = \"keep_last\"\nresample = \"1h\"\n\
                  start_date = \"2021-01-01 06:00\"\nend_date = \"2021-01-03\"\n\
                  query = \"v > 2 and index.hour != 12\"\n";
    let once = run_pipeline(&format!("[csv]\nfile_path = '{}'\n\n[filter]\n{}", data, filter));
    let twice = run_pipeline(&format!(
        "[csv]\nfile_path = '{}'\n\n[first]\nmodule = \"filter\"\n{}\n[second]\nmodule = \"filter\"\n{}",
        data, filter, filter
    ));

    assert!(!once.table.is_empty());
    assert_eq!(once.table, twice.table);
    assert!(once.table.index().iter().all(|ts| *ts >= at(2021, 1, 1, 6, 0)));
    assert!(once.table.index().iter().all(|ts| *ts < at(2021, 1, 3, 0, 0)));
}

// ---------------------------------------------------------------------------
// Aggregations
// ---------------------------------------------------------------------------

#[test]
fn daily_overlay_drops_leap_day_of_later_year() {
    let dir = TempDir::new().unwrap();
    let mut rows = Vec::new();
    for (y, m, d, v) in [
        (2021, 2, 28, 1.0),
        (2021, 3, 1, 2.0),
        (2024, 2, 28, 3.0),
        (2024, 2, 29, 99.0),
        (2024, 3, 1, 4.0),
    ] {
        rows.push((at(y, m, d, 12, 0), v));
    }
    let data = write(dir.path(), "gas.csv", &csv_series("gas", &rows));

    let output = run_pipeline(&format!(
        "[csv]\nfile_path = '{}'\n\n[daily]\naggfunc = \"max\"\n",
        data
    ));

    assert_eq!(output.series_sets.len(), 1);
    let set = &output.series_sets[0];
    assert_eq!(set.title, "gas - Daily max over the year");
    assert_eq!(set.x_axis, Axis::DayOfYear { reference_year: 2021 });

    let y2024 = set.find("2024").unwrap();
    assert!(y2024.points.iter().all(|(_, v)| *v != Some(99.0)));
    assert_eq!(y2024.value_at(58.0), Some(3.0));
    assert_eq!(y2024.value_at(59.0), Some(4.0));
    assert_eq!(set.find("2021").unwrap().value_at(58.0), Some(1.0));
}

#[test]
fn hourly_profile_needs_twelve_points() {
    let dir = TempDir::new().unwrap();
    let mut rows: Vec<(NaiveDateTime, f64)> = (0..10)
        .map(|h| (at(2020, 6, 1, 0, 0) + Duration::hours(h), h as f64))
        .collect();
    rows.extend((0..12).map(|h| (at(2021, 6, 1, 0, 0) + Duration::hours(h), 10.0 + h as f64)));
    let data = write(dir.path(), "elec.csv", &csv_series("elec", &rows));

    let output = run_pipeline(&format!("[csv]\nfile_path = '{}'\n\n[hourly]\n", data));

    assert_eq!(output.series_sets.len(), 1);
    let set = &output.series_sets[0];
    assert_eq!(set.title, "elec - Hourly mean over the day");
    let labels: Vec<_> = set.series.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["2021"]);
    let last = set.series[0].points.last().unwrap();
    assert_eq!(*last, (24.0, Some(10.0)));
    assert!(output.diagnostics.contains(LogLevel::Info, "Insufficient data (10)"));
}

#[test]
fn weekly_profile_by_weekend() {
    let dir = TempDir::new().unwrap();
    // Monday 2021-01-04, one week of hourly samples.
    let rows: Vec<(NaiveDateTime, f64)> = (0..24 * 7)
        .map(|h| (at(2021, 1, 4, 0, 0) + Duration::hours(h), if h < 24 * 5 { 1.0 } else { 3.0 }))
        .collect();
    let data = write(dir.path(), "elec.csv", &csv_series("elec", &rows));

    let output = run_pipeline(&format!(
        "[csv]\nfile_path = '{}'\n\n[weekly]\nsort_by = \"weekend\"\n",
        data
    ));

    let set = &output.series_sets[0];
    assert_eq!(set.title, "elec - Trend over the week");
    let labels: Vec<_> = set.series.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["Work day", "Weekend", "Daily mean"]);
    assert_eq!(set.find("Work day").unwrap().points.len(), 24 * 5);
    assert_eq!(set.find("Weekend").unwrap().value_at(5.5), Some(3.0));

    let step = set.find("Daily mean").unwrap();
    assert_eq!(step.style, SeriesStyle::Step);
    assert_eq!(step.points.first(), Some(&(0.0, Some(1.0))));
    assert_eq!(step.points.last(), Some(&(7.0, Some(3.0))));
}

#[test]
fn unknown_variable_lists_available_columns() {
    let dir = TempDir::new().unwrap();
    let data = write(dir.path(), "data.csv", &csv_series("v", &[(at(2021, 1, 1, 0, 0), 1.0)]));
    let config = PipelineConfig::from_toml_str(&format!(
        "[csv]\nfile_path = '{}'\n\n[weekly]\nvariables = [\"w\"]\n",
        data
    ))
    .unwrap();

    let err = run(&config).unwrap_err();
    match err.root() {
        ConsoError::UnknownVariable { name, available } => {
            assert_eq!(name, "w");
            assert_eq!(available, &vec!["v".to_string()]);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

#[test]
fn correlation_aligns_on_daily_series() {
    let dir = TempDir::new().unwrap();
    let start = at(2021, 1, 1, 0, 0);
    let hourly: Vec<(NaiveDateTime, f64)> = (0..100)
        .map(|h| (start + Duration::hours(h), 10.0 + (h % 24) as f64 / 2.0))
        .collect();
    let daily: Vec<(NaiveDateTime, f64)> = (0..10)
        .map(|d| (start + Duration::days(d) + Duration::hours(12), 20.0 - d as f64))
        .collect();
    let temp = write(dir.path(), "temp.csv", &csv_series("Temperature", &hourly));
    let gas = write(dir.path(), "gas.csv", &csv_series("Gas", &daily));

    let output = run_pipeline(&format!(
        "[temp]\nmodule = \"csv\"\nfile_path = '{}'\n\n[gas]\nmodule = \"csv\"\nfile_path = '{}'\n\n\
         [correlation]\nx_vars = \"Temperature\"\n",
        temp, gas
    ));

    assert_eq!(output.series_sets.len(), 1);
    let set = &output.series_sets[0];
    assert_eq!(set.title, "Gas vs Temperature");
    assert_eq!(set.y_label, "Gas");
    let series = &set.series[0];
    assert_eq!(series.label, "Mean values over 1 day");
    assert_eq!(series.style, SeriesStyle::Scatter);
    assert!(!series.points.is_empty());
    assert_eq!(series.value_count(), series.points.len());
    assert!(series.points.iter().all(|(x, _)| x.is_finite()));
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn configuration_errors_surface_before_running() {
    for toml in [
        "[plotter]\n",
        "[hourly]\nsort_by = \"season\"\n",
        "[filter]\nremove_duplicates = \"keep_all\"\n",
        "[daily]\nvariables = [\"gas\"]\nsmooth = 3\n",
    ] {
        let err = PipelineConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, ConsoError::Configuration(_)), "{}: {:?}", toml, err);
    }
}
