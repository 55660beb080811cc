//! The pipeline run: a fold over typed steps.
//!
//! The run state holds the accumulator table, the series sets and table
//! summaries emitted so far, and the diagnostics. Each step takes the state
//! and returns the next one; the first failing step aborts the run with
//! its error wrapped in `ConsoError::Step`.

use crate::analysis::{correlation, daily, hourly, weekly};
use crate::config::{Aggregation, PipelineConfig, PipelineStep, Step};
use crate::filter;
use crate::inspect::{self, TableSummary};
use crate::logging::{Diagnostics, Stage};
use crate::merge::merge;
use crate::model::{ConsoError, Result, SeriesSet};
use crate::table::Table;

/// Everything a run produces.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub table: Table,
    pub series_sets: Vec<SeriesSet>,
    pub summaries: Vec<TableSummary>,
    pub diagnostics: Diagnostics,
}

pub fn run(config: &PipelineConfig) -> Result<RunOutput> {
    run_steps(&config.steps)
}

pub fn run_steps(steps: &[PipelineStep]) -> Result<RunOutput> {
    steps.iter().try_fold(RunOutput::default(), |state, step| {
        tracing::debug!(step = %step.name, module = step.module, "running step");
        apply_step(state, &step.step).map_err(|e| ConsoError::Step {
            step: step.name.clone(),
            source: Box::new(e),
        })
    })
}

fn apply_step(mut state: RunOutput, step: &Step) -> Result<RunOutput> {
    let diag = &mut state.diagnostics;
    match step {
        Step::Read(source) => {
            let table = source.read(diag)?;
            if table.is_empty() {
                diag.warn(Stage::Read, "Source produced no data");
            }
            state.table = merge(&state.table, table, diag);
        }
        Step::Filter(config) => {
            state.table = filter::apply(&state.table, config, diag)?;
        }
        Step::Aggregate(aggregation) => {
            let sets = match aggregation {
                Aggregation::Daily(config) => daily::daily_overlay(&state.table, config, diag)?,
                Aggregation::Hourly(config) => hourly::hourly_profile(&state.table, config, diag)?,
                Aggregation::Weekly(config) => weekly::weekly_profile(&state.table, config, diag)?,
            };
            state.series_sets.extend(sets);
        }
        Step::Correlate(config) => {
            let sets = correlation::correlate(&state.table, config, diag)?;
            state.series_sets.extend(sets);
        }
        Step::Inspect(config) => {
            let summary = inspect::inspect(&state.table, config, diag)?;
            state.summaries.push(summary);
        }
    }
    Ok(state)
}
