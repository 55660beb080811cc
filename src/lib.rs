//! Utility consumption pipeline.
//!
//! Reads electricity, gas and sensor exports into one time-indexed table,
//! filters it, and derives daily, hourly and weekly profiles and
//! cross-variable correlations as labeled series for plotting callers.
//!
//! Modules:
//! - `ingest`: source readers.
//! - `merge` / `filter`: table combination and the filter chain.
//! - `analysis`: aggregations and correlation.
//! - `config` / `registry` / `pipeline`: pipeline files and their run.

pub mod analysis;
pub mod config;
pub mod filter;
pub mod ingest;
pub mod inspect;
pub mod logging;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod resample;
pub mod table;
pub mod timefmt;

pub use config::PipelineConfig;
pub use model::{ConsoError, Result, SeriesSet};
pub use pipeline::{RunOutput, run};
pub use table::Table;
