/// Pipeline file loading.
///
/// A pipeline file is TOML; each top-level table is one step, executed in
/// file order:
///
/// ```toml
/// [electricity]
/// dir_path = "data/elec"
///
/// [hourly_by_season]
/// module = "hourly"
/// sort_by = "hot-cold"
/// ```
///
/// `module` names a registry entry; without it the table name must be one.
/// Every option is deserialized into the step's typed configuration here,
/// so unknown modules, options and values fail before anything runs.

use std::fs;
use std::path::Path;

use toml::Value;

use crate::analysis::correlation::CorrelationConfig;
use crate::analysis::daily::DailyConfig;
use crate::analysis::hourly::HourlyConfig;
use crate::analysis::weekly::WeeklyConfig;
use crate::filter::FilterConfig;
use crate::ingest::{ElectricitySource, GasSource, LineProtocolSource, SourceDescriptor, TabularSource};
use crate::inspect::InspectConfig;
use crate::model::{ConsoError, Result};
use crate::registry::{ModuleId, StepKind, find_module, module_names};

const MODULE_KEY: &str = "module";

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Daily(DailyConfig),
    Hourly(HourlyConfig),
    Weekly(WeeklyConfig),
}

/// A typed pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Read(SourceDescriptor),
    Filter(FilterConfig),
    Aggregate(Aggregation),
    Correlate(CorrelationConfig),
    Inspect(InspectConfig),
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Read(_) => StepKind::Read,
            Step::Filter(_) => StepKind::Filter,
            Step::Aggregate(_) => StepKind::Aggregate,
            Step::Correlate(_) => StepKind::Correlate,
            Step::Inspect(_) => StepKind::Inspect,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    /// Table name in the pipeline file.
    pub name: String,
    /// Registry name of the module.
    pub module: &'static str,
    pub step: Step,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub steps: Vec<PipelineStep>,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ConsoError::SourceNotFound {
                path: path.to_path_buf(),
                hint: "pipeline file missing".to_string(),
            },
            _ => ConsoError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let document: toml::Table =
            toml::from_str(content).map_err(|e: toml::de::Error| ConsoError::Configuration(e.to_string()))?;

        let mut steps = Vec::with_capacity(document.len());
        for (name, value) in document {
            steps.push(parse_step(name, value)?);
        }
        Ok(PipelineConfig { steps })
    }
}

fn parse_step(name: String, value: Value) -> Result<PipelineStep> {
    let Value::Table(mut params) = value else {
        return Err(ConsoError::Configuration(format!(
            "step '{}' must be a table of options",
            name
        )));
    };

    let module_name = match params.remove(MODULE_KEY) {
        Some(Value::String(module)) => module,
        Some(other) => {
            return Err(ConsoError::Configuration(format!(
                "step '{}': module must be a string, got {}",
                name,
                other.type_str()
            )));
        }
        None => name.clone(),
    };
    let module = find_module(&module_name).ok_or_else(|| {
        ConsoError::Configuration(format!(
            "step '{}': unknown module '{}', expected one of {:?}",
            name,
            module_name,
            module_names()
        ))
    })?;

    let options = Value::Table(params);
    let invalid = |e: toml::de::Error| ConsoError::Configuration(format!("step '{}': {}", name, e.message()));
    let step = match module.id {
        ModuleId::Tabular => Step::Read(SourceDescriptor::Tabular(options.try_into::<TabularSource>().map_err(invalid)?)),
        ModuleId::Electricity => {
            Step::Read(SourceDescriptor::Electricity(options.try_into::<ElectricitySource>().map_err(invalid)?))
        }
        ModuleId::Gas => Step::Read(SourceDescriptor::Gas(options.try_into::<GasSource>().map_err(invalid)?)),
        ModuleId::LineProtocol => {
            Step::Read(SourceDescriptor::LineProtocol(options.try_into::<LineProtocolSource>().map_err(invalid)?))
        }
        ModuleId::Filter => Step::Filter(options.try_into().map_err(invalid)?),
        ModuleId::Inspect => Step::Inspect(options.try_into().map_err(invalid)?),
        ModuleId::Daily => Step::Aggregate(Aggregation::Daily(options.try_into().map_err(invalid)?)),
        ModuleId::Hourly => Step::Aggregate(Aggregation::Hourly(options.try_into().map_err(invalid)?)),
        ModuleId::Weekly => Step::Aggregate(Aggregation::Weekly(options.try_into().map_err(invalid)?)),
        ModuleId::Correlation => Step::Correlate(options.try_into().map_err(invalid)?),
    };

    Ok(PipelineStep {
        name,
        module: module.name,
        step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::grouping::GroupingCondition;
    use crate::filter::DedupMode;
    use crate::model::Aggregator;
    use crate::resample::Frequency;

    fn configuration_error(content: &str) -> String {
        match PipelineConfig::from_toml_str(content) {
            Err(ConsoError::Configuration(msg)) => msg,
            other => panic!("expected a configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_steps_keep_file_order() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [gas]
            dir_path = "data/gas"

            [electricity]
            dir_path = "data/elec"
            variable_name = "Elec"

            [filter]
            resample = "1h"

            [by_season]
            module = "hourly"
            sort_by = "hot-cold"
            aggfunc = "sum"

            [daily]
            "#,
        )
        .unwrap();

        let names: Vec<_> = config.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["gas", "electricity", "filter", "by_season", "daily"]);
        assert_eq!(config.steps[3].module, "hourly");

        match &config.steps[1].step {
            Step::Read(SourceDescriptor::Electricity(src)) => {
                assert_eq!(src.variable_name, "Elec");
                assert_eq!(src.fname_glob, "mes-puissances-atteintes-30min-*.csv");
            }
            other => panic!("unexpected step {:?}", other),
        }
        match &config.steps[2].step {
            Step::Filter(filter) => {
                assert_eq!(filter.resample, Some(Frequency::hours(1)));
                assert_eq!(filter.remove_duplicates, Some(DedupMode::KeepLast));
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(
            config.steps[3].step,
            Step::Aggregate(Aggregation::Hourly(HourlyConfig {
                variables: Vec::new(),
                sort_by: GroupingCondition::BySeasonHotCold,
                aggfunc: Aggregator::Sum,
            }))
        );
        assert_eq!(config.steps[4].step, Step::Aggregate(Aggregation::Daily(DailyConfig::default())));
        assert_eq!(config.steps[4].step.kind(), StepKind::Aggregate);
    }

    #[test]
    fn test_unknown_module() {
        assert!(configuration_error("[plot]\nvariables = []").contains("unknown module 'plot'"));
        assert!(configuration_error("[x]\nmodule = \"daily_plotter\"").contains("unknown module"));
    }

    #[test]
    fn test_unknown_option() {
        let msg = configuration_error("[daily]\nrolling = 3");
        assert!(msg.starts_with("step 'daily'"), "{}", msg);
    }

    #[test]
    fn test_invalid_values_fail_at_load() {
        configuration_error("[weekly]\nsort_by = \"month\"");
        configuration_error("[filter]\nremove_duplicates = \"keep_middle\"");
        configuration_error("[filter]\nquery = \"(a > 1\"");
        configuration_error("[daily]\naggfunc = \"average\"");
        configuration_error("[gas]\nfname_glob = \"*.csv\"");
    }

    #[test]
    fn test_step_must_be_a_table() {
        assert!(configuration_error("daily = 3").contains("must be a table"));
        assert!(configuration_error("[a]\nmodule = 1").contains("module must be a string"));
    }

    #[test]
    fn test_missing_pipeline_file() {
        let err = PipelineConfig::load(Path::new("/no/such/pipeline.toml")).unwrap_err();
        assert!(matches!(err, ConsoError::SourceNotFound { .. }));
    }
}
