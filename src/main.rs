use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use suiviconso::logging::{LogLevel, init_logger};
use suiviconso::model::SeriesSet;
use suiviconso::registry::MODULE_REGISTRY;
use suiviconso::{PipelineConfig, run};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LevelArg {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<LevelArg> for LogLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Debug => LogLevel::Debug,
            LevelArg::Info => LogLevel::Info,
            LevelArg::Warning => LogLevel::Warning,
            LevelArg::Error => LogLevel::Error,
        }
    }
}

#[derive(Parser)]
#[command(name = "suiviconso")]
#[command(about = "Read, filter and profile utility consumption data")]
struct Cli {
    /// Pipeline file (TOML)
    #[arg(required_unless_present = "list_modules")]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, value_enum, default_value = "info")]
    log_level: LevelArg,

    /// Write each series set as JSON into this directory
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// List the modules a pipeline file can use
    #[arg(long)]
    list_modules: bool,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logger(cli.log_level.into());

    if cli.list_modules {
        for module in MODULE_REGISTRY {
            println!("{:<14} {}", module.name, module.description);
        }
        return ExitCode::SUCCESS;
    }

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let Some(config_path) = &cli.config else {
        return Err("no pipeline file given".into());
    };
    let config = PipelineConfig::load(config_path)?;
    tracing::info!("Loaded {} steps from {}", config.steps.len(), config_path.display());

    let output = run(&config)?;

    for summary in &output.summaries {
        println!("{}", summary);
    }

    for set in &output.series_sets {
        let points: usize = set.series.iter().map(|s| s.value_count()).sum();
        println!("{}: {} series, {} points", set.title, set.series.len(), points);
    }

    if let Some(dir) = &cli.export_dir {
        fs::create_dir_all(dir)?;
        for set in &output.series_sets {
            let path = export_set(dir, set)?;
            tracing::info!("Saved '{}' to {}", set.title, path.display());
        }
    }

    Ok(())
}

/// File name derived from the title: alphanumerics kept, everything else
/// collapsed to `_`.
fn export_file_name(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    format!("{}.json", name.trim_matches('_'))
}

fn export_set(dir: &Path, set: &SeriesSet) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = dir.join(export_file_name(&set.title));
    fs::write(&path, serde_json::to_string_pretty(set)?)?;
    Ok(path)
}
