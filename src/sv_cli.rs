// command line surface shared by the two binaries

use std::path::{Path, PathBuf};

use log::info;
use simple_logger::SimpleLogger;
use thiserror::Error;

use crate::sv_config::TimeseriesConfig;
use crate::sv_error::PipelineError;
use crate::sv_interface::SimTime;
use crate::sv_pipeline::{run_aggregate, run_per_region};
use crate::sv_progress::{CancelToken, ProgressIndicator};

/// Exit status for every failed run
pub const FAILURE_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Aggregate,
    PerRegion,
}

impl RunMode {
    fn label(self) -> &'static str {
        match self {
            RunMode::Aggregate => "aggregating timeseries",
            RunMode::PerRegion => "generating region timeseries",
        }
    }

    fn title(self) -> &'static str {
        match self {
            RunMode::Aggregate => "Aggregate Timeseries",
            RunMode::PerRegion => "Per-Region Timeseries",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("Must set a log folder path using the flag -log-dir=<path to logs folder>")]
    MissingLogDir,

    #[error("flag {0} needs a value: {0}=<value>")]
    MissingValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub log_dir: PathBuf,
    pub progress: bool,
    pub config: Option<PathBuf>,
}

impl CliArgs {
    /// Parse flags (program name already removed). Unknown flags are ignored.
    pub fn parse<I, S>(args: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut log_dir = None;
        let mut progress = true;
        let mut config = None;

        for arg in args {
            let arg = arg.as_ref();
            let (key, value) = match arg.split_once('=') {
                Some((key, value)) => (key.to_lowercase(), Some(value)),
                None => (arg.to_lowercase(), None),
            };

            match key.as_str() {
                "--no-progress" | "-np" => progress = false,
                "-log-dir" | "--log-dir" | "-ld" => {
                    let value = value.ok_or_else(|| ArgsError::MissingValue(key.clone()))?;
                    if !value.is_empty() {
                        log_dir = Some(PathBuf::from(value));
                    }
                }
                "-config" | "--config" | "-c" => {
                    let value = value.ok_or_else(|| ArgsError::MissingValue(key.clone()))?;
                    config = Some(PathBuf::from(value));
                }
                _ => {}
            }
        }

        Ok(Self {
            log_dir: log_dir.ok_or(ArgsError::MissingLogDir)?,
            progress,
            config,
        })
    }
}

pub fn usage(program: &str) -> String {
    format!(
        "Usage: {} -log-dir=<path to logs folder> [--no-progress | -np] [-config=<file.yaml>]",
        program
    )
}

/// Outcome of a successful run, for the terminal
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub mode: RunMode,
    pub rows: usize,
    pub regions: usize,
    pub total_population: f64,
    pub booster_count: usize,
    pub peak_infected: Option<(SimTime, f64)>,
    pub output: PathBuf,
}

impl RunSummary {
    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║  {:<54}║", self.mode.title());
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("  Rows: {}", self.rows);
        println!("  Regions: {}", self.regions);
        println!("  Total population: {:.0}", self.total_population);
        println!("  Booster doses: {}", self.booster_count);
        if let Some((time, fraction)) = self.peak_infected {
            println!("  Peak infected: {:.2}% at time {}", fraction * 100.0, time);
        }
        println!("  Output: {}\n", self.output.display());
    }
}

/// Run one extraction mode with an already resolved config
pub fn run(
    mode: RunMode,
    log_dir: &Path,
    config: &TimeseriesConfig,
    cancel: Option<&CancelToken>,
) -> Result<RunSummary, PipelineError> {
    match mode {
        RunMode::Aggregate => {
            let series = run_aggregate(log_dir, config, cancel)?;
            Ok(RunSummary {
                mode,
                rows: series.rows.len(),
                regions: series.regions,
                total_population: series.total_population,
                booster_count: series.booster_count,
                peak_infected: series.peak_infected(),
                output: config.aggregate_path(log_dir),
            })
        }
        RunMode::PerRegion => {
            let set = run_per_region(log_dir, config, cancel)?;
            Ok(RunSummary {
                mode,
                rows: set.regions.values().map(|r| r.percentages.len()).sum(),
                regions: set.regions.len(),
                total_population: set.total_population(),
                booster_count: set.booster_count,
                peak_infected: None,
                output: config.per_region_path(log_dir),
            })
        }
    }
}

/// A run that finished after an interrupt arrived still counts as interrupted
fn settle(
    result: Result<RunSummary, PipelineError>,
    cancel: &CancelToken,
) -> Result<RunSummary, PipelineError> {
    match result {
        Ok(_) if cancel.is_cancelled() => Err(PipelineError::Interrupted),
        other => other,
    }
}

/// One diagnostic line per fatal error
pub fn report(error: &PipelineError) {
    match error {
        PipelineError::Interrupted => eprintln!("\n\x1b[33mStopped by user\x1b[0m"),
        e if e.is_structural() => eprintln!("\n\x1b[31mASSERT:\x1b[0m {}", e),
        e => eprintln!("\n\x1b[31m{}\x1b[0m", e),
    }
}

/// Binary entry point: returns the process exit code
pub fn main_with(mode: RunMode, args: Vec<String>) -> i32 {
    let program = args.first().cloned().unwrap_or_else(|| "timeseries".to_string());

    let cli = match CliArgs::parse(args.iter().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("\n\x1b[31mASSERT:\x1b[0m {}", e);
            eprintln!("{}", usage(&program));
            return FAILURE_EXIT_CODE;
        }
    };

    let config = match TimeseriesConfig::resolve(&cli.log_dir, cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report(&e);
            return FAILURE_EXIT_CODE;
        }
    };

    if let Err(e) = SimpleLogger::new().with_level(config.level_filter()).init() {
        eprintln!("logger already initialised: {}", e);
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            log::warn!("interrupt handler not installed: {}", e);
        }
    }

    info!("log folder: {}", cli.log_dir.display());
    let progress = ProgressIndicator::start(mode.label(), cli.progress);
    let result = settle(run(mode, &cli.log_dir, &config, Some(&cancel)), &cancel);
    progress.finish(result.is_ok());

    match result {
        Ok(summary) => {
            if !cli.progress {
                println!("\x1b[1;32mDone.\x1b[0m");
            }
            summary.print_summary();
            0
        }
        Err(e) => {
            report(&e);
            FAILURE_EXIT_CODE
        }
    }
}
