//! Run configuration.
//!
//! Every field has a default, so a config file only needs the keys it
//! overrides. Loaded from YAML:
//!
//! ```yaml
//! log_file: pandemic_state.txt
//! conservation:
//!   lower: 0.99
//!   upper: 1.01
//! parallel_regions: false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::Deserialize;

use crate::sv_error::PipelineError;

/// Config file picked up from the log folder when no explicit path is given
pub const DEFAULT_CONFIG_FILE: &str = "timeseries.yaml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeseriesConfig {
    /// State log file name, relative to the log folder
    pub log_file: String,

    /// Output folder for the aggregate timeseries, relative to the log folder
    pub aggregate_dir: String,

    /// Output folder for the per-region timeseries, relative to the log folder
    pub per_region_dir: String,

    /// Plotting frame dumped next to the log (aggregate mode), `None` to skip
    pub frame_file: Option<String>,

    /// Accepted band for the conservation sum
    pub conservation: ConservationBounds,

    /// Logger level: off, error, warn, info, debug, trace
    pub log_level: String,

    /// Write per-region files on the rayon pool
    pub parallel_regions: bool,
}

impl Default for TimeseriesConfig {
    fn default() -> Self {
        Self {
            log_file: "pandemic_state.txt".to_string(),
            aggregate_dir: "stats/aggregate".to_string(),
            per_region_dir: "stats/per-region".to_string(),
            frame_file: Some("states.csv".to_string()),
            conservation: ConservationBounds::default(),
            log_level: "warn".to_string(),
            parallel_regions: true,
        }
    }
}

/// Inclusive band around 1.0 that a conservation sum must fall in
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConservationBounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for ConservationBounds {
    fn default() -> Self {
        Self {
            lower: 0.95,
            upper: 1.05,
        }
    }
}

impl ConservationBounds {
    pub fn contains(&self, sum: f64) -> bool {
        sum >= self.lower && sum <= self.upper
    }
}

impl TimeseriesConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let yaml = fs::read_to_string(path)
            .map_err(|e| PipelineError::io(format!("read config {}", path.display()), e))?;
        Self::from_yaml_str(&yaml).map_err(|source| PipelineError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Explicit file, else `<log_dir>/timeseries.yaml` if present, else defaults
    pub fn resolve(log_dir: &Path, explicit: Option<&Path>) -> Result<Self, PipelineError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = log_dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Unknown level names fall back to `Warn`
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Warn)
    }

    pub fn log_path(&self, log_dir: &Path) -> PathBuf {
        log_dir.join(&self.log_file)
    }

    pub fn aggregate_path(&self, log_dir: &Path) -> PathBuf {
        log_dir.join(&self.aggregate_dir)
    }

    pub fn per_region_path(&self, log_dir: &Path) -> PathBuf {
        log_dir.join(&self.per_region_dir)
    }

    pub fn frame_path(&self, log_dir: &Path) -> Option<PathBuf> {
        self.frame_file.as_ref().map(|f| log_dir.join(f))
    }
}
