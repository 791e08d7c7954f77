//! Error taxonomy for the extraction pipelines.
//!
//! Malformed log lines are not errors: the reader drops them. Everything in
//! `PipelineError` is fatal and ends the run with a single diagnostic.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::sv_interface::{RegionId, SimTime};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Population fractions no longer add up to the whole population
    #[error("{}", conservation_message(.time, .sum, .lower, .upper, .region))]
    Conservation {
        time: SimTime,
        sum: f64,
        lower: f64,
        upper: f64,
        /// Set by the per-region check, `None` for the aggregate check
        region: Option<RegionId>,
    },

    /// A region carries a different number of booster fields than the run-wide count
    #[error("region {region} has {found} booster fields at time {time}, expected {expected}")]
    BoosterMismatch {
        time: SimTime,
        region: RegionId,
        expected: usize,
        found: usize,
    },

    /// Total population is zero when a snapshot is aggregated
    #[error("total population is zero at time {time}")]
    EmptyPopulation { time: SimTime },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// An emitted timeseries file could not be read back
    #[error("{context}: {source}")]
    Csv {
        context: String,
        #[source]
        source: csv::Error,
    },

    #[error("timeseries line {line}: {reason}")]
    Timeseries { line: u64, reason: String },

    #[error("invalid config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("stopped by user")]
    Interrupted,
}

fn conservation_message(
    time: &SimTime,
    sum: &f64,
    lower: &f64,
    upper: &f64,
    region: &Option<RegionId>,
) -> String {
    match region {
        Some(region) => format!(
            "conservation sum {} outside [{}, {}] for region {} at time {}",
            sum, lower, upper, region, time
        ),
        None => format!(
            "conservation sum {} outside [{}, {}] at time {}",
            sum, lower, upper, time
        ),
    }
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn csv(context: impl Into<String>, source: csv::Error) -> Self {
        PipelineError::Csv {
            context: context.into(),
            source,
        }
    }

    /// Simulation time the failure refers to, if any
    pub fn sim_time(&self) -> Option<SimTime> {
        match self {
            PipelineError::Conservation { time, .. }
            | PipelineError::BoosterMismatch { time, .. }
            | PipelineError::EmptyPopulation { time } => Some(*time),
            _ => None,
        }
    }

    /// Conservation and booster-layout failures mean the log itself is inconsistent
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            PipelineError::Conservation { .. }
                | PipelineError::BoosterMismatch { .. }
                | PipelineError::EmptyPopulation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conservation_message_names_time() {
        let err = PipelineError::Conservation {
            time: 7,
            sum: 0.8,
            lower: 0.95,
            upper: 1.05,
            region: None,
        };
        assert_eq!(err.sim_time(), Some(7));
        assert!(err.is_structural());
        assert!(err.to_string().contains("at time 7"));

        let err = PipelineError::Conservation {
            time: 3,
            sum: 1.2,
            lower: 0.95,
            upper: 1.05,
            region: Some("12".to_string()),
        };
        assert!(err.to_string().contains("region 12 at time 3"));
    }

    #[test]
    fn test_io_error_is_not_structural() {
        let err = PipelineError::io(
            "open log",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(err.sim_time(), None);
        assert!(!err.is_structural());
        assert_eq!(err.to_string(), "open log: missing");
    }
}
