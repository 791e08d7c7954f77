//! # sv_timeseries - SEVIRD state log post-processing
//!
//! Turns the state log of a cell-based SEIR/SEVIRD epidemic simulator
//! (`pandemic_state.txt`) into population-wide and per-region timeseries.
//!
//! ## Core Components
//!
//! - **LogReader**: streams the log into time markers and region observations
//! - **RegionStore**: latest state per region, population fixed at first sight
//! - **Aggregator**: population-wide fractions per time, with conservation check
//! - **Normalizer**: per-region percentage and head-count rows
//! - **Emitter**: delimited text files and the in-memory plotting frame
//!
//! ```no_run
//! use std::path::Path;
//! use sv_timeseries::{run_aggregate, TimeseriesConfig};
//!
//! let log_dir = Path::new("logs/run1");
//! let config = TimeseriesConfig::resolve(log_dir, None)?;
//! let series = run_aggregate(log_dir, &config, None)?;
//! println!("{} steps", series.rows.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core extraction modules
pub mod sv_aggregator;
pub mod sv_emitter;
pub mod sv_interface;
pub mod sv_log_reader;
pub mod sv_normalizer;
pub mod sv_region_store;

// Ambient
pub mod sv_cli;
pub mod sv_config;
pub mod sv_error;
pub mod sv_pipeline;
pub mod sv_progress;

// Re-export commonly used types
pub use sv_aggregator::Aggregator;
pub use sv_config::{ConservationBounds, TimeseriesConfig};
pub use sv_emitter::{emit, read_timeseries, CsvRowSink, RowSink, TimeseriesFrame, TimeseriesHeader};
pub use sv_error::PipelineError;
pub use sv_interface::{
    AggregateRow, Compartment, LogEvent, RegionId, RegionPercentRow, RegionTotalsRow, SimTime,
    StateVector, TimeseriesRow,
};
pub use sv_log_reader::{read_log, LogReader};
pub use sv_normalizer::Normalizer;
pub use sv_pipeline::{aggregate_events, region_events, run_aggregate, run_per_region};
pub use sv_progress::{CancelToken, ProgressIndicator};
pub use sv_region_store::RegionStore;
