// Region Timeseries - percentage and totals series for every region
//
// Usage:
//   cargo run --bin region_timeseries -- -log-dir=logs/run1
//
// Writes <log-dir>/stats/per-region/region_<id>/region_<id>_{percentage,totals}_timeseries.csv

use std::env;

use sv_timeseries::sv_cli::{main_with, RunMode};

fn main() {
    let code = main_with(RunMode::PerRegion, env::args().collect());
    std::process::exit(code);
}
