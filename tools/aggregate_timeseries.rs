// Aggregate Timeseries - population-wide fractions per simulation time
//
// Usage:
//   cargo run --bin aggregate_timeseries -- -log-dir=logs/run1
//   cargo run --bin aggregate_timeseries -- -ld=logs/run1 --no-progress
//
// Writes <log-dir>/stats/aggregate/aggregate_timeseries.csv and <log-dir>/states.csv

use std::env;

use sv_timeseries::sv_cli::{main_with, RunMode};

fn main() {
    let code = main_with(RunMode::Aggregate, env::args().collect());
    std::process::exit(code);
}
