//! Aggregate and per-region extraction drivers.
//!
//! Both drivers work on a fully buffered event list. The aggregate driver
//! replays it twice: once to fix every region's population, then once to
//! capture states and reduce a snapshot each time the simulation time moves.
//! The per-region driver needs a single pass.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{info, warn};
use rayon::prelude::*;

use crate::sv_aggregator::Aggregator;
use crate::sv_config::{ConservationBounds, TimeseriesConfig};
use crate::sv_emitter::{emit_to_path, TimeseriesFrame, TimeseriesHeader};
use crate::sv_error::PipelineError;
use crate::sv_interface::{
    AggregateRow, Compartment, LogEvent, RegionId, RegionPercentRow, RegionTotalsRow, SimTime,
};
use crate::sv_log_reader::read_log;
use crate::sv_normalizer::Normalizer;
use crate::sv_progress::CancelToken;
use crate::sv_region_store::RegionStore;

pub const AGGREGATE_FILE: &str = "aggregate_timeseries.csv";

// ============================================================================
// Aggregate mode
// ============================================================================

/// Result of aggregating a whole log
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSeries {
    pub rows: Vec<AggregateRow>,
    pub booster_count: usize,
    pub regions: usize,
    pub total_population: f64,
}

impl AggregateSeries {
    pub fn header(&self) -> TimeseriesHeader {
        TimeseriesHeader::aggregate(self.booster_count)
    }

    /// Rows as the plotting frame (`time, susceptible, ..., error`)
    pub fn frame(&self) -> TimeseriesFrame {
        TimeseriesFrame::from_rows(&self.rows, &TimeseriesHeader::frame(self.booster_count))
    }

    /// Time and fraction of the highest infected share
    pub fn peak_infected(&self) -> Option<(SimTime, f64)> {
        self.rows
            .iter()
            .map(|row| (row.time, row.fraction(Compartment::Infected)))
            .fold(None, |best, (time, fraction)| match best {
                Some((_, f)) if f >= fraction => best,
                _ => Some((time, fraction)),
            })
    }
}

/// Fix every region's population from the buffered log.
///
/// Observations before the first time marker are not part of any step and
/// are left out here as well.
fn discover_populations(events: &[LogEvent], store: &mut RegionStore) {
    let mut timed = false;
    for event in events {
        match event {
            LogEvent::TimeMarker(_) => timed = true,
            LogEvent::RegionObservation { region, state } if timed => {
                store.register_population(region, state.population());
            }
            LogEvent::RegionObservation { .. } => {}
        }
    }
}

/// Reduce buffered events into one aggregate row per distinct time.
///
/// Stops at the first failing step; rows after it are never produced.
pub fn aggregate_events(
    events: &[LogEvent],
    bounds: ConservationBounds,
) -> Result<AggregateSeries, PipelineError> {
    let mut store = RegionStore::new();
    discover_populations(events, &mut store);
    let total_population = store.total_population();

    let mut aggregator = Aggregator::new(bounds);
    let mut rows = Vec::new();
    let mut current_time: Option<SimTime> = None;
    let mut untimed = 0usize;

    for event in events {
        match event {
            LogEvent::TimeMarker(time) => {
                if current_time == Some(*time) {
                    continue;
                }
                if let Some(previous) = current_time {
                    let snapshot = store.snapshot(previous);
                    if !snapshot.is_empty() {
                        rows.push(aggregator.reduce(&snapshot, total_population)?);
                    }
                }
                current_time = Some(*time);
            }
            LogEvent::RegionObservation { region, state } => {
                if current_time.is_none() {
                    untimed += 1;
                    continue;
                }
                store.observe(region, state.clone());
            }
        }
    }

    if let Some(last) = current_time {
        let snapshot = store.snapshot(last);
        if !snapshot.is_empty() {
            rows.push(aggregator.reduce(&snapshot, total_population)?);
        }
    }

    if untimed > 0 {
        warn!("ignored {} region lines before the first time marker", untimed);
    }

    Ok(AggregateSeries {
        rows,
        booster_count: aggregator.booster_count().unwrap_or(0),
        regions: store.len(),
        total_population,
    })
}

/// Parse `<log_dir>/<log_file>` and write the aggregate timeseries
pub fn run_aggregate(
    log_dir: &Path,
    config: &TimeseriesConfig,
    cancel: Option<&CancelToken>,
) -> Result<AggregateSeries, PipelineError> {
    let out_dir = config.aggregate_path(log_dir);
    let frame_path = config.frame_path(log_dir);
    clear_dir(&out_dir)?;
    if let Some(frame_path) = &frame_path {
        clear_file(frame_path)?;
    }

    let log_path = config.log_path(log_dir);
    info!("aggregating {}", log_path.display());
    let events = read_log(&log_path, cancel)?;
    let series = aggregate_events(&events, config.conservation)?;
    check_cancel(cancel)?;

    fs::create_dir_all(&out_dir)
        .map_err(|e| PipelineError::io(format!("create {}", out_dir.display()), e))?;
    let out_file = out_dir.join(AGGREGATE_FILE);
    emit_to_path(&series.rows, &series.header(), &out_file)?;
    info!("wrote {} rows to {}", series.rows.len(), out_file.display());

    if let Some(frame_path) = &frame_path {
        check_cancel(cancel)?;
        series.frame().write_csv_path(frame_path)?;
    }

    check_cancel(cancel)?;
    Ok(series)
}

// ============================================================================
// Per-region mode
// ============================================================================

/// Rows of one region, one per simulation time it was observed at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSeries {
    pub population: f64,
    pub percentages: Vec<RegionPercentRow>,
    pub totals: Vec<RegionTotalsRow>,
}

impl RegionSeries {
    fn push(&mut self, percent: RegionPercentRow, totals: RegionTotalsRow) {
        // a region seen twice in one step keeps its latest state
        if self.percentages.last().map(|r| r.time) == Some(percent.time) {
            self.percentages.pop();
            self.totals.pop();
        }
        self.percentages.push(percent);
        self.totals.push(totals);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSeriesSet {
    pub regions: IndexMap<RegionId, RegionSeries>,
    pub booster_count: usize,
}

impl RegionSeriesSet {
    pub fn header(&self) -> TimeseriesHeader {
        TimeseriesHeader::region(self.booster_count)
    }

    pub fn total_population(&self) -> f64 {
        self.regions.values().map(|r| r.population).sum()
    }
}

/// Normalize every observation in a single pass; populations are fixed as
/// each region first appears.
pub fn region_events(
    events: &[LogEvent],
    bounds: ConservationBounds,
) -> Result<RegionSeriesSet, PipelineError> {
    let normalizer = Normalizer::new(bounds);
    let mut store = RegionStore::new();
    let mut set = RegionSeriesSet::default();
    let mut booster_count: Option<usize> = None;
    let mut current_time: Option<SimTime> = None;
    let mut untimed = 0usize;

    for event in events {
        match event {
            LogEvent::TimeMarker(time) => current_time = Some(*time),
            LogEvent::RegionObservation { region, state } => {
                let time = match current_time {
                    Some(time) => time,
                    None => {
                        untimed += 1;
                        continue;
                    }
                };

                let boosters = *booster_count.get_or_insert_with(|| state.probe_booster_count());
                store.observe(region, state.clone());
                let population = store.population(region).unwrap_or_else(|| state.population());

                let (percent, totals) =
                    normalizer.normalize(time, region, population, state, boosters)?;

                let series = set.regions.entry(region.clone()).or_default();
                series.population = population;
                series.push(percent, totals);
            }
        }
    }

    if untimed > 0 {
        warn!("ignored {} region lines before the first time marker", untimed);
    }

    set.booster_count = booster_count.unwrap_or(0);
    Ok(set)
}

pub fn region_folder(region: &str) -> String {
    format!("region_{}", region)
}

/// `<out_dir>/region_<id>/region_<id>_{percentage,totals}_timeseries.csv`
pub fn region_files(out_dir: &Path, region: &str) -> (PathBuf, PathBuf, PathBuf) {
    let folder = region_folder(region);
    let dir = out_dir.join(&folder);
    let percentages = dir.join(format!("{}_percentage_timeseries.csv", folder));
    let totals = dir.join(format!("{}_totals_timeseries.csv", folder));
    (dir, percentages, totals)
}

fn write_region(
    out_dir: &Path,
    region: &str,
    series: &RegionSeries,
    header: &TimeseriesHeader,
    cancel: Option<&CancelToken>,
) -> Result<(), PipelineError> {
    check_cancel(cancel)?;
    let (dir, percentages, totals) = region_files(out_dir, region);
    fs::create_dir(&dir).map_err(|e| {
        PipelineError::io(format!("create folder for region {}", region), e)
    })?;
    emit_to_path(&series.percentages, header, &percentages)?;
    check_cancel(cancel)?;
    emit_to_path(&series.totals, header, &totals)
}

/// Parse `<log_dir>/<log_file>` and write two timeseries files per region
pub fn run_per_region(
    log_dir: &Path,
    config: &TimeseriesConfig,
    cancel: Option<&CancelToken>,
) -> Result<RegionSeriesSet, PipelineError> {
    let out_dir = config.per_region_path(log_dir);
    clear_dir(&out_dir)?;

    let log_path = config.log_path(log_dir);
    info!("splitting {} per region", log_path.display());
    let events = read_log(&log_path, cancel)?;
    let set = region_events(&events, config.conservation)?;
    check_cancel(cancel)?;

    fs::create_dir_all(&out_dir)
        .map_err(|e| PipelineError::io(format!("create {}", out_dir.display()), e))?;

    let header = set.header();
    if config.parallel_regions {
        set.regions
            .par_iter()
            .try_for_each(|(region, series)| {
                write_region(&out_dir, region, series, &header, cancel)
            })?;
    } else {
        for (region, series) in &set.regions {
            write_region(&out_dir, region, series, &header, cancel)?;
        }
    }
    check_cancel(cancel)?;
    info!("wrote {} regions to {}", set.regions.len(), out_dir.display());

    Ok(set)
}

fn check_cancel(cancel: Option<&CancelToken>) -> Result<(), PipelineError> {
    match cancel {
        Some(cancel) if cancel.is_cancelled() => Err(PipelineError::Interrupted),
        _ => Ok(()),
    }
}

/// Remove stale output before parsing; a missing folder is fine
fn clear_dir(dir: &Path) -> Result<(), PipelineError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::io(format!("clear {}", dir.display()), e)),
    }
}

fn clear_file(path: &Path) -> Result<(), PipelineError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::io(format!("clear {}", path.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv_interface::StateVector;
    use std::io::Cursor;
    use crate::sv_log_reader::LogReader;

    fn parse(text: &str) -> Vec<LogEvent> {
        LogReader::new(Cursor::new(text.to_string()))
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    const TWO_REGIONS: &str = "\
0
State for model _1 is <100,0.9,0.05,0,0,0.05,0,0.05,0.05,0,0>
State for model _2 is <200,0.95,0.03,0,0,0.02,0,0.03,0.02,0,0>
1
State for model _1 is <100,0.8,0.1,0,0,0.05,0.05,0.05,0.05,0.05,0>
";

    #[test]
    fn test_aggregate_two_regions() {
        let series = aggregate_events(&parse(TWO_REGIONS), ConservationBounds::default()).unwrap();
        assert_eq!(series.total_population, 300.0);
        assert_eq!(series.regions, 2);
        assert_eq!(series.rows.len(), 2);

        let first = &series.rows[0];
        assert_eq!(first.time, 0);
        assert!((first.fraction(Compartment::Susceptible) - 0.9333333333333333).abs() < 1e-9);
        assert!((first.conservation_sum - 1.0).abs() < 1e-9);

        // region 2 keeps its time 0 state in the time 1 snapshot
        let second = &series.rows[1];
        assert_eq!(second.time, 1);
        assert!((second.fraction(Compartment::Susceptible) - 270.0 / 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_marker_yields_one_row() {
        let log = "0\n_1 <100,1,0,0,0,0,0,0,0,0,0>\n0\n_1 <100,1,0,0,0,0,0,0,0,0,0>\n";
        let series = aggregate_events(&parse(log), ConservationBounds::default()).unwrap();
        assert_eq!(series.rows.len(), 1);

        // the buffered stream may also carry duplicates if built by hand
        let state = StateVector::from_fields(vec![100.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let events = vec![
            LogEvent::TimeMarker(3),
            LogEvent::RegionObservation { region: "a".into(), state },
            LogEvent::TimeMarker(3),
        ];
        let series = aggregate_events(&events, ConservationBounds::default()).unwrap();
        assert_eq!(series.rows.len(), 1);
        assert_eq!(series.rows[0].time, 3);
    }

    #[test]
    fn test_malformed_line_keeps_previous_state() {
        let log = "0\n_1 <100,1,0,0,0,0,0,0,0,0,0>\n1\n_1 <1,2>\n2\n";
        let series = aggregate_events(&parse(log), ConservationBounds::default()).unwrap();
        assert_eq!(series.rows.len(), 3);
        for row in &series.rows {
            assert_eq!(row.fraction(Compartment::Susceptible), 1.0);
        }
    }

    #[test]
    fn test_violation_aborts_without_later_rows() {
        let log = "\
0
_1 <100,1,0,0,0,0,0,0,0,0,0>
1
_1 <100,0.5,0.1,0,0,0.1,0.1,0,0,0,0>
2
_1 <100,1,0,0,0,0,0,0,0,0,0>
";
        let err = aggregate_events(&parse(log), ConservationBounds::default()).unwrap_err();
        assert_eq!(err.sim_time(), Some(1));
        assert!(matches!(err, PipelineError::Conservation { .. }));
    }

    #[test]
    fn test_untimed_observations_are_ignored() {
        let log = "_9 <1000,1,0,0,0,0,0,0,0,0,0>\n0\n_1 <100,1,0,0,0,0,0,0,0,0,0>\n";
        let series = aggregate_events(&parse(log), ConservationBounds::default()).unwrap();
        assert_eq!(series.total_population, 100.0);
        assert_eq!(series.rows.len(), 1);

        let set = region_events(&parse(log), ConservationBounds::default()).unwrap();
        assert_eq!(set.regions.len(), 1);
        assert!(set.regions.contains_key("1"));
    }

    #[test]
    fn test_empty_log_has_no_rows() {
        let series = aggregate_events(&[], ConservationBounds::default()).unwrap();
        assert!(series.rows.is_empty());
        assert_eq!(series.peak_infected(), None);
    }

    #[test]
    fn test_peak_infected() {
        let series = aggregate_events(&parse(TWO_REGIONS), ConservationBounds::default()).unwrap();
        let (time, fraction) = series.peak_infected().unwrap();
        assert_eq!(time, 0);
        assert!((fraction - 9.0 / 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_uses_plot_columns() {
        let series = aggregate_events(&parse(TWO_REGIONS), ConservationBounds::default()).unwrap();
        let frame = series.frame();
        assert_eq!(frame.columns.first().map(String::as_str), Some("time"));
        assert_eq!(frame.columns.last().map(String::as_str), Some("error"));
        assert_eq!(frame.times(), vec![0, 1]);
    }

    #[test]
    fn test_region_series_one_row_per_time() {
        let log = "\
0
_1 <100,1,0,0,0,0,0,0,0,0,0>
_1 <100,0.9,0.1,0,0,0,0,0.1,0,0,0>
1
_1 <100,0.8,0.1,0,0,0.1,0,0,0.1,0,0>
_2 <50,1,0,0,0,0,0,0,0,0,0>
";
        let set = region_events(&parse(log), ConservationBounds::default()).unwrap();
        assert_eq!(set.booster_count, 0);
        assert_eq!(set.total_population(), 150.0);

        let one = &set.regions["1"];
        assert_eq!(one.percentages.len(), 2);
        assert_eq!(one.percentages[0].fractions[0], 0.9);
        assert_eq!(one.totals[0].counts[0], 90);
        assert_eq!(one.totals[1].counts[4], 10);
        assert_eq!(set.regions["2"].percentages.len(), 1);
        assert_eq!(set.regions["2"].percentages[0].time, 1);
    }

    #[test]
    fn test_region_violation_is_fatal() {
        let log = "0\n_1 <100,1,0,0,0,0,0,0,0,0,0>\n4\n_1 <100,0.5,0,0,0,0,0,0,0,0,0>\n";
        let err = region_events(&parse(log), ConservationBounds::default()).unwrap_err();
        assert_eq!(err.sim_time(), Some(4));
    }

    #[test]
    fn test_region_write_stops_once_cancelled() {
        let out = tempfile::TempDir::new().unwrap();
        let set = region_events(&parse(TWO_REGIONS), ConservationBounds::default()).unwrap();
        let cancel = CancelToken::new();

        write_region(out.path(), "1", &set.regions["1"], &set.header(), Some(&cancel)).unwrap();
        assert!(out.path().join("region_1").exists());

        cancel.cancel();
        let err = write_region(out.path(), "2", &set.regions["2"], &set.header(), Some(&cancel))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Interrupted));
        assert!(!out.path().join("region_2").exists());
    }

    #[test]
    fn test_clear_file_tolerates_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("states.csv");
        clear_file(&path).unwrap();
        fs::write(&path, "old").unwrap();
        clear_file(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_region_file_layout() {
        let (dir, percentages, totals) = region_files(Path::new("out"), "7");
        assert_eq!(dir, Path::new("out/region_7"));
        assert_eq!(
            percentages,
            Path::new("out/region_7/region_7_percentage_timeseries.csv")
        );
        assert_eq!(totals, Path::new("out/region_7/region_7_totals_timeseries.csv"));
    }
}
