//! Timeseries output: CSV files and the in-memory plotting frame

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use crate::sv_error::PipelineError;
use crate::sv_interface::{Compartment, FieldValue, SimTime, TimeseriesRow};

pub const TIME_COLUMN: &str = "sim_time";
pub const CONSERVATION_COLUMN: &str = "pop_sum";
pub const SEPARATOR: &str = ", ";

// ============================================================================
// Headers
// ============================================================================

/// Column names of an emitted file, the time column included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeseriesHeader {
    pub columns: Vec<String>,
}

impl TimeseriesHeader {
    /// `sim_time, S, ..., D[, booster1..boosterB], pop_sum`
    pub fn aggregate(booster_count: usize) -> Self {
        let mut header = Self::region(booster_count);
        header.columns.push(CONSERVATION_COLUMN.to_string());
        header
    }

    /// `sim_time, S, ..., D[, booster1..boosterB]`
    pub fn region(booster_count: usize) -> Self {
        let mut columns = vec![TIME_COLUMN.to_string()];
        columns.extend(Compartment::ALL.iter().map(|c| c.header().to_string()));
        columns.extend(booster_columns(booster_count));
        Self { columns }
    }

    /// Plotting frame names: `time, susceptible, ..., deaths[, boosters], error`
    pub fn frame(booster_count: usize) -> Self {
        let mut columns = vec!["time".to_string()];
        columns.extend(Compartment::ALL.iter().map(|c| c.frame_label().to_string()));
        columns.extend(booster_columns(booster_count));
        columns.push("error".to_string());
        Self { columns }
    }

    pub fn line(&self) -> String {
        self.columns.join(SEPARATOR)
    }
}

fn booster_columns(booster_count: usize) -> impl Iterator<Item = String> {
    (1..=booster_count).map(|i| format!("booster{}", i))
}

// ============================================================================
// Sinks
// ============================================================================

/// Destination for emitted rows
pub trait RowSink {
    fn header(&mut self, header: &TimeseriesHeader) -> io::Result<()>;

    fn row(&mut self, time: SimTime, values: &[FieldValue]) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write `header` followed by every row, in input order
pub fn emit<T: TimeseriesRow>(
    rows: &[T],
    header: &TimeseriesHeader,
    sink: &mut dyn RowSink,
) -> io::Result<()> {
    sink.header(header)?;
    for row in rows {
        sink.row(row.sim_time(), &row.values())?;
    }
    sink.finish()
}

/// Emit straight to a new file at `path`
pub fn emit_to_path<T: TimeseriesRow>(
    rows: &[T],
    header: &TimeseriesHeader,
    path: &Path,
) -> Result<(), PipelineError> {
    let mut sink = CsvRowSink::create(path)
        .map_err(|e| PipelineError::io(format!("create {}", path.display()), e))?;
    emit(rows, header, &mut sink)
        .map_err(|e| PipelineError::io(format!("write {}", path.display()), e))
}

/// Delimited text sink
pub struct CsvRowSink<W: Write> {
    writer: W,
}

impl CsvRowSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CsvRowSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RowSink for CsvRowSink<W> {
    fn header(&mut self, header: &TimeseriesHeader) -> io::Result<()> {
        writeln!(self.writer, "{}", header.line())
    }

    fn row(&mut self, time: SimTime, values: &[FieldValue]) -> io::Result<()> {
        write!(self.writer, "{}", time)?;
        for value in values {
            write!(self.writer, "{}{}", SEPARATOR, value)?;
        }
        writeln!(self.writer)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

// ============================================================================
// Frame (in-memory)
// ============================================================================

/// Column-labelled rows held in memory for downstream plotting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeseriesFrame {
    pub columns: Vec<String>,
    pub rows: Vec<(SimTime, Vec<f64>)>,
}

impl TimeseriesFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect rows directly, without going through a sink
    pub fn from_rows<T: TimeseriesRow>(rows: &[T], header: &TimeseriesHeader) -> Self {
        Self {
            columns: header.columns.clone(),
            rows: rows.iter().map(|row| frame_row(row.sim_time(), &row.values())).collect(),
        }
    }

    pub fn times(&self) -> Vec<SimTime> {
        self.rows.iter().map(|(t, _)| *t).collect()
    }

    /// Values of a non-time column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        if index == 0 {
            return Some(self.rows.iter().map(|(t, _)| *t as f64).collect());
        }
        self.rows
            .iter()
            .map(|(_, values)| values.get(index - 1).copied())
            .collect()
    }

    /// Same data under different column names
    pub fn relabel(mut self, header: &TimeseriesHeader) -> Self {
        self.columns = header.columns.clone();
        self
    }

    /// Comma separated dump with the time column first
    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "{}", self.columns.join(","))?;
        for (time, values) in &self.rows {
            write!(writer, "{}", time)?;
            for value in values {
                write!(writer, ",{}", value)?;
            }
            writeln!(writer)?;
        }
        writer.flush()
    }

    pub fn write_csv_path(&self, path: &Path) -> Result<(), PipelineError> {
        let file = File::create(path)
            .map_err(|e| PipelineError::io(format!("create {}", path.display()), e))?;
        self.write_csv(BufWriter::new(file))
            .map_err(|e| PipelineError::io(format!("write {}", path.display()), e))
    }
}

impl RowSink for TimeseriesFrame {
    fn header(&mut self, header: &TimeseriesHeader) -> io::Result<()> {
        self.columns = header.columns.clone();
        self.rows.clear();
        Ok(())
    }

    fn row(&mut self, time: SimTime, values: &[FieldValue]) -> io::Result<()> {
        self.rows.push(frame_row(time, values));
        Ok(())
    }
}

fn frame_row(time: SimTime, values: &[FieldValue]) -> (SimTime, Vec<f64>) {
    (time, values.iter().map(|v| v.as_f64()).collect())
}

/// Parse an emitted timeseries file back into a frame.
///
/// Fields are trimmed, so both the `", "` files and the `,` frame dump read
/// back. Every row must have as many fields as the header.
pub fn read_timeseries<R: Read>(reader: R) -> Result<TimeseriesFrame, PipelineError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns: Vec<String> = csv_reader
        .headers()
        .map_err(|e| PipelineError::csv("read timeseries header", e))?
        .iter()
        .map(str::to_string)
        .collect();
    if columns.is_empty() {
        return Ok(TimeseriesFrame::new());
    }

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| PipelineError::csv("read timeseries row", e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let mut fields = record.iter();

        let time = fields
            .next()
            .and_then(|t| t.parse::<SimTime>().ok())
            .ok_or_else(|| PipelineError::Timeseries {
                line,
                reason: "bad time value".to_string(),
            })?;
        let values = fields
            .map(|f| f.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::Timeseries {
                line,
                reason: format!("bad numeric value: {}", e),
            })?;
        rows.push((time, values));
    }

    Ok(TimeseriesFrame { columns, rows })
}
