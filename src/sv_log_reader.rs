// read the simulator state log into time markers and region observations

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use log::{debug, trace};

use crate::sv_error::PipelineError;
use crate::sv_interface::{LogEvent, RegionId, SimTime, StateVector};
use crate::sv_progress::CancelToken;

/// Classification of a single log line, before time-marker deduplication
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Time(SimTime),
    Region { region: RegionId, state: StateVector },
}

/// Classify one line. `None` means the line carries nothing we use:
/// comments, blank lines, metadata, or a region line with a broken payload.
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    let line = line.trim();

    if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
        // an overlong digit run cannot be a simulation time
        return line.parse::<SimTime>().ok().map(ParsedLine::Time);
    }

    let payload = state_payload(line)?;
    let region = region_id(line)?;

    let fields = payload
        .split(',')
        .map(|f| f.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    let state = StateVector::from_fields(fields)?;
    Some(ParsedLine::Region { region, state })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// First `_` followed by word characters, with leading underscores stripped
fn region_id(line: &str) -> Option<RegionId> {
    let mut chars = line.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '_' {
            continue;
        }
        match chars.peek() {
            Some((_, next)) if is_word_char(*next) => {}
            _ => continue,
        }

        let rest = &line[start..];
        let end = rest
            .char_indices()
            .find(|(_, c)| !is_word_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());

        let id = rest[..end].trim_start_matches('_');
        if id.is_empty() {
            return None;
        }
        return Some(id.to_string());
    }
    None
}

/// Content between the first `<` and the last `>`
fn state_payload(line: &str) -> Option<&str> {
    let open = line.find('<')?;
    let close = line.rfind('>')?;
    if close <= open + 1 {
        return None;
    }
    let inner = line[open..=close].trim_matches(|c| c == '<' || c == '>');
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

/// Lazy stream of log events.
///
/// Time markers are deduplicated against the current time, so a repeated
/// marker does not open a second step for the same time.
pub struct LogReader<R: BufRead> {
    lines: Lines<R>,
    current_time: Option<SimTime>,
    cancel: Option<CancelToken>,
    line_number: usize,
    skipped: usize,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            current_time: None,
            cancel: None,
            line_number: 0,
            skipped: 0,
        }
    }

    /// Stop with `PipelineError::Interrupted` once the token is cancelled
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn current_time(&self) -> Option<SimTime> {
        self.current_time
    }

    /// Lines that were read but produced no event
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<LogEvent, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cancel) = &self.cancel {
                if cancel.is_cancelled() {
                    return Some(Err(PipelineError::Interrupted));
                }
            }

            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(PipelineError::io(
                        format!("read log line {}", self.line_number + 1),
                        e,
                    )))
                }
            };
            self.line_number += 1;

            match parse_line(&line) {
                Some(ParsedLine::Time(time)) => {
                    if self.current_time == Some(time) {
                        continue;
                    }
                    self.current_time = Some(time);
                    return Some(Ok(LogEvent::TimeMarker(time)));
                }
                Some(ParsedLine::Region { region, state }) => {
                    return Some(Ok(LogEvent::RegionObservation { region, state }));
                }
                None => {
                    trace!("skip line {}: {}", self.line_number, line);
                    self.skipped += 1;
                }
            }
        }
    }
}

/// Buffer the whole log so it can be replayed more than once
pub fn read_log(path: &Path, cancel: Option<&CancelToken>) -> Result<Vec<LogEvent>, PipelineError> {
    let file = File::open(path)
        .map_err(|e| PipelineError::io(format!("open log {}", path.display()), e))?;

    let mut reader = LogReader::new(BufReader::new(file));
    if let Some(cancel) = cancel {
        reader = reader.with_cancel(cancel.clone());
    }

    let events = reader.by_ref().collect::<Result<Vec<_>, _>>()?;
    debug!(
        "read {} events from {} up to time {:?} ({} lines skipped)",
        events.len(),
        path.display(),
        reader.current_time(),
        reader.skipped()
    );
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn events(text: &str) -> Vec<LogEvent> {
        LogReader::new(Cursor::new(text.to_string()))
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_parse_time_marker() {
        assert_eq!(parse_line("  12 "), Some(ParsedLine::Time(12)));
        assert_eq!(parse_line("0"), Some(ParsedLine::Time(0)));
        assert_eq!(parse_line("-1"), None);
        assert_eq!(parse_line("1.5"), None);
        assert_eq!(parse_line("99999999999999999999999999"), None);
    }

    #[test]
    fn test_parse_simulator_region_line() {
        let line = "State for model _8 is <1.39902e+09,0.999999,5.99972e-07,0,0,0,0,5.99972e-07,0,0,0>";
        match parse_line(line) {
            Some(ParsedLine::Region { region, state }) => {
                assert_eq!(region, "8");
                assert_eq!(state.population(), 1.39902e9);
                assert_eq!(state.probe_booster_count(), 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_region_id_strips_leading_underscores() {
        assert_eq!(region_id("model __north_3 is"), Some("north_3".to_string()));
        assert_eq!(region_id("x_ _a"), Some("a".to_string()));
        assert_eq!(region_id("no id here"), None);
    }

    #[test]
    fn test_parse_booster_tail_and_whitespace() {
        let line = "_r1 <100, 0.5, 0.1, 0, 0, 0.1, 0.1, 0, 0, 0, 0.1, 0.05, 0.05>";
        match parse_line(line) {
            Some(ParsedLine::Region { state, .. }) => assert_eq!(state.probe_booster_count(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payloads_are_skipped() {
        assert_eq!(parse_line("_1 <1,2>"), None);
        assert_eq!(parse_line("_1 <100,0.9,x,0,0,0,0,0,0,0,0>"), None);
        assert_eq!(parse_line("_1 <>"), None);
        assert_eq!(parse_line("<100,0.9,0.05,0,0,0.05,0,0.05,0.05,0,0>"), None);
        assert_eq!(parse_line("# comment"), None);
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn test_repeated_time_markers_are_deduplicated() {
        let log = "0\n0\n_1 <100,1,0,0,0,0,0,0,0,0,0>\n0\n1\n1\n2\n";
        let evs = events(log);
        let times: Vec<_> = evs
            .iter()
            .filter_map(|e| match e {
                LogEvent::TimeMarker(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(times, vec![0, 1, 2]);
        assert_eq!(evs.len(), 4);
    }

    #[test]
    fn test_reader_counts_skipped_lines() {
        let mut reader = LogReader::new(Cursor::new("header\n0\n_1 <1,2>\n\n".to_string()));
        let evs: Vec<_> = reader.by_ref().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(evs, vec![LogEvent::TimeMarker(0)]);
        assert_eq!(reader.skipped(), 3);
        assert_eq!(reader.current_time(), Some(0));
    }

    #[test]
    fn test_cancelled_reader_stops() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut reader = LogReader::new(Cursor::new("0\n1\n".to_string())).with_cancel(cancel);
        assert!(matches!(reader.next(), Some(Err(PipelineError::Interrupted))));
    }

    #[test]
    fn test_read_log_missing_file() {
        let err = read_log(Path::new("/nonexistent/pandemic_state.txt"), None).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
