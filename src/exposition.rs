//! Line-oriented exposition feed parser
//!
//! Decodes the `name value` subset of the Prometheus text format into
//! single-sample [`TimeSeries`].
//!
//! ## Rules
//!
//! - Lines starting with `#` and blank lines are ignored
//! - A data line is exactly two whitespace-separated tokens
//! - Lines with another token count, or whose value is not a float, are skipped
//! - Every sample is stamped with the parser's capture time, never a time from the feed
//! - Only a stream read error aborts the parse
//!
//! Partial or malformed feeds therefore never fail an otherwise good scrape.

use std::fmt::Write as _;
use std::io::{self, BufRead, Lines};

use tracing::trace;

use crate::{Metric, Sample, TimeSeries};

/// Streaming parser over a buffered reader.
///
/// Yields one [`TimeSeries`] per valid data line, in input order. The
/// sequence ends at EOF or after the first I/O error.
pub struct ExpositionParser<R> {
    lines: Lines<R>,
    captured_at: i64,
    failed: bool,
}

impl<R: BufRead> ExpositionParser<R> {
    pub fn new(reader: R, captured_at: i64) -> Self {
        Self {
            lines: reader.lines(),
            captured_at,
            failed: false,
        }
    }
}

impl<R: BufRead> Iterator for ExpositionParser<R> {
    type Item = io::Result<TimeSeries>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            let Some((name, value)) = parse_line(&line) else {
                continue;
            };

            return Some(Ok(TimeSeries::single(
                Metric::new(name),
                Sample::new(self.captured_at, value),
            )));
        }
    }
}

/// Parse a single feed line.
///
/// Returns `None` for comments, blank lines and anything malformed.
pub fn parse_line(line: &str) -> Option<(&str, f64)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let mut tokens = trimmed.split_whitespace();
    let (Some(name), Some(raw), None) = (tokens.next(), tokens.next(), tokens.next()) else {
        trace!("skipping line with unexpected token count: {line:?}");
        return None;
    };

    match raw.parse::<f64>() {
        Ok(value) => Some((name, value)),
        Err(_) => {
            trace!("skipping line with non-numeric value: {line:?}");
            None
        }
    }
}

/// Parse a whole feed, collecting every valid sample.
pub fn parse_exposition<R: BufRead>(reader: R, captured_at: i64) -> io::Result<Vec<TimeSeries>> {
    ExpositionParser::new(reader, captured_at).collect()
}

/// Render series back into `name value` lines (first sample of each series).
pub fn render_exposition(series: &[TimeSeries]) -> String {
    let mut out = String::new();
    for ts in series {
        if let Some(sample) = ts.samples.first() {
            let _ = writeln!(out, "{} {}", ts.metric.name, sample.value);
        }
    }
    out
}
