//! Tecan export reader.
//!
//! A Tecan export is a tab-delimited text file with a free-form metadata
//! preamble followed by one table per well:
//!
//! ```text
//! Cycles / Well   1       2       3
//! B2              1       2       3
//! Time [s]        0       600.1   1200.3
//! Temp. [°C]      30.1    30.0    30.1
//! Mean            0.112   0.118   0.131
//! StDev           0.002   0.001   0.003
//! ```
//!
//! Rather than counting lines from the top of the file, rows are recognised by
//! their leading token: a well label (`B2`), `Time` or `Mean`. Everything else
//! is ignored, so small changes to the preamble or to the rows in between do
//! not break extraction.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, trace};

use crate::domain::{ExtractorOptions, RawBlock, WellSeries};
use crate::error::{Result, TecanError};

/// Matches the first token of a well-ID row.
pub fn well_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-G]\d+$").expect("well pattern is a valid regex"))
}

/// Kind of row recognised inside a table block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKind {
    Well,
    Time,
    Mean,
}

impl RowKind {
    fn classify(first_token: &str) -> Option<Self> {
        match first_token {
            "Time" => Some(RowKind::Time),
            "Mean" => Some(RowKind::Mean),
            t if well_pattern().is_match(t) => Some(RowKind::Well),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            RowKind::Well => "well",
            RowKind::Time => "Time",
            RowKind::Mean => "Mean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHeaderSkip,
    ScanningBlocks,
    Exhausted,
}

/// Rows collected so far for the block being built.
#[derive(Debug, Default)]
struct PendingBlock {
    first_line: Option<usize>,
    well: Option<(String, Vec<String>, usize)>,
    times: Option<Vec<f64>>,
    means: Option<Vec<f64>>,
}

impl PendingBlock {
    fn is_empty(&self) -> bool {
        self.well.is_none() && self.times.is_none() && self.means.is_none()
    }

    fn has(&self, kind: RowKind) -> bool {
        match kind {
            RowKind::Well => self.well.is_some(),
            RowKind::Time => self.times.is_some(),
            RowKind::Mean => self.means.is_some(),
        }
    }

    fn missing(&self) -> Vec<&'static str> {
        [RowKind::Well, RowKind::Time, RowKind::Mean]
            .into_iter()
            .filter(|k| !self.has(*k))
            .map(RowKind::name)
            .collect()
    }

    fn describe(&self) -> String {
        match &self.well {
            Some((id, _, _)) => format!("block for well {id}"),
            None => "block".to_string(),
        }
    }
}

/// Lazily yields one [`RawBlock`] per table in a Tecan export.
///
/// The iterator is fused: after the stream ends or an error is returned it
/// yields `None`.
pub struct BlockExtractor<R> {
    reader: R,
    buf: Vec<u8>,
    options: ExtractorOptions,
    state: State,
    line_no: usize,
    pending: PendingBlock,
}

impl<R: BufRead> BlockExtractor<R> {
    pub fn new(reader: R, options: ExtractorOptions) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            options,
            state: State::AwaitingHeaderSkip,
            line_no: 0,
            pending: PendingBlock::default(),
        }
    }

    /// Next line, decoded lossily: every token the extractor reads is ASCII,
    /// and Excel text exports are often cp1252 (`°` as byte 0xB0).
    fn next_line(&mut self) -> Option<Result<String>> {
        match read_raw_line(&mut self.reader, &mut self.buf) {
            Ok(false) => None,
            Ok(true) => {
                self.line_no += 1;
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(TecanError::io(format!("Failed to read line {}", self.line_no + 1), e))),
        }
    }

    /// Feed one line while scanning; returns a block once all rows are in.
    fn accept(&mut self, line: &str) -> Result<Option<RawBlock>> {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            return Ok(None);
        };
        let Some(kind) = RowKind::classify(first) else {
            return Ok(None);
        };

        if self.pending.has(kind) {
            return Err(TecanError::malformed(
                self.line_no,
                format!(
                    "second {} row before the {} was complete (missing: {})",
                    kind.name(),
                    self.pending.describe(),
                    self.pending.missing().join(", ")
                ),
            ));
        }
        self.pending.first_line.get_or_insert(self.line_no);

        match kind {
            RowKind::Well => {
                let labels = tokens.map(str::to_string).collect();
                self.pending.well = Some((first.to_string(), labels, self.line_no));
            }
            RowKind::Time => {
                let (values, unit) = parse_time_row(tokens, self.line_no)?;
                trace!(line = self.line_no, ?unit, n = values.len(), "time row");
                self.pending.times = Some(values);
            }
            RowKind::Mean => {
                let values = parse_numeric_row(tokens, self.line_no, "Mean")?;
                self.pending.means = Some(values);
            }
        }

        if !self.pending.missing().is_empty() {
            return Ok(None);
        }

        let pending = std::mem::take(&mut self.pending);
        let (well_id, cycle_labels, line) = pending.well.unwrap_or_default();
        let times = pending.times.unwrap_or_default();
        let means = pending.means.unwrap_or_default();
        if times.len() != means.len() {
            return Err(TecanError::unexpected(
                self.line_no,
                format!(
                    "well {well_id}: {} time values but {} mean values",
                    times.len(),
                    means.len()
                ),
            ));
        }
        if !cycle_labels.is_empty() && cycle_labels.len() != times.len() {
            debug!(
                well = %well_id,
                labels = cycle_labels.len(),
                values = times.len(),
                "cycle label count differs from reading count"
            );
        }

        Ok(Some(RawBlock {
            well_id,
            cycle_labels,
            times,
            means,
            line,
        }))
    }

    fn is_table_start(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        if !self.options.table_marker.is_empty() && trimmed.starts_with(&self.options.table_marker) {
            return true;
        }
        trimmed
            .split_whitespace()
            .next()
            .is_some_and(|t| well_pattern().is_match(t))
    }
}

impl<R: BufRead> Iterator for BlockExtractor<R> {
    type Item = Result<RawBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                State::Exhausted => return None,
                State::AwaitingHeaderSkip => {
                    let line = match self.next_line() {
                        None => {
                            self.state = State::Exhausted;
                            return None;
                        }
                        Some(Err(e)) => {
                            self.state = State::Exhausted;
                            return Some(Err(e));
                        }
                        Some(Ok(line)) => line,
                    };
                    if self.line_no <= self.options.skip_lines || !self.is_table_start(&line) {
                        continue;
                    }
                    debug!(line = self.line_no, "table section starts");
                    self.state = State::ScanningBlocks;
                    match self.accept(&line) {
                        Ok(Some(block)) => return Some(Ok(block)),
                        Ok(None) => continue,
                        Err(e) => {
                            self.state = State::Exhausted;
                            return Some(Err(e));
                        }
                    }
                }
                State::ScanningBlocks => {
                    let line = match self.next_line() {
                        None => {
                            self.state = State::Exhausted;
                            if self.pending.is_empty() {
                                return None;
                            }
                            let line = self.pending.first_line.unwrap_or(self.line_no);
                            return Some(Err(TecanError::malformed(
                                line,
                                format!(
                                    "input ended before the {} was complete (missing: {})",
                                    self.pending.describe(),
                                    self.pending.missing().join(", ")
                                ),
                            )));
                        }
                        Some(Err(e)) => {
                            self.state = State::Exhausted;
                            return Some(Err(e));
                        }
                        Some(Ok(line)) => line,
                    };
                    match self.accept(&line) {
                        Ok(Some(block)) => return Some(Ok(block)),
                        Ok(None) => continue,
                        Err(e) => {
                            self.state = State::Exhausted;
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}

/// Read one line into `buf` without its `\n` / `\r\n` terminator.
///
/// Returns `false` at end of input. No UTF-8 validation is done.
pub(crate) fn read_raw_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(true)
}

/// Open an export file and wrap it in a [`BlockExtractor`].
pub fn open_export(path: &Path, options: ExtractorOptions) -> Result<BlockExtractor<BufReader<File>>> {
    let file = File::open(path).map_err(|e| TecanError::io_path("open Tecan export", path, e))?;
    Ok(BlockExtractor::new(BufReader::new(file), options))
}

/// Drain an extractor into per-well series, in first-seen well order.
pub fn collect_series<I>(blocks: I) -> Result<Vec<WellSeries>>
where
    I: IntoIterator<Item = Result<RawBlock>>,
{
    let mut wells: IndexMap<String, WellSeries> = IndexMap::new();
    let mut n_blocks = 0usize;
    for block in blocks {
        let block = block?;
        n_blocks += 1;
        wells
            .entry(block.well_id.clone())
            .or_insert_with(|| WellSeries::new(block.well_id.clone()))
            .extend(&block.times, &block.means);
    }

    let mut series: Vec<WellSeries> = wells.into_values().collect();
    for s in &mut series {
        s.finalize();
    }
    debug!(blocks = n_blocks, wells = series.len(), "collected well series");
    Ok(series)
}

/// Time unit markers accepted on the `Time` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    fn from_marker(token: &str) -> Option<Self> {
        let inner = token.strip_prefix('[')?.strip_suffix(']')?;
        match inner.trim() {
            "ms" => Some(TimeUnit::Milliseconds),
            "s" | "sec" => Some(TimeUnit::Seconds),
            "m" | "min" => Some(TimeUnit::Minutes),
            "h" | "hr" => Some(TimeUnit::Hours),
            _ => None,
        }
    }

    pub fn seconds(self) -> f64 {
        match self {
            TimeUnit::Milliseconds => 1e-3,
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
        }
    }
}

fn parse_time_row<'a>(
    tokens: impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<(Vec<f64>, TimeUnit)> {
    let mut unit = None;
    let mut values = Vec::new();
    for token in tokens {
        if token.starts_with('[') && token.ends_with(']') {
            let parsed = TimeUnit::from_marker(token)
                .ok_or_else(|| TecanError::unexpected(line, format!("unknown time unit {token}")))?;
            unit = Some(parsed);
            continue;
        }
        values.push(parse_value(token, line, "Time")?);
    }
    if values.is_empty() {
        return Err(TecanError::unexpected(line, "Time row has no values"));
    }

    let unit = unit.unwrap_or(TimeUnit::Seconds);
    if unit != TimeUnit::Seconds {
        let scale = unit.seconds();
        values.iter_mut().for_each(|v| *v *= scale);
    }
    Ok((values, unit))
}

fn parse_numeric_row<'a>(tokens: impl Iterator<Item = &'a str>, line: usize, row: &str) -> Result<Vec<f64>> {
    let values = tokens
        .map(|t| parse_value(t, line, row))
        .collect::<Result<Vec<f64>>>()?;
    if values.is_empty() {
        return Err(TecanError::unexpected(line, format!("{row} row has no values")));
    }
    Ok(values)
}

fn parse_value(token: &str, line: usize, row: &str) -> Result<f64> {
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(TecanError::unexpected(
            line,
            format!("{row} row contains non-numeric value '{token}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const EXPORT: &str = "Application: Tecan i-control\n\
Device: infinite 200Pro\n\
Date:\t2016-06-08\n\
\n\
Cycles / Well\t1\t2\t3\t4\n\
A1\t1\t2\t3\t4\n\
Time [s]\t0\t600\t1200\t1800\n\
Temp. [°C]\t30.1\t30.0\t30.1\t30.2\n\
Mean\t0.1\t0.2\t0.4\t0.8\n\
StDev\t0.001\t0.002\t0.001\t0.003\n\
\n\
Cycles / Well\t1\t2\t3\t4\n\
A2\t1\t2\t3\t4\n\
Time [s]\t10\t610\t1210\t1810\n\
Temp. [°C]\t30.1\t30.0\t30.1\t30.2\n\
Mean\t0.11\t0.21\t0.41\t0.81\n\
StDev\t0.001\t0.002\t0.001\t0.003\n\
\n\
End Time:\t2016-06-09\n";

    fn extract(text: &str) -> Vec<Result<RawBlock>> {
        BlockExtractor::new(Cursor::new(text.to_string()), ExtractorOptions::default()).collect()
    }

    #[test]
    fn extracts_one_block_per_well_table() {
        let blocks: Vec<RawBlock> = extract(EXPORT).into_iter().map(|b| b.unwrap()).collect();
        assert_eq!(blocks.len(), 2);

        assert_eq!(blocks[0].well_id, "A1");
        assert_eq!(blocks[0].cycle_labels, vec!["1", "2", "3", "4"]);
        assert_eq!(blocks[0].times, vec![0.0, 600.0, 1200.0, 1800.0]);
        assert_eq!(blocks[0].means, vec![0.1, 0.2, 0.4, 0.8]);
        assert_eq!(blocks[0].line, 6);

        assert_eq!(blocks[1].well_id, "A2");
        assert_eq!(blocks[1].times[0], 10.0);
    }

    #[test]
    fn row_lengths_match_tokens_minus_labels() {
        let line_time = "Time [s]\t0\t600\t1200\t1800";
        let line_mean = "Mean\t0.1\t0.2\t0.4\t0.8";
        let blocks: Vec<RawBlock> = extract(EXPORT).into_iter().map(|b| b.unwrap()).collect();
        assert_eq!(blocks[0].times.len(), line_time.split_whitespace().count() - 2);
        assert_eq!(blocks[0].means.len(), line_mean.split_whitespace().count() - 1);
        assert_eq!(blocks[0].cycle_labels.len(), blocks[0].times.len());
    }

    #[test]
    fn extraction_is_idempotent() {
        let first: Vec<RawBlock> = extract(EXPORT).into_iter().map(|b| b.unwrap()).collect();
        let second: Vec<RawBlock> = extract(EXPORT).into_iter().map(|b| b.unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn skip_lines_hides_well_like_preamble_rows() {
        let text = "B7 is not a table\nheader\nA1\t1\t2\nTime [s]\t0\t60\nMean\t0.3\t0.4\n";
        let default: Vec<RawBlock> = extract(text).into_iter().filter_map(|b| b.ok()).collect();
        assert!(default.is_empty(), "B7 row opens a block that never completes");

        let options = ExtractorOptions {
            skip_lines: 2,
            ..ExtractorOptions::default()
        };
        let blocks: Vec<RawBlock> = BlockExtractor::new(Cursor::new(text), options)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].well_id, "A1");
    }

    #[test]
    fn converts_minutes_to_seconds() {
        let text = "A1\t1\t2\nTime [min]\t0\t1.5\nMean\t0.3\t0.4\n";
        let blocks: Vec<RawBlock> = extract(text).into_iter().map(|b| b.unwrap()).collect();
        assert_eq!(blocks[0].times, vec![0.0, 90.0]);
    }

    #[test]
    fn missing_mean_row_is_malformed() {
        let text = "Cycles / Well\t1\t2\nA1\t1\t2\nTime [s]\t0\t60\nTemp. [°C]\t30\t30\n";
        let results = extract(text);
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(TecanError::MalformedInput { line, message }) => {
                assert_eq!(*line, 2);
                assert!(message.contains("Mean"), "{message}");
            }
            other => panic!("expected MalformedInput, got {other:?}"),
        }
    }

    #[test]
    fn repeated_well_row_is_malformed() {
        let text = "A1\t1\t2\nA2\t1\t2\nTime [s]\t0\t60\nMean\t0.3\t0.4\n";
        let results = extract(text);
        assert!(matches!(results[0], Err(TecanError::MalformedInput { line: 2, .. })));
        assert_eq!(results.len(), 1, "iterator is fused after an error");
    }

    #[test]
    fn non_numeric_mean_is_unexpected_format() {
        let text = "A1\t1\t2\nTime [s]\t0\t60\nMean\t0.3\tOVER\n";
        let results = extract(text);
        match &results[0] {
            Err(TecanError::UnexpectedFormat { line, message }) => {
                assert_eq!(*line, 3);
                assert!(message.contains("OVER"));
            }
            other => panic!("expected UnexpectedFormat, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_row_lengths_are_unexpected_format() {
        let text = "A1\t1\t2\nTime [s]\t0\t60\t120\nMean\t0.3\t0.4\n";
        assert!(matches!(extract(text)[0], Err(TecanError::UnexpectedFormat { .. })));
    }

    #[test]
    fn cp1252_bytes_in_ignored_rows_are_tolerated() {
        let mut bytes = b"Cycles / Well\t1\t2\r\nA1\t1\t2\r\nTime [s]\t0\t600\r\nTemp. [".to_vec();
        bytes.push(0xB0);
        bytes.extend_from_slice(b"C]\t30.1\t30.2\r\nMean\t0.3\t0.4\r\n");

        let blocks: Vec<RawBlock> = BlockExtractor::new(Cursor::new(bytes), ExtractorOptions::default())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].times, vec![0.0, 600.0]);
        assert_eq!(blocks[0].means, vec![0.3, 0.4]);
        assert_eq!(blocks[0].line, 2);
    }

    #[test]
    fn empty_or_header_only_input_yields_nothing() {
        assert!(extract("").is_empty());
        assert!(extract("Application: Tecan i-control\nDevice: x\n").is_empty());
    }

    #[test]
    fn collect_series_merges_blocks_per_well_in_order() {
        let text = "A2\t1\nTime [s]\t600\nMean\t0.3\n\
A1\t1\nTime [s]\t0\nMean\t0.1\n\
A2\t1\nTime [s]\t0\nMean\t0.2\n";
        let series = collect_series(extract(text)).unwrap();
        let ids: Vec<&str> = series.iter().map(|s| s.well_id.as_str()).collect();
        assert_eq!(ids, vec!["A2", "A1"]);
        assert_eq!(series[0].times, vec![0.0, 600.0]);
        assert_eq!(series[0].values, vec![0.2, 0.3]);
    }
}
