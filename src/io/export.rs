//! Flat-file outputs.
//!
//! - growth report (`Cell_ID  R^2  GrowthRate`, tab-delimited)
//! - replicate-mean table (tab-delimited, times in whole minutes)
//! - Botstein-style growth table (CSV)
//! - renamed copy of the Tecan export
//!
//! Each writer has a `write_*` variant that takes any `Write`, which is what
//! the tests use, and a path-based wrapper used by the pipeline.

use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use indexmap::IndexMap;

use crate::domain::{FitResult, ReplicateMean, SampleReport, WellSeries};
use crate::error::{Result, TecanError};
use crate::io::sample_info::{label_for, SampleLookup};
use crate::io::tecan::{read_raw_line, well_pattern};

/// Marker written when a well has no in-band readings.
pub const NO_DATA: &str = "NO DATA";
/// Marker written when the solver did not converge.
pub const FIT_FAILED: &str = "FIT FAILED";

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| TecanError::io_path("create", path, e))?;
    Ok(BufWriter::new(file))
}

fn write_err(path: &Path) -> impl Fn(std::io::Error) -> TecanError + '_ {
    move |e| TecanError::io_path("write", path, e)
}

/// Write the growth report to `path`.
pub fn write_growth_report(path: &Path, reports: &IndexMap<String, SampleReport>) -> Result<()> {
    let mut out = create(path)?;
    write_growth_report_to(&mut out, reports).map_err(write_err(path))?;
    out.flush().map_err(write_err(path))
}

pub fn write_growth_report_to<W: Write>(out: &mut W, reports: &IndexMap<String, SampleReport>) -> std::io::Result<()> {
    writeln!(out, "Cell_ID\tR^2\tGrowthRate")?;
    for (id, report) in reports {
        match &report.outcome {
            Ok(FitResult::Fit(fit)) => {
                writeln!(out, "{id}\t{}\t{}", fit.r_squared, fit.growth_rate_per_minute)?
            }
            Ok(FitResult::NoData) => writeln!(out, "{id}\t{NO_DATA}")?,
            Err(_) => writeln!(out, "{id}\t{FIT_FAILED}")?,
        }
    }
    Ok(())
}

/// Write averaged replicate curves to `path`.
pub fn write_replicate_table(path: &Path, means: &[ReplicateMean]) -> Result<()> {
    let mut out = create(path)?;
    write_replicate_table_to(&mut out, means).map_err(write_err(path))?;
    out.flush().map_err(write_err(path))
}

pub fn write_replicate_table_to<W: Write>(out: &mut W, means: &[ReplicateMean]) -> std::io::Result<()> {
    let Some(first) = means.first() else {
        return writeln!(out, "Time [m]");
    };
    let minutes: Vec<String> = first
        .times
        .iter()
        .map(|t| format!("{}", (t / 60.0).trunc() as i64))
        .collect();
    writeln!(out, "Time [m]\t{}", minutes.join("\t"))?;

    for m in means {
        let values: Vec<String> = m.values.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}\t{}", m.label, values.join("\t"))?;
    }
    Ok(())
}

/// Write the Botstein-style table (`Well,Name,<minutes…>`) to `path`.
pub fn write_botstein_table(path: &Path, series: &[WellSeries]) -> Result<()> {
    let file = File::create(path).map_err(|e| TecanError::io_path("create", path, e))?;
    write_botstein_table_to(file, series)
}

pub fn write_botstein_table_to<W: Write>(out: W, series: &[WellSeries]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);
    let csv_err = |e: csv::Error| TecanError::csv("Failed to write growth table", e);

    let mut header = vec!["Well".to_string(), "Name".to_string()];
    if let Some(first) = series.first() {
        header.extend(first.times.iter().map(|t| format!("{}", (t / 60.0).round() as i64)));
    }
    writer.write_record(&header).map_err(csv_err)?;

    for s in series {
        let mut row = Vec::with_capacity(s.values.len() + 2);
        row.push(s.well_id.clone());
        row.push(format!("{}-Mean", s.well_id));
        row.extend(s.values.iter().map(|v| v.to_string()));
        writer.write_record(&row).map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|e| TecanError::io("Failed to flush growth table", e))
}

/// Copy a Tecan export, replacing the well ID that opens each well row with
/// its sample label. Returns the number of rows renamed.
pub fn write_renamed_export<R: BufRead>(input: R, path: &Path, lookup: &SampleLookup) -> Result<usize> {
    let mut out = create(path)?;
    let renamed = write_renamed_export_to(input, &mut out, lookup)?;
    out.flush().map_err(write_err(path))?;
    Ok(renamed)
}

pub fn write_renamed_export_to<R: BufRead, W: Write>(mut input: R, out: &mut W, lookup: &SampleLookup) -> Result<usize> {
    let mut renamed = 0usize;
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    let write_fail = |e: std::io::Error| TecanError::io("Failed to write renamed export", e);
    loop {
        match read_raw_line(&mut input, &mut buf) {
            Ok(true) => line_no += 1,
            Ok(false) => break,
            Err(e) => return Err(TecanError::io(format!("Failed to read line {}", line_no + 1), e)),
        }

        // Well rows are ASCII; other lines are copied byte for byte.
        let (first, rest) = match buf.iter().position(|&c| c == b'\t') {
            Some(tab) => (&buf[..tab], Some(&buf[tab + 1..])),
            None => (&buf[..], None),
        };
        let first = String::from_utf8_lossy(first);
        if well_pattern().is_match(first.trim()) {
            renamed += 1;
            let label = label_for(lookup, first.trim());
            out.write_all(label.as_bytes()).map_err(write_fail)?;
            if let Some(rest) = rest {
                out.write_all(b"\t").map_err(write_fail)?;
                out.write_all(rest).map_err(write_fail)?;
            }
        } else {
            out.write_all(&buf).map_err(write_fail)?;
        }
        out.write_all(b"\n").map_err(write_fail)?;
    }
    Ok(renamed)
}
