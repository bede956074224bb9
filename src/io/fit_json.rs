//! JSON export of per-sample fits.
//!
//! The TSV report only carries R² and growth rate. The JSON file is the
//! "portable" representation of a run:
//! - run metadata (tool, generation time, input file, fit options)
//! - per-sample fitted parameters (`a`, `b`) or the reason there are none

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Local;
use indexmap::IndexMap;
use serde::Serialize;

use crate::domain::{FitOptions, FitResult, SampleReport};
use crate::error::{Result, TecanError};

#[derive(Debug, Serialize)]
pub struct FitFile<'a> {
    pub tool: &'static str,
    pub generated: String,
    pub input: String,
    pub options: FitOptions,
    pub samples: Vec<SampleEntry<'a>>,
}

#[derive(Debug, Serialize)]
pub struct SampleEntry<'a> {
    pub sample_id: &'a str,
    pub well_id: &'a str,
    #[serde(flatten)]
    pub outcome: OutcomeEntry<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OutcomeEntry<'a> {
    Result(&'a FitResult),
    Failed { status: &'static str, iterations: usize, reason: &'a str },
}

impl<'a> FitFile<'a> {
    pub fn new(input: &Path, options: FitOptions, reports: &'a IndexMap<String, SampleReport>) -> Self {
        let samples = reports
            .values()
            .map(|r| SampleEntry {
                sample_id: &r.sample_id,
                well_id: &r.well_id,
                outcome: match &r.outcome {
                    Ok(result) => OutcomeEntry::Result(result),
                    Err(failure) => OutcomeEntry::Failed {
                        status: "fit_failed",
                        iterations: failure.iterations,
                        reason: &failure.reason,
                    },
                },
            })
            .collect();

        Self {
            tool: "tecan",
            generated: Local::now().to_rfc3339(),
            input: input.display().to_string(),
            options,
            samples,
        }
    }
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, file: &FitFile<'_>) -> Result<()> {
    let out = File::create(path).map_err(|e| TecanError::io_path("create fit JSON", path, e))?;
    write_fit_json_to(BufWriter::new(out), file)
}

/// Serialize and flush; a flush error is returned rather than lost on drop.
pub fn write_fit_json_to<W: Write>(mut out: W, file: &FitFile<'_>) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, file)?;
    out.flush().map_err(|e| TecanError::io("Failed to flush fit JSON", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GrowthFit;
    use crate::error::FitFailure;
    use serde_json::Value;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn buffered_write_errors_surface_on_flush() {
        let reports = IndexMap::new();
        let file = FitFile::new(Path::new("plate.txt"), FitOptions::default(), &reports);
        let err = write_fit_json_to(BufWriter::new(BrokenPipe), &file).unwrap_err();
        assert!(
            matches!(&err, TecanError::Io { source, .. } if source.kind() == std::io::ErrorKind::BrokenPipe),
            "{err}"
        );
    }

    #[test]
    fn serializes_each_outcome_kind() {
        let mut reports = IndexMap::new();
        for (id, outcome) in [
            (
                "A1",
                Ok(FitResult::Fit(GrowthFit {
                    r_squared: 0.99,
                    growth_rate_per_minute: 96.0,
                    amplitude: 0.12,
                    rate_constant: 1.2e-4,
                    n_points: 9,
                    iterations: 6,
                })),
            ),
            ("A2", Ok(FitResult::NoData)),
            (
                "A3",
                Err(FitFailure {
                    iterations: 3,
                    reason: "damping exceeded".to_string(),
                }),
            ),
        ] {
            reports.insert(
                id.to_string(),
                SampleReport {
                    sample_id: id.to_string(),
                    well_id: id.to_string(),
                    outcome,
                },
            );
        }

        let file = FitFile::new(Path::new("plate.txt"), FitOptions::default(), &reports);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fits.json");
        write_fit_json(&path, &file).unwrap();

        let json: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let samples = json["samples"].as_array().unwrap();
        assert_eq!(json["tool"], "tecan");
        assert_eq!(json["options"]["band"]["upper"], 0.7);
        assert_eq!(samples[0]["status"], "fit");
        assert_eq!(samples[0]["n_points"], 9);
        assert_eq!(samples[1]["status"], "no_data");
        assert_eq!(samples[2]["status"], "fit_failed");
        assert_eq!(samples[2]["iterations"], 3);
    }
}
