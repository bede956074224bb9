//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - built while streaming the export
//! - passed between the fitter and the report writers
//! - serialized for the JSON export

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::FitFailure;
use crate::math::LmSettings;

/// One table block of a Tecan export: a single well's readings across cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    /// First token of the well-ID row (e.g. `B2`).
    pub well_id: String,
    /// Remaining tokens of the well-ID row (cycle numbers in real exports).
    pub cycle_labels: Vec<String>,
    /// Elapsed time per cycle, in seconds.
    pub times: Vec<f64>,
    /// Mean reading per cycle; same length as `times`.
    pub means: Vec<f64>,
    /// 1-based line number of the well-ID row.
    pub line: usize,
}

/// A well's readings accumulated over every block that mentions it.
#[derive(Debug, Clone, PartialEq)]
pub struct WellSeries {
    pub well_id: String,
    /// Seconds, increasing.
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl WellSeries {
    pub fn new(well_id: impl Into<String>) -> Self {
        Self {
            well_id: well_id.into(),
            times: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Append a block's readings.
    pub fn extend(&mut self, times: &[f64], values: &[f64]) {
        self.times.extend_from_slice(times);
        self.values.extend_from_slice(values);
    }

    /// Stable sort by time so the two vectors stay aligned.
    pub fn finalize(&mut self) {
        if self.times.windows(2).all(|w| w[0] <= w[1]) {
            return;
        }
        let mut pairs: Vec<(f64, f64)> = self
            .times
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        self.times = pairs.iter().map(|p| p.0).collect();
        self.values = pairs.iter().map(|p| p.1).collect();
    }
}

/// Inclusive band of readings considered to be the exponential phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionBand {
    pub lower: f64,
    pub upper: f64,
}

impl SelectionBand {
    /// Band used by the growth-rate report.
    pub const GROWTH: SelectionBand = SelectionBand {
        lower: 0.25,
        upper: 0.70,
    };

    /// Band used when fitting replicate-averaged curves.
    pub const REPLICATE: SelectionBand = SelectionBand {
        lower: 0.25,
        upper: 0.75,
    };

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

impl Default for SelectionBand {
    fn default() -> Self {
        Self::GROWTH
    }
}

/// A successful exponential fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthFit {
    pub r_squared: f64,
    pub growth_rate_per_minute: f64,
    /// `a` in `a * exp(b * t)`.
    pub amplitude: f64,
    /// `b` in `a * exp(b * t)`, per second.
    pub rate_constant: f64,
    /// Number of in-band points used.
    pub n_points: usize,
    pub iterations: usize,
}

/// Outcome of fitting one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitResult {
    /// Not enough readings inside the selection band.
    NoData,
    Fit(GrowthFit),
}

/// One row of the growth report.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport {
    pub sample_id: String,
    pub well_id: String,
    pub outcome: Result<FitResult, FitFailure>,
}

/// One row of the Well-Contents lookup file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleInfo {
    pub well: String,
    pub strain: String,
    pub condition: String,
}

impl SampleInfo {
    /// `Strain-Condition`, with `", "` separators inside the strain collapsed
    /// to `-` (e.g. `Hog1-GFP, Pbs2Δ, S83` → `Hog1-GFP-Pbs2Δ-S83`).
    pub fn label(&self) -> String {
        let strain = self.strain.split(", ").collect::<Vec<_>>().join("-");
        format!("{strain}-{}", self.condition)
    }
}

/// Readings averaged across the technical replicates of one label.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicateMean {
    pub label: String,
    pub wells: Vec<String>,
    /// Seconds, taken from the first replicate.
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

/// Where to find table blocks in the export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorOptions {
    /// Lines discarded unconditionally before scanning for the table start.
    pub skip_lines: usize,
    /// Line prefix that opens a table block.
    pub table_marker: String,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            skip_lines: 0,
            table_marker: "Cycles / Well".to_string(),
        }
    }
}

/// Fitting knobs shared by every caller of the fitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    pub band: SelectionBand,
    /// Fewer in-band points than this yields `NoData`.
    pub min_points: usize,
    pub solver: LmSettings,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            band: SelectionBand::GROWTH,
            min_points: 2,
            solver: LmSettings::default(),
        }
    }
}

/// Resolved configuration for `tecan growth`.
#[derive(Debug, Clone)]
pub struct GrowthConfig {
    pub input: PathBuf,
    pub sample_info: Option<PathBuf>,
    pub output: PathBuf,
    pub export_json: Option<PathBuf>,
    pub extractor: ExtractorOptions,
    pub fit: FitOptions,
}

/// Resolved configuration for `tecan mean`.
#[derive(Debug, Clone)]
pub struct MeanConfig {
    pub input: PathBuf,
    pub sample_info: PathBuf,
    pub output: PathBuf,
    pub renamed_output: PathBuf,
    /// Also fit the averaged curves and write a growth report here.
    pub fit_output: Option<PathBuf>,
    pub extractor: ExtractorOptions,
    pub fit: FitOptions,
}

/// Resolved configuration for `tecan reformat`.
#[derive(Debug, Clone)]
pub struct ReformatConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub extractor: ExtractorOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_collapses_strain_separators() {
        let info = SampleInfo {
            well: "B2".to_string(),
            strain: "Hog1-GFP, Pbs2Δ, S83".to_string(),
            condition: "Acetate_noWash".to_string(),
        };
        assert_eq!(info.label(), "Hog1-GFP-Pbs2Δ-S83-Acetate_noWash");
    }

    #[test]
    fn finalize_sorts_out_of_order_blocks() {
        let mut s = WellSeries::new("A1");
        s.extend(&[600.0, 1200.0], &[0.2, 0.3]);
        s.extend(&[0.0, 300.0], &[0.1, 0.15]);
        s.finalize();
        assert_eq!(s.times, vec![0.0, 300.0, 600.0, 1200.0]);
        assert_eq!(s.values, vec![0.1, 0.15, 0.2, 0.3]);
    }

    #[test]
    fn band_is_inclusive() {
        let band = SelectionBand::GROWTH;
        assert!(band.contains(0.25));
        assert!(band.contains(0.70));
        assert!(!band.contains(0.7000001));
        assert!(!band.contains(0.2));
    }
}
