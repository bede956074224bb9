//! Shared pipeline logic used by every subcommand.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! export -> blocks -> per-well series -> fits -> ordered report map
//!
//! The subcommand handlers in `app` can then focus on presentation and on
//! which files to write.

use std::io::BufRead;
use std::path::Path;

use indexmap::IndexMap;
use tracing::info;

use crate::domain::{
    ExtractorOptions, FitOptions, GrowthConfig, MeanConfig, ReformatConfig, ReplicateMean, SampleReport,
    WellSeries,
};
use crate::error::{AppError, Result};
use crate::fit::fit_plate;
use crate::io::sample_info::{label_for, load_sample_info, SampleLookup};
use crate::io::tecan::{collect_series, open_export, BlockExtractor};
use crate::report::{average_replicates, replicate_series};

/// All computed outputs of a `tecan growth` run.
#[derive(Debug, Clone)]
pub struct GrowthRun {
    pub series: Vec<WellSeries>,
    pub reports: IndexMap<String, SampleReport>,
}

/// All computed outputs of a `tecan mean` run.
#[derive(Debug, Clone)]
pub struct MeanRun {
    pub lookup: SampleLookup,
    pub means: Vec<ReplicateMean>,
    /// Present when the averaged curves were fitted.
    pub reports: Option<IndexMap<String, SampleReport>>,
}

/// Read every well series from an export file.
///
/// An export without a single well table is rejected (exit code 3).
pub fn load_series(path: &Path, options: &ExtractorOptions) -> std::result::Result<Vec<WellSeries>, AppError> {
    let series = collect_series(open_export(path, options.clone())?)?;
    if series.is_empty() {
        return Err(AppError::new(
            3,
            format!("No well tables found in '{}'.", path.display()),
        ));
    }
    info!(path = %path.display(), wells = series.len(), "read Tecan export");
    Ok(series)
}

/// Extract and fit every well of an export read from `reader`.
///
/// With a sample lookup, rows are named `<Strain>-<Condition>_<well>`;
/// otherwise by well ID.
pub fn growth_reports<R: BufRead>(
    reader: R,
    extractor: &ExtractorOptions,
    fit: &FitOptions,
    lookup: Option<&SampleLookup>,
) -> Result<IndexMap<String, SampleReport>> {
    let series = collect_series(BlockExtractor::new(reader, extractor.clone()))?;
    Ok(fit_series(&series, fit, lookup))
}

fn fit_series(
    series: &[WellSeries],
    fit: &FitOptions,
    lookup: Option<&SampleLookup>,
) -> IndexMap<String, SampleReport> {
    match lookup {
        Some(lookup) => fit_plate(series, fit, |well| format!("{}_{well}", label_for(lookup, well))),
        None => fit_plate(series, fit, str::to_string),
    }
}

/// Execute the growth pipeline and return the computed outputs.
pub fn run_growth(config: &GrowthConfig) -> std::result::Result<GrowthRun, AppError> {
    let lookup = config.sample_info.as_deref().map(load_sample_info).transpose()?;
    let series = load_series(&config.input, &config.extractor)?;
    let reports = fit_series(&series, &config.fit, lookup.as_ref());
    Ok(GrowthRun { series, reports })
}

/// Execute the replicate-averaging pipeline.
pub fn run_mean(config: &MeanConfig) -> std::result::Result<MeanRun, AppError> {
    let lookup = load_sample_info(&config.sample_info)?;
    let series = load_series(&config.input, &config.extractor)?;
    let means = average_replicates(&series, &lookup);
    info!(labels = means.len(), wells = series.len(), "averaged replicates");

    let reports = config
        .fit_output
        .as_ref()
        .map(|_| fit_plate(&replicate_series(&means), &config.fit, str::to_string));

    Ok(MeanRun {
        lookup,
        means,
        reports,
    })
}

/// Execute the reformat pipeline: just the per-well series.
pub fn run_reformat(config: &ReformatConfig) -> std::result::Result<Vec<WellSeries>, AppError> {
    load_series(&config.input, &config.extractor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitResult, SelectionBand};
    use crate::io::sample_info::read_sample_info;
    use std::io::Cursor;

    fn header(lines: usize) -> String {
        (0..lines).map(|i| format!("Header line {i}\tvalue\n")).collect()
    }

    #[test]
    fn end_to_end_two_point_fit() {
        let text = format!(
            "{}A1\tA2\nTime [s]\t0\t3600\t7200\t10800\nMean\t0.1\t0.3\t0.5\t0.8\n",
            header(5)
        );
        let extractor = ExtractorOptions {
            skip_lines: 5,
            ..ExtractorOptions::default()
        };
        let reports = growth_reports(Cursor::new(text), &extractor, &FitOptions::default(), None).unwrap();

        assert_eq!(reports.len(), 1);
        let FitResult::Fit(fit) = reports["A1"].outcome.clone().unwrap() else {
            panic!("expected a fit for A1");
        };
        let b = (0.5_f64 / 0.3).ln() / 3600.0;
        assert_eq!(fit.n_points, 2);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert!((fit.growth_rate_per_minute - std::f64::consts::LN_2 / b / 60.0).abs() < 1e-4);
    }

    #[test]
    fn lookup_names_rows_and_keeps_order() {
        let lookup = read_sample_info("B3\tWT\tYPD\nB2\tWT\tYPD\n".as_bytes()).unwrap();
        let text = "Cycles / Well\t1\t2\t3\n\
B2\t1\t2\t3\nTime [s]\t0\t1800\t3600\nMean\t0.26\t0.4\t0.6\n\
Cycles / Well\t1\t2\t3\n\
B3\t1\t2\t3\nTime [s]\t0\t1800\t3600\nMean\t0.1\t0.12\t0.15\n";
        let reports =
            growth_reports(Cursor::new(text), &ExtractorOptions::default(), &FitOptions::default(), Some(&lookup))
                .unwrap();

        let keys: Vec<&str> = reports.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["WT-YPD_B2", "WT-YPD_B3"]);
        assert!(matches!(reports["WT-YPD_B3"].outcome, Ok(FitResult::NoData)));
    }

    #[test]
    fn structural_errors_abort_the_run() {
        let text = "A1\t1\nTime [s]\t0\nMean\tn/a\n";
        let err = growth_reports(Cursor::new(text), &ExtractorOptions::default(), &FitOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, crate::error::TecanError::UnexpectedFormat { line: 3, .. }));
    }

    #[test]
    fn run_mean_fits_averaged_curves_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("plate.txt");
        let info = dir.path().join("info.txt");
        std::fs::write(
            &export,
            "Application: Tecan i-control\n\
Cycles / Well\t1\t2\t3\t4\n\
B2\t1\t2\t3\t4\nTime [s]\t0\t1800\t3600\t5400\nMean\t0.2\t0.3\t0.45\t0.65\n\
Cycles / Well\t1\t2\t3\t4\n\
B3\t1\t2\t3\t4\nTime [s]\t0\t1800\t3600\t5400\nMean\t0.22\t0.32\t0.47\t0.69\n",
        )
        .unwrap();
        std::fs::write(&info, "Well\tStrain\tCondition\nB2\tWT\tYPD\nB3\tWT\tYPD\n").unwrap();

        let config = MeanConfig {
            input: export,
            sample_info: info,
            output: dir.path().join("mean.txt"),
            renamed_output: dir.path().join("new-tecan.txt"),
            fit_output: Some(dir.path().join("fit.txt")),
            extractor: ExtractorOptions::default(),
            fit: FitOptions {
                band: SelectionBand::REPLICATE,
                ..FitOptions::default()
            },
        };
        let run = run_mean(&config).unwrap();
        assert_eq!(run.means.len(), 1);
        assert!((run.means[0].values[0] - 0.21).abs() < 1e-12);

        let reports = run.reports.unwrap();
        assert!(matches!(reports["WT-YPD"].outcome, Ok(FitResult::Fit(_))));
    }

    #[test]
    fn export_without_tables_exits_with_three() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("empty.txt");
        std::fs::write(&export, "Application: Tecan i-control\nEnd Time:\t2016-06-09\n").unwrap();
        let err = load_series(&export, &ExtractorOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
