//! Fitting a whole plate.
//!
//! Wells are fitted independently on the rayon pool. `collect` on an indexed
//! parallel iterator keeps the input order, so the report map is built in
//! the order the wells appeared in the export regardless of which fit
//! finishes first.

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::domain::{FitOptions, FitResult, SampleReport, WellSeries};
use crate::fit::fitter::fit_growth;

/// Fit every series and return reports keyed by sample ID, in input order.
///
/// `sample_id` maps a well ID to the name used in the report. If two wells
/// map to the same name, the well ID is appended to keep keys unique.
pub fn fit_plate<F>(series: &[WellSeries], opts: &FitOptions, sample_id: F) -> IndexMap<String, SampleReport>
where
    F: Fn(&str) -> String,
{
    let outcomes: Vec<_> = series
        .par_iter()
        .map(|s| (s.well_id.as_str(), fit_growth(&s.times, &s.values, opts)))
        .collect();

    let mut reports = IndexMap::with_capacity(outcomes.len());
    for (well_id, outcome) in outcomes {
        match &outcome {
            Ok(FitResult::Fit(fit)) => debug!(
                well = well_id,
                r2 = fit.r_squared,
                rate = fit.growth_rate_per_minute,
                n = fit.n_points,
                "fitted"
            ),
            Ok(FitResult::NoData) => debug!(well = well_id, "no in-band readings"),
            Err(failure) => warn!(well = well_id, "{failure}"),
        }

        let mut id = sample_id(well_id);
        if reports.contains_key(&id) {
            id = format!("{id}_{well_id}");
        }
        reports.insert(
            id.clone(),
            SampleReport {
                sample_id: id,
                well_id: well_id.to_string(),
                outcome,
            },
        );
    }
    reports
}

/// Counts used in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub fitted: usize,
    pub no_data: usize,
    pub failed: usize,
}

pub fn count_outcomes<'a>(reports: impl IntoIterator<Item = &'a SampleReport>) -> OutcomeCounts {
    let mut counts = OutcomeCounts::default();
    for r in reports {
        match r.outcome {
            Ok(FitResult::Fit(_)) => counts.fitted += 1,
            Ok(FitResult::NoData) => counts.no_data += 1,
            Err(_) => counts.failed += 1,
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SelectionBand;
    use crate::math::LmSettings;

    fn series(id: &str, scale: f64) -> WellSeries {
        let times: Vec<f64> = (0..12).map(|i| i as f64 * 900.0).collect();
        let values = times.iter().map(|&t| scale * 0.2 * (1e-4 * t).exp()).collect();
        WellSeries {
            well_id: id.to_string(),
            times,
            values,
        }
    }

    #[test]
    fn keeps_input_order_and_ids() {
        let plate: Vec<WellSeries> = ["C3", "A1", "B7", "A2"]
            .iter()
            .enumerate()
            .map(|(i, id)| series(id, 1.0 + i as f64 * 0.1))
            .collect();
        let reports = fit_plate(&plate, &FitOptions::default(), str::to_string);

        let keys: Vec<&str> = reports.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["C3", "A1", "B7", "A2"]);
        assert_eq!(count_outcomes(reports.values()).fitted, 4);
    }

    #[test]
    fn duplicate_sample_names_get_well_suffix() {
        let plate = vec![series("B2", 1.0), series("B3", 1.0)];
        let reports = fit_plate(&plate, &FitOptions::default(), |_| "WT-YPD".to_string());
        let keys: Vec<&str> = reports.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["WT-YPD", "WT-YPD_B3"]);
        assert_eq!(reports["WT-YPD_B3"].well_id, "B3");
    }

    #[test]
    fn no_data_does_not_stop_other_wells() {
        let mut flat = series("A1", 1.0);
        flat.values.iter_mut().for_each(|v| *v = 0.01);
        let plate = vec![flat, series("A2", 1.0)];
        let reports = fit_plate(&plate, &FitOptions::default(), str::to_string);
        let counts = count_outcomes(reports.values());
        assert_eq!(counts, OutcomeCounts { fitted: 1, no_data: 1, failed: 0 });
    }

    #[test]
    fn failed_well_is_recorded_and_the_rest_still_report() {
        // One iteration settles a curve already at the start point, but not a
        // growing one.
        let times: Vec<f64> = (0..6).map(|i| i as f64 * 900.0).collect();
        let flat = WellSeries {
            well_id: "A1".to_string(),
            times: times.clone(),
            values: vec![1.0; times.len()],
        };
        let growing = WellSeries {
            well_id: "A2".to_string(),
            values: times.iter().map(|&t| 0.3 * (2e-4 * t).exp()).collect(),
            times: times.clone(),
        };
        let blank = WellSeries {
            well_id: "A3".to_string(),
            values: vec![0.01; times.len()],
            times,
        };
        let opts = FitOptions {
            band: SelectionBand { lower: 0.1, upper: 2.0 },
            solver: LmSettings {
                max_iterations: 1,
                ..LmSettings::default()
            },
            ..FitOptions::default()
        };

        let reports = fit_plate(&[flat, growing, blank], &opts, str::to_string);
        let keys: Vec<&str> = reports.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["A1", "A2", "A3"]);
        assert!(matches!(reports["A1"].outcome, Ok(FitResult::Fit(_))));
        assert!(matches!(&reports["A2"].outcome, Err(failure) if failure.iterations == 1));
        assert!(matches!(reports["A3"].outcome, Ok(FitResult::NoData)));
        assert_eq!(
            count_outcomes(reports.values()),
            OutcomeCounts { fitted: 1, no_data: 1, failed: 1 }
        );
    }
}
