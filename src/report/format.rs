//! Formatted terminal output.
//!
//! We keep formatting code in one place so the fitting code stays clean and
//! output changes are localized.

use indexmap::IndexMap;

use crate::domain::{FitOptions, FitResult, SampleReport};
use crate::fit::count_outcomes;

/// Format the run summary (input, band, outcome counts, per-sample table).
pub fn format_run_summary(
    input: &str,
    opts: &FitOptions,
    reports: &IndexMap<String, SampleReport>,
) -> String {
    let counts = count_outcomes(reports.values());
    let mut out = String::new();

    out.push_str("=== tecan - growth rate fit ===\n");
    out.push_str(&format!("Input: {input}\n"));
    out.push_str(&format!(
        "Band: [{}, {}] | min points: {}\n",
        opts.band.lower, opts.band.upper, opts.min_points
    ));
    out.push_str(&format!(
        "Samples: n={} | fitted={} | no data={} | failed={}\n\n",
        reports.len(),
        counts.fitted,
        counts.no_data,
        counts.failed
    ));

    out.push_str(&format!("{:<28} {:>5} {:>10} {:>14}\n", "sample", "n", "R^2", "rate/min").trim_end());
    out.push('\n');
    out.push_str(&format!("{:-<28} {:-<5} {:-<10} {:-<14}\n", "", "", "", "").trim_end());
    out.push('\n');

    for (id, r) in reports {
        let line = match &r.outcome {
            Ok(FitResult::Fit(fit)) => format!(
                "{:<28} {:>5} {:>10.4} {:>14.3}",
                truncate(id, 28),
                fit.n_points,
                fit.r_squared,
                fit.growth_rate_per_minute
            ),
            Ok(FitResult::NoData) => format!("{:<28} {:>5} {:>10}", truncate(id, 28), 0, "no data"),
            Err(_) => format!("{:<28} {:>5} {:>10}", truncate(id, 28), "-", "failed"),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
