//! Growth-rate fitting for a single well.
//!
//! Given a well's `(time, value)` series:
//! 1. keep the in-band points ([`select_in_band`])
//! 2. fit `value ≈ a exp(b t)` by nonlinear least squares from `a = 1, b = 0`
//! 3. compute `R² = 1 - RSS/TSS` on the selected points
//! 4. convert `b` (per second) to a growth rate `ln(2) / b / 60`
//!
//! The solver works on `s = (t - t_min) / (t_max - t_min)` rather than raw
//! seconds. This is an exact reparametrisation (`b = b_s / span`,
//! `a = a_s exp(-b t_min)`), and the `a = 1, b = 0` start maps to itself. With
//! `s` in `[0, 1]` the in-band solution sits close to the start even when a
//! well only reaches the band late in the run.

use tracing::trace;

use crate::domain::{FitOptions, FitResult, GrowthFit};
use crate::error::FitFailure;
use crate::fit::selection::select_in_band;
use crate::math::fit_exponential;
use crate::models::{predict, PARAM_COUNT};

const INITIAL_A: f64 = 1.0;
const INITIAL_B: f64 = 0.0;

/// Fit one well. Times must be in seconds.
pub fn fit_growth(times: &[f64], values: &[f64], opts: &FitOptions) -> Result<FitResult, FitFailure> {
    let selection = select_in_band(times, values, opts.band);
    let min_points = opts.min_points.max(1);
    if selection.is_empty() || selection.len() < min_points {
        trace!(selected = selection.len(), min_points, "not enough in-band points");
        return Ok(FitResult::NoData);
    }

    let t_min = selection.times.iter().copied().fold(f64::INFINITY, f64::min);
    let t_max = selection.times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = if t_max > t_min { t_max - t_min } else { 1.0 };
    let scaled: Vec<f64> = selection.times.iter().map(|t| (t - t_min) / span).collect();

    let solution = fit_exponential(&scaled, &selection.values, INITIAL_A, INITIAL_B, &opts.solver)?;

    let b = solution.b / span;
    let a = solution.a * (-b * t_min).exp();
    if !(a.is_finite() && b.is_finite()) {
        return Err(FitFailure {
            iterations: solution.iterations,
            reason: format!("non-finite parameters (a={a}, b={b})"),
        });
    }

    let rss: f64 = selection
        .times
        .iter()
        .zip(&selection.values)
        .map(|(&t, &v)| {
            let r = v - predict(t, a, b);
            r * r
        })
        .sum();
    let r_squared = r_squared(&selection.values, rss);

    trace!(a, b, r_squared, n = selection.len(), "fit converged");

    Ok(FitResult::Fit(GrowthFit {
        r_squared,
        growth_rate_per_minute: growth_rate_per_minute(b),
        amplitude: a,
        rate_constant: b,
        n_points: selection.len(),
        iterations: solution.iterations,
    }))
}

/// `1 - RSS/TSS`; NaN when every selected value is identical.
pub fn r_squared(values: &[f64], rss: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let tss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    if tss == 0.0 {
        return f64::NAN;
    }
    1.0 - rss / tss
}

/// `ln(2) / b`, with `b` per second, expressed per minute.
///
/// Non-positive `b` is passed through: a decaying fit gives a negative rate and
/// `b = 0` gives infinity.
pub fn growth_rate_per_minute(b: f64) -> f64 {
    std::f64::consts::LN_2 / b / 60.0
}

/// Smallest `min_points` for which the fit is not underdetermined.
pub const MIN_DETERMINED_POINTS: usize = PARAM_COUNT;
