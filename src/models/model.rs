//! Exponential growth model evaluation.
//!
//! The fitter relies on two primitive operations:
//! - predict `y(t)` given `(a, b)` (for residuals and R²)
//! - fill a Jacobian row `∂y/∂(a, b)` (for the Levenberg–Marquardt step)

/// Number of free parameters in `a * exp(b * t)`.
pub const PARAM_COUNT: usize = 2;

/// Predict `y(t) = a * exp(b * t)`.
pub fn predict(t: f64, a: f64, b: f64) -> f64 {
    a * (b * t).exp()
}

/// Fill the Jacobian row of the model at `t`.
///
/// `out[0] = exp(b t)`, `out[1] = a t exp(b t)`.
pub fn fill_jacobian_row(t: f64, a: f64, b: f64, out: &mut [f64; PARAM_COUNT]) {
    let e = (b * t).exp();
    out[0] = e;
    out[1] = a * t * e;
}
