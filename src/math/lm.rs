//! Levenberg–Marquardt for the two-parameter exponential model.
//!
//! We minimize the sum of squared residuals in the linear (not log) scale:
//!
//! ```text
//! SSE(a, b) = Σ (y_i - a exp(b t_i))²
//! ```
//!
//! Each iteration solves the damped normal equations via the augmented
//! least-squares form in [`solve_damped_step`], with Marquardt's diagonal
//! scaling `D = sqrt(diag(JᵀJ))`. The damping factor shrinks after an accepted
//! step and grows after a rejected one.
//!
//! Steps are bounded MINPACK-style: `‖D δ‖ <= Δ`, starting from
//! `Δ = step_factor · ‖D x₀‖` (or `step_factor` when `x₀ = 0`) and doubling
//! after an accepted step that hit the bound. One step cannot throw the
//! parameters onto the flat region where `a exp(b t)` vanishes at every point.
//!
//! A model with `b = 0` is a constant, so the least-squares optimum never has
//! a larger SSE than the total sum of squares. A "converged" point above that
//! is a plateau, not a minimum, and is reported as a failure.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::FitFailure;
use crate::math::solve_damped_step;
use crate::models::{fill_jacobian_row, predict, PARAM_COUNT};

/// Solver tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LmSettings {
    pub max_iterations: usize,
    /// Relative SSE decrease below which we stop.
    pub f_tol: f64,
    /// Relative step size below which we stop.
    pub x_tol: f64,
    /// Gradient infinity-norm below which we stop.
    pub g_tol: f64,
    pub initial_lambda: f64,
    /// Damping beyond this means no downhill step exists.
    pub max_lambda: f64,
    /// Bound on the scaled step length, relative to the scaled parameters.
    pub step_factor: f64,
}

impl Default for LmSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            f_tol: 1e-12,
            x_tol: 1e-10,
            g_tol: 1e-15,
            initial_lambda: 1e-3,
            max_lambda: 1e16,
            step_factor: 100.0,
        }
    }
}

/// Converged parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmSolution {
    pub a: f64,
    pub b: f64,
    pub sse: f64,
    pub iterations: usize,
}

/// Fit `y ≈ a exp(b t)` starting from `(a0, b0)`.
pub fn fit_exponential(
    t: &[f64],
    y: &[f64],
    a0: f64,
    b0: f64,
    settings: &LmSettings,
) -> Result<LmSolution, FitFailure> {
    let n = t.len();
    if n == 0 || n != y.len() {
        return Err(FitFailure {
            iterations: 0,
            reason: format!("need matching, non-empty inputs (t={n}, y={})", y.len()),
        });
    }

    let mut params = [a0, b0];
    let mut sse = sum_squares(t, y, params[0], params[1]);
    if !sse.is_finite() {
        return Err(FitFailure {
            iterations: 0,
            reason: "non-finite residuals at the starting point".to_string(),
        });
    }

    let mean = y.iter().sum::<f64>() / n as f64;
    let tss: f64 = y.iter().map(|v| (v - mean) * (v - mean)).sum();
    let sum_y2: f64 = y.iter().map(|v| v * v).sum();
    let finish = |params: [f64; PARAM_COUNT], sse: f64, iterations: usize| {
        if sse > tss * (1.0 + 1e-9) + f64::EPSILON * sum_y2 {
            return Err(FitFailure {
                iterations,
                reason: format!("stalled at SSE {sse:e}, above the constant-model SSE {tss:e}"),
            });
        }
        Ok(LmSolution {
            a: params[0],
            b: params[1],
            sse,
            iterations,
        })
    };

    let mut lambda = settings.initial_lambda;
    let mut delta: Option<f64> = None;
    let mut jac = DMatrix::<f64>::zeros(n, PARAM_COUNT);
    let mut res = DVector::<f64>::zeros(n);
    let mut row = [0.0; PARAM_COUNT];

    for iteration in 1..=settings.max_iterations {
        for i in 0..n {
            fill_jacobian_row(t[i], params[0], params[1], &mut row);
            jac[(i, 0)] = row[0];
            jac[(i, 1)] = row[1];
            res[i] = y[i] - predict(t[i], params[0], params[1]);
        }

        let gradient = jac.transpose() * &res;
        if gradient.amax() <= settings.g_tol {
            return finish(params, sse, iteration);
        }

        let scale: Vec<f64> = (0..PARAM_COUNT)
            .map(|j| jac.column(j).norm().max(1e-12))
            .collect();
        let bound = *delta.get_or_insert_with(|| {
            let x_norm = scaled_norm(&scale, &params);
            settings.step_factor * if x_norm > 0.0 { x_norm } else { 1.0 }
        });

        // Inner loop: raise damping until a step does not increase the SSE.
        loop {
            let mut step = solve_damped_step(&jac, &res, &scale, lambda).ok_or_else(|| FitFailure {
                iterations: iteration,
                reason: "damped linear system could not be solved".to_string(),
            })?;
            let step_len = scaled_norm(&scale, &[step[0], step[1]]);
            let clipped = step_len > bound;
            if clipped {
                step *= bound / step_len;
            }

            let candidate = [params[0] + step[0], params[1] + step[1]];
            let candidate_sse = sum_squares(t, y, candidate[0], candidate[1]);
            let param_norm = (params[0] * params[0] + params[1] * params[1]).sqrt();
            let small_step = step.norm() <= settings.x_tol * (param_norm + settings.x_tol);

            if candidate_sse.is_finite() && candidate_sse <= sse {
                let decrease = sse - candidate_sse;
                params = candidate;
                sse = candidate_sse;
                lambda = (lambda / 10.0).max(1e-15);
                if clipped {
                    delta = Some(2.0 * bound);
                }

                if decrease <= settings.f_tol * sse || small_step {
                    return finish(params, sse, iteration);
                }
                break;
            }

            if small_step {
                // No representable downhill step left: we are at the minimum.
                return finish(params, sse, iteration);
            }

            lambda *= 10.0;
            if lambda > settings.max_lambda {
                return Err(FitFailure {
                    iterations: iteration,
                    reason: format!("damping exceeded {:e} without reducing the residual", settings.max_lambda),
                });
            }
        }
    }

    Err(FitFailure {
        iterations: settings.max_iterations,
        reason: "iteration limit reached".to_string(),
    })
}

fn scaled_norm(scale: &[f64], x: &[f64; PARAM_COUNT]) -> f64 {
    scale
        .iter()
        .zip(x)
        .map(|(d, v)| (d * v) * (d * v))
        .sum::<f64>()
        .sqrt()
}

fn sum_squares(t: &[f64], y: &[f64], a: f64, b: f64) -> f64 {
    t.iter()
        .zip(y)
        .map(|(&ti, &yi)| {
            let r = yi - predict(ti, a, b);
            r * r
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_exponential() {
        let t: Vec<f64> = (0..20).map(|i| i as f64 / 19.0).collect();
        let y: Vec<f64> = t.iter().map(|&ti| 0.05 * (2.5 * ti).exp()).collect();

        let sol = fit_exponential(&t, &y, 1.0, 0.0, &LmSettings::default()).unwrap();
        assert!((sol.a - 0.05).abs() < 1e-8, "a = {}", sol.a);
        assert!((sol.b - 2.5).abs() < 1e-8, "b = {}", sol.b);
        assert!(sol.sse < 1e-20);
    }

    #[test]
    fn two_points_are_interpolated_exactly() {
        let t = [0.5, 1.0];
        let y = [0.3, 0.5];
        let sol = fit_exponential(&t, &y, 1.0, 0.0, &LmSettings::default()).unwrap();
        assert!((predict(0.5, sol.a, sol.b) - 0.3).abs() < 1e-9);
        assert!((predict(1.0, sol.a, sol.b) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn fits_decay_with_negative_rate() {
        let t: Vec<f64> = (0..10).map(|i| i as f64 / 9.0).collect();
        let y: Vec<f64> = t.iter().map(|&ti| 0.7 * (-0.9 * ti).exp()).collect();
        let sol = fit_exponential(&t, &y, 1.0, 0.0, &LmSettings::default()).unwrap();
        assert!((sol.b + 0.9).abs() < 1e-8);
    }

    #[test]
    fn iteration_cap_is_reported_as_failure() {
        let t: Vec<f64> = (0..20).map(|i| i as f64 / 19.0).collect();
        let y: Vec<f64> = t.iter().map(|&ti| 0.05 * (2.5 * ti).exp()).collect();
        let settings = LmSettings {
            max_iterations: 1,
            ..LmSettings::default()
        };
        let err = fit_exponential(&t, &y, 1.0, 0.0, &settings).unwrap_err();
        assert_eq!(err.iterations, 1);
    }

    #[test]
    fn stopping_above_the_constant_model_is_a_failure() {
        // A loose gradient tolerance stops at the start, far from the data.
        let t = [0.0, 1.0];
        let y = [0.3172, 0.4147];
        let settings = LmSettings {
            g_tol: 1e9,
            ..LmSettings::default()
        };
        let err = fit_exponential(&t, &y, 1.0, 0.0, &settings).unwrap_err();
        assert_eq!(err.iterations, 1);
        assert!(err.reason.contains("constant-model"), "{}", err.reason);

        let b = (0.4147_f64 / 0.3172).ln();
        let sol = fit_exponential(&t, &y, 0.3172, b, &settings).unwrap();
        assert!(sol.sse < 1e-20);
    }

    #[test]
    fn step_bound_keeps_a_far_start_converging() {
        let t: Vec<f64> = (0..6).map(|i| i as f64 / 5.0).collect();
        let y: Vec<f64> = t.iter().map(|&ti| 0.26 * (0.976 * ti).exp()).collect();
        let settings = LmSettings {
            step_factor: 0.1,
            ..LmSettings::default()
        };
        let sol = fit_exponential(&t, &y, 1.0, 0.0, &settings).unwrap();
        assert!((sol.b - 0.976).abs() < 1e-8, "b = {}", sol.b);
    }

    #[test]
    fn rejects_empty_input() {
        assert!(fit_exponential(&[], &[], 1.0, 0.0, &LmSettings::default()).is_err());
    }
}
