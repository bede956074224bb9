//! Linear least-squares solves used by the nonlinear fitter.
//!
//! Each Levenberg–Marquardt iteration solves a damped linear problem
//!
//! ```text
//! minimize ||J δ - r||² + λ ||D δ||²
//! ```
//!
//! which we express as an ordinary least-squares problem on the augmented
//! system `[J; sqrt(λ) D] δ = [r; 0]` and solve with SVD. SVD copes with the
//! tall (n + p rows, p columns) shape and with nearly collinear columns, which
//! show up when all selected times sit close together.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-14, 1e-12, 1e-10] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the damped step `[J; sqrt(λ) D] δ = [r; 0]`.
///
/// `scale` holds the diagonal of `D`; its length must equal the column count
/// of `jacobian`.
pub fn solve_damped_step(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    scale: &[f64],
    lambda: f64,
) -> Option<DVector<f64>> {
    let (n, p) = jacobian.shape();
    debug_assert_eq!(scale.len(), p);

    let mut aug = DMatrix::<f64>::zeros(n + p, p);
    aug.view_mut((0, 0), (n, p)).copy_from(jacobian);
    let damping = lambda.sqrt();
    for (j, d) in scale.iter().enumerate() {
        aug[(n + j, j)] = damping * d;
    }

    let mut rhs = DVector::<f64>::zeros(n + p);
    rhs.rows_mut(0, n).copy_from(residuals);

    solve_least_squares(&aug, &rhs)
}
