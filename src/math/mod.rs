//! Numerical routines: SVD least squares and the Levenberg–Marquardt loop.

pub mod lm;
pub mod ols;

pub use lm::*;
pub use ols::*;
