//! Curve fitting.
//!
//! Responsibilities:
//!
//! - select the exponential phase of each curve
//! - fit the exponential model and derive R² and growth rate
//! - fit many wells in parallel while keeping input order

pub mod batch;
pub mod fitter;
pub mod selection;

pub use batch::*;
pub use fitter::*;
pub use selection::*;
