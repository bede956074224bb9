//! Growth model implementation.
//!
//! The model is implemented as small, pure functions so the solver can stay
//! generic over the parameter vector.

pub mod model;

pub use model::*;
