//! `tecan-growth` library crate.
//!
//! The binary (`tecan`) is a thin wrapper around this library so that:
//!
//! - export parsing and curve fitting are testable without spawning processes
//! - the extractor and fitter can be driven from other tools over any `BufRead`

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
