//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - parsed export data (`RawBlock`, `WellSeries`)
//! - fit outputs (`FitResult`, `GrowthFit`, `SampleReport`)
//! - run configuration (`GrowthConfig`, `MeanConfig`, `ReformatConfig`)

pub mod types;

pub use types::*;
