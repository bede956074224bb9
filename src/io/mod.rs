//! Input/output helpers.
//!
//! - Tecan export parsing (`tecan`)
//! - Well-Contents lookup (`sample_info`)
//! - flat-file outputs (`export`)
//! - fit JSON export (`fit_json`)

pub mod export;
pub mod fit_json;
pub mod sample_info;
pub mod tecan;

pub use export::*;
pub use fit_json::*;
pub use sample_info::*;
pub use tecan::*;
