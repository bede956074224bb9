//! Selection of the exponential phase of a growth curve.
//!
//! Readings below the band are dominated by the blank/lag phase and readings
//! above it by saturation, so only in-band points enter the fit.

use crate::domain::SelectionBand;

/// In-band `(time, value)` pairs, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Keep pairs with `band.lower <= value <= band.upper`.
pub fn select_in_band(times: &[f64], values: &[f64], band: SelectionBand) -> Selection {
    let mut out = Selection::default();
    for (&t, &v) in times.iter().zip(values) {
        if band.contains(v) {
            out.times.push(t);
            out.values.push(v);
        }
    }
    out
}
