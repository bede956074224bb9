//! Reporting utilities: replicate averaging and the terminal run summary.

pub mod format;

pub use format::*;

use indexmap::IndexMap;
use tracing::warn;

use crate::domain::{ReplicateMean, WellSeries};
use crate::io::sample_info::{label_for, SampleLookup};

/// Average technical replicates, grouping wells by their sample label.
///
/// Labels keep first-seen order. Replicates are averaged index by index; if
/// their lengths differ the average is truncated to the shortest one.
pub fn average_replicates(series: &[WellSeries], lookup: &SampleLookup) -> Vec<ReplicateMean> {
    let mut groups: IndexMap<String, Vec<&WellSeries>> = IndexMap::new();
    for s in series {
        groups.entry(label_for(lookup, &s.well_id)).or_default().push(s);
    }

    groups
        .into_iter()
        .map(|(label, members)| {
            let len = members.iter().map(|s| s.len()).min().unwrap_or(0);
            if members.iter().any(|s| s.len() != len) {
                warn!(
                    label = %label,
                    shortest = len,
                    "replicates have different lengths; truncating to the shortest"
                );
            }

            let count = members.len() as f64;
            let values = (0..len)
                .map(|j| members.iter().map(|s| s.values[j]).sum::<f64>() / count)
                .collect();

            ReplicateMean {
                wells: members.iter().map(|s| s.well_id.clone()).collect(),
                times: members[0].times[..len].to_vec(),
                values,
                label,
            }
        })
        .collect()
}

/// View averaged curves as series so they can go through the fitter.
pub fn replicate_series(means: &[ReplicateMean]) -> Vec<WellSeries> {
    means
        .iter()
        .map(|m| WellSeries {
            well_id: m.label.clone(),
            times: m.times.clone(),
            values: m.values.clone(),
        })
        .collect()
}
