//! Well-Contents lookup file.
//!
//! Tab-delimited, one well per row:
//!
//! ```text
//! Well    Strain                  Condition
//! B2      Hog1-GFP, Pbs2Δ, S83    Acetate_noWash
//! ```
//!
//! The header row is optional; any row whose first cell is `Well` is skipped.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::domain::SampleInfo;
use crate::error::{Result, TecanError};

/// Well ID → sample info, in file order.
pub type SampleLookup = IndexMap<String, SampleInfo>;

pub fn load_sample_info(path: &Path) -> Result<SampleLookup> {
    let file = File::open(path).map_err(|e| TecanError::io_path("open sample info file", path, e))?;
    let lookup = read_sample_info(file)?;
    debug!(path = %path.display(), wells = lookup.len(), "loaded sample info");
    Ok(lookup)
}

pub fn read_sample_info<R: Read>(reader: R) -> Result<SampleLookup> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut lookup = SampleLookup::new();
    for result in reader.records() {
        let record = result.map_err(|e| TecanError::csv("Failed to read sample info", e))?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

        let well = record.get(0).unwrap_or("");
        if well.is_empty() || well.eq_ignore_ascii_case("well") {
            continue;
        }
        if record.len() < 3 {
            return Err(TecanError::unexpected(
                line,
                format!("sample info row for {well} needs Well, Strain and Condition columns"),
            ));
        }

        let info = SampleInfo {
            well: well.to_string(),
            strain: record[1].to_string(),
            condition: record[2].to_string(),
        };
        if let Some(previous) = lookup.insert(info.well.clone(), info) {
            warn!(well = %previous.well, line, "well listed twice in sample info; keeping the later row");
        }
    }
    Ok(lookup)
}

/// The report/averaging label for a well, falling back to the well ID.
pub fn label_for(lookup: &SampleLookup, well_id: &str) -> String {
    match lookup.get(well_id) {
        Some(info) => info.label(),
        None => {
            warn!(well = well_id, "well missing from sample info; using its well ID");
            well_id.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "Well\tStrain\tCondition\n\
B2\tHog1-GFP, Pbs2Δ, S83\tAcetate_noWash\n\
B3\tHog1-GFP, Pbs2Δ, S83\tAcetate_noWash\n\
\n\
C2\tWT\tYPD\n";

    #[test]
    fn reads_rows_and_skips_header() {
        let lookup = read_sample_info(INFO.as_bytes()).unwrap();
        let wells: Vec<&str> = lookup.keys().map(String::as_str).collect();
        assert_eq!(wells, vec!["B2", "B3", "C2"]);
        assert_eq!(lookup["C2"].label(), "WT-YPD");
        assert_eq!(label_for(&lookup, "B3"), "Hog1-GFP-Pbs2Δ-S83-Acetate_noWash");
    }

    #[test]
    fn unknown_well_keeps_its_id() {
        let lookup = read_sample_info(INFO.as_bytes()).unwrap();
        assert_eq!(label_for(&lookup, "G12"), "G12");
    }

    #[test]
    fn short_row_is_unexpected_format() {
        let err = read_sample_info("Well\tStrain\tCondition\nB2\tWT\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TecanError::UnexpectedFormat { line: 2, .. }), "{err}");
    }
}
