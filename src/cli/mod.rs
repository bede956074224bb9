//! Command-line parsing for the Tecan growth tools.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! parsing/fitting code. Every numeric knob can also be set through the
//! environment (or a `.env` file), which is handy when a lab runs the same
//! band settings for a whole series of plates.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "tecan",
    version,
    about = "Growth-curve reduction for Tecan plate-reader exports",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors and skip the terminal summary.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit an exponential to every well and write R² and growth rate per sample.
    Growth(GrowthArgs),
    /// Rename wells from a sample info file and average technical replicates.
    Mean(MeanArgs),
    /// Re-emit the export as a `Well,Name,<minutes>` CSV table.
    Reformat(ReformatArgs),
}

/// Input options shared by every subcommand.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Tecan export, saved as tab-delimited text.
    #[arg(short = 'f', long = "file", value_name = "TECAN_TXT")]
    pub file: Option<PathBuf>,

    /// Print detailed usage information and exit.
    #[arg(short = 'i', long = "info")]
    pub info: bool,

    /// Lines to discard before looking for the first table.
    #[arg(long, env = "TECAN_SKIP_LINES", default_value_t = 0)]
    pub skip_lines: usize,

    /// Line prefix that opens a table block.
    #[arg(long, env = "TECAN_TABLE_MARKER", default_value = "Cycles / Well")]
    pub table_marker: String,
}

/// Options for `tecan growth`.
#[derive(Debug, Args, Clone)]
pub struct GrowthArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Well Contents file (Well, Strain, Condition); names the report rows.
    #[arg(short = 's', long = "sample", value_name = "SAMPLE_INFO")]
    pub sample: Option<PathBuf>,

    /// Growth report path.
    #[arg(short = 'o', long, default_value = "tecan-result.txt")]
    pub output: PathBuf,

    /// Also write fitted parameters for every sample as JSON.
    #[arg(long = "export-json", value_name = "JSON")]
    pub export_json: Option<PathBuf>,

    /// Lower bound of the readings used for the fit.
    #[arg(long, env = "TECAN_LOWER_BOUND", default_value_t = 0.25)]
    pub lower: f64,

    /// Upper bound of the readings used for the fit.
    #[arg(long, env = "TECAN_UPPER_BOUND", default_value_t = 0.70)]
    pub upper: f64,

    /// Minimum number of in-band readings; fewer yields NO DATA.
    #[arg(long, env = "TECAN_MIN_POINTS", default_value_t = 2)]
    pub min_points: usize,
}

/// Options for `tecan mean`.
#[derive(Debug, Args, Clone)]
pub struct MeanArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Well Contents file (Well, Strain, Condition).
    #[arg(short = 's', long = "sample", value_name = "SAMPLE_INFO")]
    pub sample: Option<PathBuf>,

    /// Averaged replicate table path.
    #[arg(short = 'o', long, default_value = "tecan-mean.txt")]
    pub output: PathBuf,

    /// Copy of the export with wells renamed to sample labels.
    #[arg(long, default_value = "new-tecan.txt")]
    pub renamed: PathBuf,

    /// Fit the averaged curves and write a growth report to this path.
    #[arg(long, value_name = "REPORT")]
    pub fit: Option<PathBuf>,

    /// Lower bound of the readings used for the fit.
    #[arg(long, env = "TECAN_LOWER_BOUND", default_value_t = 0.25)]
    pub lower: f64,

    /// Upper bound of the readings used for the fit.
    #[arg(long, env = "TECAN_UPPER_BOUND", default_value_t = 0.75)]
    pub upper: f64,

    /// Minimum number of in-band readings; fewer yields NO DATA.
    #[arg(long, env = "TECAN_MIN_POINTS", default_value_t = 2)]
    pub min_points: usize,
}

/// Options for `tecan reformat`.
#[derive(Debug, Args, Clone)]
pub struct ReformatArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// CSV output path.
    #[arg(short = 'o', long, default_value = "tecan-growth.csv")]
    pub output: PathBuf,
}

pub const GROWTH_INFO: &str = "\
tecan growth

Purpose: Calculate the growth rate for all samples in a Tecan file.

Input:   Tecan text file. Generate it by exporting the Tecan Excel sheet
         as a plain tab-delimited text file.
         Required parameters: -f tecan.txt
         Optional: -s sample-info.txt (Well, Strain, Condition) to name rows.

Method:  Mean readings inside [--lower, --upper] (default 0.25..0.70) are
         fitted to Mean = a * exp(b * Time); R^2 is computed on the same
         points and the growth rate is ln(2) / b / 60.

Output:  Tab-delimited table Cell_ID, R^2, GrowthRate (default
         tecan-result.txt). Wells without in-band readings are marked
         NO DATA, wells whose fit did not converge FIT FAILED.

To run:  tecan growth -f tecan.txt
";

pub const MEAN_INFO: &str = "\
tecan mean

Purpose: Average technical replicates in a Tecan file.

Input:   Tecan text file and a sample info file.
         Required parameters: -f tecan.txt -s sample-info.txt
         sample-info.txt has 3 tab-delimited columns:
             Well    Strain                  Condition
             B2      Hog1-GFP, Pbs2Δ, S83    Acetate_noWash

Output:  A copy of the Tecan file with well names (like B2) replaced by
         Strain-Condition labels (default new-tecan.txt), and a table with
         times in minutes and the replicate average per label (default
         tecan-mean.txt). With --fit REPORT the averaged curves are also
         fitted (band 0.25..0.75 by default).

To run:  tecan mean -f tecan.txt -s sample-info.txt
";

pub const REFORMAT_INFO: &str = "\
tecan reformat

Purpose: Re-emit a Tecan file as a flat growth table.

Input:   Tecan text file. Required parameters: -f tecan.txt

Output:  CSV with columns Well, Name, then one column per reading time in
         minutes; one row per well with its Mean readings.

To run:  tecan reformat -f tecan.txt -o growth.csv
";
