//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - initializes logging
//! - resolves arguments into run configuration
//! - runs the pipeline and writes the output files

use std::fs::File;
use std::io::BufReader;

use clap::{CommandFactory, Parser};
use clap::error::ErrorKind;
use tracing::{debug, info};

use crate::cli::{Cli, Command, GrowthArgs, InputArgs, MeanArgs, ReformatArgs, GROWTH_INFO, MEAN_INFO, REFORMAT_INFO};
use crate::domain::{ExtractorOptions, FitOptions, GrowthConfig, MeanConfig, ReformatConfig, SelectionBand};
use crate::error::{AppError, TecanError};
use crate::io::{write_botstein_table, write_fit_json, write_growth_report, write_renamed_export, write_replicate_table, FitFile};

pub mod pipeline;

/// Entry point for the `tecan` binary.
pub fn run() -> Result<(), AppError> {
    // A missing `.env` is the normal case.
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{err}");
                return Ok(());
            }
            // Usage errors, including a bare `tecan`, exit with status 1.
            _ => return Err(AppError::usage(err.render().to_string().trim_end())),
        },
    };

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Growth(args) => handle_growth(args, cli.quiet),
        Command::Mean(args) => handle_mean(args, cli.quiet),
        Command::Reformat(args) => handle_reformat(args),
    }
}

/// Install the `tracing` subscriber. `RUST_LOG` overrides the flags.
fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tecan_growth={level}")));

    // `try_init` fails only if a subscriber is already installed.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();

    debug!(level, "logging initialized");
}

fn handle_growth(args: GrowthArgs, quiet: bool) -> Result<(), AppError> {
    check_info(&args.input, GROWTH_INFO)?;
    let config = growth_config_from_args(&args)?;
    let run = pipeline::run_growth(&config)?;

    if !quiet {
        println!(
            "{}",
            crate::report::format_run_summary(&config.input.display().to_string(), &config.fit, &run.reports)
        );
    }

    write_growth_report(&config.output, &run.reports)?;
    info!(path = %config.output.display(), rows = run.reports.len(), "wrote growth report");

    if let Some(path) = &config.export_json {
        write_fit_json(path, &FitFile::new(&config.input, config.fit, &run.reports))?;
        info!(path = %path.display(), "wrote fit JSON");
    }

    Ok(())
}

fn handle_mean(args: MeanArgs, quiet: bool) -> Result<(), AppError> {
    check_info(&args.input, MEAN_INFO)?;
    let config = mean_config_from_args(&args)?;
    let run = pipeline::run_mean(&config)?;

    let input = File::open(&config.input).map_err(|e| TecanError::io_path("open Tecan export", &config.input, e))?;
    let renamed = write_renamed_export(BufReader::new(input), &config.renamed_output, &run.lookup)?;
    info!(path = %config.renamed_output.display(), rows = renamed, "wrote renamed export");

    write_replicate_table(&config.output, &run.means)?;
    info!(path = %config.output.display(), labels = run.means.len(), "wrote replicate means");

    if let (Some(path), Some(reports)) = (&config.fit_output, &run.reports) {
        if !quiet {
            println!(
                "{}",
                crate::report::format_run_summary(&config.input.display().to_string(), &config.fit, reports)
            );
        }
        write_growth_report(path, reports)?;
        info!(path = %path.display(), rows = reports.len(), "wrote replicate growth report");
    }

    Ok(())
}

fn handle_reformat(args: ReformatArgs) -> Result<(), AppError> {
    check_info(&args.input, REFORMAT_INFO)?;
    let config = ReformatConfig {
        input: required_input(&args.input, "reformat")?,
        output: args.output.clone(),
        extractor: extractor_options(&args.input),
    };
    let series = pipeline::run_reformat(&config)?;
    write_botstein_table(&config.output, &series)?;
    info!(path = %config.output.display(), wells = series.len(), "wrote growth table");
    Ok(())
}

/// `--info` prints the detailed usage and exits with status 1.
fn check_info(input: &InputArgs, text: &str) -> Result<(), AppError> {
    if input.info {
        return Err(AppError::usage(text.trim_end()));
    }
    Ok(())
}

fn usage(subcommand: &str) -> String {
    let mut cmd = Cli::command();
    match cmd.find_subcommand_mut(subcommand) {
        Some(sub) => sub.render_help().to_string(),
        None => cmd.render_help().to_string(),
    }
}

fn required_input(input: &InputArgs, subcommand: &str) -> Result<std::path::PathBuf, AppError> {
    input
        .file
        .clone()
        .ok_or_else(|| AppError::usage(format!("Missing required input file (-f).\n\n{}", usage(subcommand))))
}

fn extractor_options(input: &InputArgs) -> ExtractorOptions {
    ExtractorOptions {
        skip_lines: input.skip_lines,
        table_marker: input.table_marker.clone(),
    }
}

fn fit_options(lower: f64, upper: f64, min_points: usize) -> Result<FitOptions, AppError> {
    if !(lower.is_finite() && upper.is_finite()) || lower > upper {
        return Err(AppError::usage(format!(
            "Invalid selection band [{lower}, {upper}]: bounds must be finite with lower <= upper."
        )));
    }
    if min_points < crate::fit::MIN_DETERMINED_POINTS {
        return Err(AppError::usage(format!(
            "--min-points must be at least {} (the model has that many parameters).",
            crate::fit::MIN_DETERMINED_POINTS
        )));
    }
    Ok(FitOptions {
        band: SelectionBand { lower, upper },
        min_points,
        ..FitOptions::default()
    })
}

pub fn growth_config_from_args(args: &GrowthArgs) -> Result<GrowthConfig, AppError> {
    Ok(GrowthConfig {
        input: required_input(&args.input, "growth")?,
        sample_info: args.sample.clone(),
        output: args.output.clone(),
        export_json: args.export_json.clone(),
        extractor: extractor_options(&args.input),
        fit: fit_options(args.lower, args.upper, args.min_points)?,
    })
}

pub fn mean_config_from_args(args: &MeanArgs) -> Result<MeanConfig, AppError> {
    let input = required_input(&args.input, "mean")?;
    let sample_info = args.sample.clone().ok_or_else(|| {
        AppError::usage(format!("Missing required sample info file (-s).\n\n{}", usage("mean")))
    })?;
    Ok(MeanConfig {
        input,
        sample_info,
        output: args.output.clone(),
        renamed_output: args.renamed.clone(),
        fit_output: args.fit.clone(),
        extractor: extractor_options(&args.input),
        fit: fit_options(args.lower, args.upper, args.min_points)?,
    })
}
