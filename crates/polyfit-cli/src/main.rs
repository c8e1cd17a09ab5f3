//! polyfit-cli: command-line surface reconstruction from segmented point
//! clouds.
//!
//! # Logging
//!
//! Set `RUST_LOG` to control log output:
//! - `RUST_LOG=polyfit=info` - stage summaries
//! - `RUST_LOG=polyfit=debug` - detailed per-plane progress
//! - `RUST_LOG=polyfit::timing=info` - stage timing only
//!
//! # Example
//!
//! ```bash
//! polyfit reconstruct scan_segmented.ply -o model.obj
//! RUST_LOG=polyfit=debug polyfit reconstruct scan.ply -o model.obj --for-buildings
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod io;
mod output;

use commands::{info, reconstruct};

/// polyfit - reconstruct watertight planar surfaces from segmented point
/// clouds.
#[derive(Parser)]
#[command(name = "polyfit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct a surface from a segmented point cloud
    Reconstruct {
        /// Input PLY file with a per-vertex integer `segment` property
        input: PathBuf,

        /// Output OBJ file path
        #[arg(short, long)]
        output: PathBuf,

        /// Data-fit objective weight
        #[arg(long)]
        fit_weight: Option<f64>,

        /// Point-coverage objective weight
        #[arg(long)]
        coverage_weight: Option<f64>,

        /// Model-complexity objective weight
        #[arg(long)]
        complexity_weight: Option<f64>,

        /// Multiplier on mean point spacing for the alpha radius
        #[arg(long)]
        alpha_scale: Option<f64>,

        /// Residual tolerance for the support term (default: 3x spacing)
        #[arg(long)]
        residual_tolerance: Option<f64>,

        /// Bounding-box inflation as a fraction of the diagonal
        #[arg(long)]
        bbox_margin: Option<f64>,

        /// Allow bounding-box faces into the candidate set
        #[arg(long)]
        include_bbox_faces: bool,

        /// Solver wall-clock limit in seconds (0 = unlimited)
        #[arg(long, default_value = "0")]
        time_limit: f64,

        /// Relative optimality gap at which the solver may stop
        #[arg(long, default_value = "0")]
        gap: f64,

        /// Use the building-exterior preset (heavier complexity weight)
        #[arg(long, conflicts_with = "for_noisy_scans")]
        for_buildings: bool,

        /// Use the noisy-scan preset (wider alpha radius)
        #[arg(long, conflicts_with = "for_buildings")]
        for_noisy_scans: bool,
    },

    /// Display segment statistics for a segmented point cloud
    Info {
        /// Input PLY file with a per-vertex integer `segment` property
        input: PathBuf,
    },
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "polyfit=info",
            2 => "polyfit=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Reconstruct {
            input,
            output,
            fit_weight,
            coverage_weight,
            complexity_weight,
            alpha_scale,
            residual_tolerance,
            bbox_margin,
            include_bbox_faces,
            time_limit,
            gap,
            for_buildings,
            for_noisy_scans,
        } => reconstruct::run(
            input,
            output,
            &reconstruct::WeightArgs {
                fit_weight: *fit_weight,
                coverage_weight: *coverage_weight,
                complexity_weight: *complexity_weight,
                alpha_scale: *alpha_scale,
                residual_tolerance: *residual_tolerance,
                bbox_margin: *bbox_margin,
                include_bbox_faces: *include_bbox_faces,
                time_limit: *time_limit,
                gap: *gap,
                for_buildings: *for_buildings,
                for_noisy_scans: *for_noisy_scans,
            },
            &cli,
        ),
        Commands::Info { input } => info::run(input, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(core_err) = e.downcast_ref::<polyfit::ReconstructError>() {
                eprintln!("{}: {}", "Error".red().bold(), core_err);
                eprintln!("  {}: {}", "Code".cyan(), core_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    core_err.recovery_suggestion()
                );
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
