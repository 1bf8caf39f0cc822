//! roiscan CLI - Command-line interface for evoked-response classification.
//!
//! Reads per-trial trace CSVs, classifies every ROI and writes threshold and
//! event reports for each group whose threshold cache validates.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use clap::{Args, Parser, Subcommand};
use log::{error, warn};
use roiscan_algorithms::{process_batch, process_group};
use roiscan_core::config::{AnalysisConfig, ExperimentType};
use roiscan_core::trace::RawTrace;
use roiscan_io::{load_settings, read_group_dir, read_trace, ReportWriter, TraceTiming};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    RoiscanIo(#[from] roiscan_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] roiscan_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{failed} of {total} groups produced no reports")]
    GroupsFailed { failed: usize, total: usize },
}

/// Evoked-response classification for ROI fluorescence traces.
#[derive(Parser)]
#[command(name = "roiscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (defaults to one per core)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Acquisition timing and settings shared by the analysis commands.
#[derive(Args, Debug, Clone)]
struct AnalysisArgs {
    /// Settings JSON; its experiment type must match the stimulus flags
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Sampling interval (milliseconds per frame)
    #[arg(long, default_value = "5.0")]
    ms_per_frame: f64,

    /// Stimulus frame (0-based data row)
    #[arg(long)]
    stimulus_frame: usize,

    /// Second stimulus frame, for paired-pulse recordings
    #[arg(long)]
    second_stimulus_frame: Option<usize>,
}

impl AnalysisArgs {
    fn timing(&self) -> TraceTiming {
        match self.second_stimulus_frame {
            Some(second) => TraceTiming::paired(self.ms_per_frame, self.stimulus_frame, second),
            None => TraceTiming::single(self.ms_per_frame, self.stimulus_frame),
        }
    }

    /// Settings from the file if given, otherwise defaults for the
    /// experiment type implied by the stimulus flags.
    fn config(&self) -> Result<AnalysisConfig> {
        match &self.settings {
            Some(path) => Ok(load_settings(path)?),
            None => {
                let experiment_type = if self.second_stimulus_frame.is_some() {
                    ExperimentType::PairedPulse
                } else {
                    ExperimentType::SingleStimulus
                };
                Ok(AnalysisConfig::default().with_experiment_type(experiment_type))
            }
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every ROI of one or more groups and write reports
    Analyze {
        /// Group directories; every *.csv inside is one trial
        #[arg(required = true)]
        groups: Vec<PathBuf>,

        /// Output directory for reports
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Show information about a trace CSV
    Info {
        /// Input trace CSV
        input: PathBuf,

        /// Sampling interval (milliseconds per frame)
        #[arg(long, default_value = "5.0")]
        ms_per_frame: f64,
    },

    /// Print the validated threshold cache of a group as JSON
    Thresholds {
        /// Group directory
        group: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

/// Fraction of finite samples in a trace.
fn finite_fraction(trace: &RawTrace) -> f64 {
    let total = trace.data().len();
    if total == 0 {
        return 0.0;
    }
    let finite = trace.data().iter().filter(|value| value.is_finite()).count();
    finite as f64 / total as f64
}

fn analyze(groups: &[PathBuf], output: &Path, args: &AnalysisArgs) -> Result<()> {
    let config = args.config()?;
    config.validate()?;
    let timing = args.timing();
    let start = Instant::now();

    let mut loaded = Vec::with_capacity(groups.len());
    let mut failed = 0usize;
    for dir in groups {
        match read_group_dir(dir, &timing) {
            Ok(group) => loaded.push(group),
            Err(e) => {
                error!("{}: {e}", dir.display());
                failed += 1;
            }
        }
    }

    let writer = ReportWriter::new(output)?;
    for (name, result) in process_batch(&loaded, &config) {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!("group '{name}' skipped: {e}");
                failed += 1;
                continue;
            }
        };
        let stats = &result.analysis.statistics;
        match writer.write_group(&result.analysis, &result.cache) {
            Ok(paths) => println!(
                "{}: {}/{} ROIs accepted ({} low noise, {} high noise), {} failed -> {}",
                name,
                stats.rois_accepted,
                stats.rois_observed,
                stats.low_noise,
                stats.high_noise,
                stats.rois_failed,
                paths.thresholds.display()
            ),
            Err(e) => {
                error!("group '{name}': writing reports failed: {e}");
                failed += 1;
            }
        }
    }

    println!(
        "Processed {} groups in {:.2}s",
        groups.len(),
        start.elapsed().as_secs_f64()
    );
    if failed > 0 {
        return Err(CliError::GroupsFailed {
            failed,
            total: groups.len(),
        });
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    match cli.command {
        Commands::Analyze {
            groups,
            output,
            analysis,
        } => analyze(&groups, &output, &analysis)?,

        Commands::Info {
            input,
            ms_per_frame,
        } => {
            let trace = read_trace(&input, &TraceTiming::single(ms_per_frame, 0))?;
            let rois: Vec<String> = trace.roi_numbers().iter().map(u32::to_string).collect();

            println!("File: {}", input.display());
            println!(
                "Frames: {} ({:.1} ms)",
                trace.frames(),
                trace.frames() as f64 * trace.ms_per_frame()
            );
            println!("ROIs: {}", trace.roi_count());
            println!("ROI numbers: {}", rois.join(", "));
            println!("Finite samples: {:.1}%", finite_fraction(&trace) * 100.0);
        }

        Commands::Thresholds { group, analysis } => {
            let config = analysis.config()?;
            let group = read_group_dir(&group, &analysis.timing())?;
            let result = process_group(&group, &config)?;
            println!("{}", serde_json::to_string_pretty(&*result.cache)?);
        }
    }

    Ok(())
}
