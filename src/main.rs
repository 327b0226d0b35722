//! Stereo calibration harness
//!
//! Runs one routine per invocation. Calibration files written by one routine
//! are read by the next, so a full run is:
//!
//! ```bash
//! stereo-calib --config samples/harness.yaml calibrate
//! stereo-calib --config samples/harness.yaml stereo-calibrate
//! stereo-calib --config samples/harness.yaml rectify
//! stereo-calib disparity left.png right.png stereo_pair_calibration.yml
//! ```
//!
//! Every view is written as a PNG into the output directory.

use clap::{Parser, Subcommand};
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::{error, info};
use std::path::PathBuf;
use stereo_calib::backend::{default_backend, VisionBackend};
use stereo_calib::config::HarnessConfig;
use stereo_calib::pipeline::{self, PipelineError};

/// Stereo camera calibration and disparity harness
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Harness configuration file (YAML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory the views and reports are written to
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Log debug messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Draw detected chessboard corners on every calibration image
    Corners,
    /// Undistort one left image with its intrinsic calibration
    Undistort {
        #[arg(long)]
        index: Option<u32>,
        /// Intrinsic calibration file; the left camera file when omitted
        #[arg(long)]
        calibration: Option<PathBuf>,
    },
    /// Calibrate the left and right cameras independently
    Calibrate,
    /// Absolute difference between the raw left and right images of a pair
    Difference {
        #[arg(long)]
        index: Option<u32>,
    },
    /// Estimate the pose between the cameras with fixed intrinsics
    StereoCalibrate,
    /// Rectify one calibration pair; a random one when no index is given
    Rectify {
        #[arg(long)]
        index: Option<u32>,
    },
    /// Rectify two images and compute a disparity map
    Disparity {
        image1: PathBuf,
        image2: PathBuf,
        /// Combined stereo calibration file (K1, d1, K2, d2, R, t)
        calibration: PathBuf,
    },
    /// Compute disparity maps over a grid of matcher parameters
    Sweep {
        image1: PathBuf,
        image2: PathBuf,
        calibration: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<HarnessConfig, PipelineError> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            HarnessConfig::load_from_yaml(path)?
        }
        None => HarnessConfig::default(),
    };
    if let Some(output) = &cli.output {
        config.output.directory = output.clone();
    }
    Ok(config)
}

fn backend() -> Result<Box<dyn VisionBackend>, PipelineError> {
    let backend = default_backend()?;
    info!("Using vision backend: {}", backend.name());
    Ok(backend)
}

fn run(cli: &Cli) -> Result<(), PipelineError> {
    let config = load_config(cli)?;

    match &cli.command {
        Command::Corners => {
            let summary = pipeline::display_corners(&config, backend()?.as_ref())?;
            println!(
                "Corners detected: {} left, {} right",
                summary.left_detected, summary.right_detected
            );
        }
        Command::Undistort { index, calibration } => {
            pipeline::undistort_view(&config, *index, calibration.as_deref())?;
        }
        Command::Calibrate => {
            pipeline::calibrate_both(&config, backend()?.as_ref())?;
        }
        Command::Difference { index } => {
            pipeline::stereo_difference(&config, *index)?;
        }
        Command::StereoCalibrate => {
            pipeline::stereo_calibrate_pair(&config, backend()?.as_ref())?;
        }
        Command::Rectify { index } => {
            let index = pipeline::rectify_and_display(&config, backend()?.as_ref(), *index)?;
            println!("Rectified pair {index}");
        }
        Command::Disparity {
            image1,
            image2,
            calibration,
        } => {
            pipeline::stereo_disparity(&config, backend()?.as_ref(), image1, image2, calibration)?;
        }
        Command::Sweep {
            image1,
            image2,
            calibration,
        } => {
            let saved =
                pipeline::matcher_sweep(&config, backend()?.as_ref(), image1, image2, calibration)?;
            println!("Saved {} disparity maps", saved.len());
        }
    }
    Ok(())
}

fn main() {
    // clap handles --help / --version and argument errors itself
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };

    // Keep the handle alive so file logs are flushed on exit
    let _logger = match Logger::try_with_str(level).and_then(|logger| {
        logger
            .log_to_file(
                FileSpec::default()
                    .directory("logs")
                    .suppress_timestamp()
                    .suffix("log"),
            )
            .duplicate_to_stdout(Duplicate::All)
            .format_for_files(detailed_format)
            .format_for_stdout(colored_detailed_format)
            // error;warn;info;debug;trace
            .set_palette("196;208;76;39;178".to_string())
            .start()
    }) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to start logger: {e}");
            std::process::exit(-1);
        }
    };

    if let Err(e) = run(&cli) {
        error!("{e}");
        std::process::exit(-1);
    }
}
