//! The harness routines.
//!
//! Each routine reads its inputs, calls the vision backend and pixel
//! operations, prints a result block and writes its views and files. Routines
//! are independent of each other; they communicate only through the
//! calibration files.

use crate::backend::BackendError;
use crate::camera::CameraModelError;
use crate::config::{ConfigError, HarnessConfig};
use crate::imaging::ImagingError;
use crate::report::ReportError;
use crate::storage::{IntrinsicCalibration, StorageError};
use log::{error, info};
use std::path::Path;

mod calibrate;
mod collect;
mod inspect;
mod stereo;

pub use calibrate::{calibrate_both, stereo_calibrate_pair};
pub use collect::{collect_pair_detections, DetectionOptions, DetectionOutcome, PairDetection};
pub use inspect::{display_corners, stereo_difference, undistort_view, CornerDisplaySummary};
pub use stereo::{matcher_sweep, rectify_and_display, stereo_disparity, sweep_file_name};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Imaging(#[from] ImagingError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Camera(#[from] CameraModelError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("Not enough valid checkerboard detections: found {found}, need at least {required}")]
    InsufficientPairs { found: usize, required: usize },
    #[error("Index {index} is outside the image range {first}..{end}")]
    IndexOutOfRange { index: u32, first: u32, end: u32 },
}

/// Loads a per-camera calibration file, logging which one failed.
fn load_intrinsics(path: &Path) -> Result<IntrinsicCalibration, PipelineError> {
    IntrinsicCalibration::load(path).map_err(|e| {
        error!("Could not open {}: {e}", path.display());
        PipelineError::from(e)
    })
}

fn print_intrinsics(title: &str, calibration: &IntrinsicCalibration, rms: Option<f64>) {
    println!("\n=== {title} ===");
    if let Some(rms) = rms {
        println!("Reprojection Error = {rms} pixels");
    }
    println!("Camera Matrix (K):{}", calibration.camera_matrix);
    println!(
        "Distortion Coefficients: {:?}",
        calibration.dist_coeffs.as_slice()
    );
}

fn check_index(config: &HarnessConfig, index: u32) -> Result<(), PipelineError> {
    let range = config.index_range();
    if !range.contains(&index) {
        return Err(PipelineError::IndexOutOfRange {
            index,
            first: range.start,
            end: range.end,
        });
    }
    Ok(())
}

fn log_saved(routine: &str, count: usize, config: &HarnessConfig) {
    info!(
        "{routine}: saved {count} views to {}",
        config.output.directory.display()
    );
}
