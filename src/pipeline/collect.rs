//! Corner detection over a list of image pairs.

use super::PipelineError;
use crate::backend::{DetectionFlags, VisionBackend};
use crate::dataset::{ImagePair, Side};
use crate::imaging::{load_image, to_grayscale};
use crate::pattern::{Checkerboard, PatternSize};
use image::RgbImage;
use log::{debug, info, warn};
use nalgebra::{Matrix2xX, Matrix3xX};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionOptions {
    pub flags: DetectionFlags,
    /// Sub-pixel refinement window, `None` to keep the detector's corners.
    pub refine_window: Option<u32>,
}

/// A pair in which the board was found in both images.
#[derive(Debug, Clone, PartialEq)]
pub struct PairDetection {
    pub pair: ImagePair,
    pub left: Matrix2xX<f64>,
    pub right: Matrix2xX<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionOutcome {
    pub detections: Vec<PairDetection>,
    /// Pairs whose board was missed in at least one image.
    pub failed: Vec<ImagePair>,
    /// Images that could not be opened; their pairs were skipped.
    pub unreadable: Vec<PathBuf>,
}

impl DetectionOutcome {
    pub fn valid_pairs(&self) -> usize {
        self.detections.len()
    }

    pub fn failed_indices(&self) -> Vec<u32> {
        self.failed.iter().map(|pair| pair.index).collect()
    }

    /// The board model repeated once per valid pair.
    pub fn object_points(&self, board: &Checkerboard) -> Vec<Matrix3xX<f64>> {
        let points = board.object_points();
        vec![points; self.detections.len()]
    }

    pub fn left_points(&self) -> Vec<Matrix2xX<f64>> {
        self.detections.iter().map(|d| d.left.clone()).collect()
    }

    pub fn right_points(&self) -> Vec<Matrix2xX<f64>> {
        self.detections.iter().map(|d| d.right.clone()).collect()
    }
}

/// Loads one image of a pair.
///
/// An image that cannot be opened is logged and recorded in `unreadable`.
fn load_side(
    pair: &ImagePair,
    side: Side,
    unreadable: &mut Vec<PathBuf>,
) -> Option<RgbImage> {
    let path = pair.path(side);
    match load_image(path) {
        Ok(img) => Some(img),
        Err(e) => {
            warn!("Could not open {} image: {e}", side.label());
            unreadable.push(path.to_path_buf());
            None
        }
    }
}

/// Loads both images of a pair; the right image is not tried when the left
/// one already failed.
pub(super) fn load_pair(
    pair: &ImagePair,
    unreadable: &mut Vec<PathBuf>,
) -> Option<(RgbImage, RgbImage)> {
    let left = load_side(pair, Side::Left, unreadable)?;
    let right = load_side(pair, Side::Right, unreadable)?;
    Some((left, right))
}

/// Detects the board in every pair, keeping only pairs where both views
/// succeed.
///
/// Unreadable images and failed detections are recorded and the loop moves
/// on to the next pair. Errors raised by the backend itself abort the run.
pub fn collect_pair_detections(
    backend: &dyn VisionBackend,
    pairs: &[ImagePair],
    pattern: PatternSize,
    options: &DetectionOptions,
) -> Result<DetectionOutcome, PipelineError> {
    let mut outcome = DetectionOutcome::default();

    for pair in pairs {
        let Some((left, right)) = load_pair(pair, &mut outcome.unreadable) else {
            continue;
        };
        let left_gray = to_grayscale(&left);
        let right_gray = to_grayscale(&right);

        let found_left = backend.find_chessboard_corners(&left_gray, pattern, options.flags)?;
        let found_right = backend.find_chessboard_corners(&right_gray, pattern, options.flags)?;

        match (found_left, found_right) {
            (Some(mut left_corners), Some(mut right_corners)) => {
                if let Some(window) = options.refine_window {
                    backend.refine_corners(&left_gray, &mut left_corners, window)?;
                    backend.refine_corners(&right_gray, &mut right_corners, window)?;
                }
                debug!("Pair {} detected", pair.index);
                outcome.detections.push(PairDetection {
                    pair: pair.clone(),
                    left: left_corners,
                    right: right_corners,
                });
            }
            _ => {
                warn!(
                    "Checkerboard detection failed for pair: {} and {}",
                    pair.left.display(),
                    pair.right.display()
                );
                outcome.failed.push(pair.clone());
            }
        }
    }

    info!(
        "Total valid stereo pairs: {} of {} ({} failed, {} unreadable images)",
        outcome.valid_pairs(),
        pairs.len(),
        outcome.failed.len(),
        outcome.unreadable.len()
    );
    Ok(outcome)
}
