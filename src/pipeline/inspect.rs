//! Routines that only look at images: corner overlays, undistortion and the
//! raw left/right difference.

use super::collect::load_pair;
use super::{load_intrinsics, log_saved, PipelineError};
use crate::backend::{DetectionFlags, VisionBackend};
use crate::config::HarnessConfig;
use crate::dataset::Side;
use crate::imaging::{
    abs_diff, blend, channel_means, draw_chessboard_corners, draw_horizontal_line, load_image,
    resize, save_view, to_grayscale, GUIDE_GREEN,
};
use crate::rectify::undistort_image;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Counts gathered while overlaying detected corners.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CornerDisplaySummary {
    pub left_detected: usize,
    pub right_detected: usize,
    pub failed_left: Vec<PathBuf>,
    pub failed_right: Vec<PathBuf>,
    pub unreadable: Vec<PathBuf>,
    pub saved: Vec<PathBuf>,
}

/// Detects the board in every pair of the range and saves each image with
/// its corners drawn.
///
/// Both images of a pair must open before either is examined, and the right
/// board is only searched for when the left one was found.
pub fn display_corners(
    config: &HarnessConfig,
    backend: &dyn VisionBackend,
) -> Result<CornerDisplaySummary, PipelineError> {
    let board = config.checkerboard();
    let naming = config.naming();
    let mut summary = CornerDisplaySummary::default();

    for pair in naming.pairs(config.index_range()) {
        let Some((mut left, mut right)) = load_pair(&pair, &mut summary.unreadable) else {
            continue;
        };
        let flags = DetectionFlags::standard();
        let Some(corners) =
            backend.find_chessboard_corners(&to_grayscale(&left), board.size, flags)?
        else {
            warn!("Chessboard not found in left image {}", pair.left.display());
            summary.failed_left.push(pair.left.clone());
            continue;
        };
        summary.left_detected += 1;
        draw_chessboard_corners(&mut left, board.size, &corners);
        let view = format!("Corners Left {:04}", pair.index);
        summary
            .saved
            .push(save_view(&config.output.directory, &view, &left)?);

        match backend.find_chessboard_corners(&to_grayscale(&right), board.size, flags)? {
            Some(corners) => {
                summary.right_detected += 1;
                draw_chessboard_corners(&mut right, board.size, &corners);
                let view = format!("Corners Right {:04}", pair.index);
                summary
                    .saved
                    .push(save_view(&config.output.directory, &view, &right)?);
            }
            None => {
                warn!("Chessboard not found in right image {}", pair.right.display());
                summary.failed_right.push(pair.right.clone());
            }
        }
    }

    if summary.left_detected != summary.right_detected {
        warn!(
            "Mismatch in detected corners: {} left vs {} right",
            summary.left_detected, summary.right_detected
        );
        for path in summary.failed_left.iter().chain(&summary.failed_right) {
            warn!("  failed: {}", path.display());
        }
    }
    info!(
        "Detected corners in {} left and {} right images",
        summary.left_detected, summary.right_detected
    );
    log_saved("corners", summary.saved.len(), config);
    Ok(summary)
}

/// Undistorts one left image with its calibration and saves the original and
/// the corrected view, each crossed by a horizontal line through the middle,
/// plus a 50/50 blend of the two unmarked images.
pub fn undistort_view(
    config: &HarnessConfig,
    index: Option<u32>,
    calibration: Option<&Path>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let index = index.unwrap_or(config.dataset.undistort_index);
    let calibration_path = calibration.unwrap_or(&config.calibration.left_file);
    let calibration = load_intrinsics(calibration_path)?;

    let path = config.naming().path(Side::Left, index);
    let original = load_image(&path)?;
    let undistorted = undistort_image(&original, &calibration)?;

    let center = original.height() / 2;
    let mut original_lined = original.clone();
    let mut undistorted_lined = undistorted.clone();
    draw_horizontal_line(&mut original_lined, center, 2, GUIDE_GREEN);
    draw_horizontal_line(&mut undistorted_lined, center, 2, GUIDE_GREEN);
    let overlay = blend(&original, 0.5, &undistorted, 0.5, 0.0)?;

    let dir = &config.output.directory;
    let saved = vec![
        save_view(dir, "Original with Line", &original_lined)?,
        save_view(dir, "Undistorted with Line", &undistorted_lined)?,
        save_view(dir, "Blended Overlay Comparison", &overlay)?,
    ];
    log_saved("undistort", saved.len(), config);
    Ok(saved)
}

/// Compares the raw left and right images of one pair.
///
/// The right image is resized to the left one when they differ. Returns the
/// mean absolute difference per channel in R, G, B order.
pub fn stereo_difference(
    config: &HarnessConfig,
    index: Option<u32>,
) -> Result<[f64; 3], PipelineError> {
    let index = index.unwrap_or(config.dataset.difference_index);
    let pair = config.naming().pair(index);
    let left = load_image(&pair.left)?;
    let mut right = load_image(&pair.right)?;
    if right.dimensions() != left.dimensions() {
        info!(
            "Resizing right image from {:?} to {:?}",
            right.dimensions(),
            left.dimensions()
        );
        right = resize(&right, left.width(), left.height());
    }

    let difference = abs_diff(&left, &right)?;
    let means = channel_means(&difference);
    println!("Average pixel difference (RGB): {means:?}");

    let overlay = blend(&left, 0.5, &right, 0.5, 0.0)?;
    let dir = &config.output.directory;
    save_view(dir, "Difference", &difference)?;
    save_view(dir, "Blended Overlay", &overlay)?;
    log_saved("difference", 2, config);
    Ok(means)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{sample_intrinsics, ScriptedBackend};
    use crate::imaging::save_image;
    use crate::pipeline::fixtures::{config_in, write_capture, write_pair, HEIGHT, WIDTH};
    use image::{Rgb, RgbImage};
    use nalgebra::{DVector, Matrix3};

    #[test]
    fn test_display_corners_counts_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), 4);
        config.pattern.columns = 3;
        config.pattern.rows = 2;
        write_pair(&config, 1, true);
        write_pair(&config, 2, false);
        write_capture(&config, Side::Left, 3, true);
        write_capture(&config, Side::Right, 3, false);
        // pair 4 missing

        let backend = ScriptedBackend::default();
        let summary = display_corners(&config, &backend).unwrap();

        assert_eq!(summary.left_detected, 2);
        assert_eq!(summary.right_detected, 1);
        assert_eq!(summary.failed_left, vec![config.naming().path(Side::Left, 2)]);
        assert_eq!(summary.failed_right, vec![config.naming().path(Side::Right, 3)]);
        assert_eq!(summary.unreadable, vec![config.naming().path(Side::Left, 4)]);
        assert_eq!(summary.saved.len(), 3);
        assert!(config.output_path("corners_left_0001.png").exists());
        // right side of pair 2 is never examined
        assert_eq!(backend.detections.get(), 5);
    }

    #[test]
    fn test_display_corners_skips_pair_without_right_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), 2);
        config.pattern.columns = 3;
        config.pattern.rows = 2;
        write_pair(&config, 1, true);
        write_capture(&config, Side::Left, 2, true);

        let backend = ScriptedBackend::default();
        let summary = display_corners(&config, &backend).unwrap();

        assert_eq!(summary.left_detected, 1);
        assert_eq!(summary.left_detected, summary.right_detected);
        assert_eq!(summary.unreadable, vec![config.naming().path(Side::Right, 2)]);
        assert!(summary.failed_left.is_empty());
        assert!(!config.output_path("corners_left_0002.png").exists());
        assert_eq!(backend.detections.get(), 2);
    }

    #[test]
    fn test_undistort_view_writes_three_views() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 1);
        write_capture(&config, Side::Left, 1, true);
        let calibration = crate::storage::IntrinsicCalibration::new(
            Matrix3::new(40.0, 0.0, 16.0, 0.0, 40.0, 12.0, 0.0, 0.0, 1.0),
            DVector::zeros(5),
        );
        calibration.save(&config.calibration.left_file).unwrap();

        let saved = undistort_view(&config, None, None).unwrap();
        assert_eq!(saved.len(), 3);
        assert!(saved.iter().all(|p| p.exists()));
        assert_eq!(
            saved[2].file_name().unwrap(),
            "blended_overlay_comparison.png"
        );
        let lined = image::open(&saved[0]).unwrap().to_rgb8();
        assert_eq!(lined.get_pixel(3, HEIGHT / 2), &GUIDE_GREEN);
        // the blend is made from the unmarked images
        let blended = image::open(&saved[2]).unwrap().to_rgb8();
        assert_ne!(blended.get_pixel(3, HEIGHT / 2), &GUIDE_GREEN);
    }

    #[test]
    fn test_undistort_view_needs_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 1);
        write_capture(&config, Side::Left, 1, true);
        let other = dir.path().join("elsewhere.yml");
        assert!(matches!(
            undistort_view(&config, Some(1), Some(&other)),
            Err(PipelineError::Storage(_))
        ));
        sample_intrinsics().save(&other).unwrap();
        assert!(undistort_view(&config, Some(1), Some(&other)).is_ok());
    }

    /// Writes PNG data under the capture's `.JPG` name so pixel values
    /// survive exactly.
    fn write_lossless(path: &Path, img: &RgbImage) {
        let staging = path.with_extension("png");
        save_image(img, &staging).unwrap();
        std::fs::rename(&staging, path).unwrap();
    }

    #[test]
    fn test_stereo_difference_resizes_right() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 1);
        let naming = config.naming();
        write_lossless(
            &naming.path(Side::Left, 1),
            &RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([100, 50, 10])),
        );
        write_lossless(
            &naming.path(Side::Right, 1),
            &RgbImage::from_pixel(WIDTH * 2, HEIGHT * 2, Rgb([60, 50, 30])),
        );

        let means = stereo_difference(&config, None).unwrap();
        assert_eq!(means, [40.0, 0.0, 20.0]);
        assert!(config.output_path("difference.png").exists());
        assert!(config.output_path("blended_overlay.png").exists());
    }

    #[test]
    fn test_stereo_difference_missing_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 1);
        assert!(matches!(
            stereo_difference(&config, Some(9)),
            Err(PipelineError::Imaging(_))
        ));
    }
}
