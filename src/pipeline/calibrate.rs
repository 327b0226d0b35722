//! Intrinsic calibration of both cameras and stereo calibration of the pair.

use super::collect::{collect_pair_detections, DetectionOptions, DetectionOutcome};
use super::{load_intrinsics, print_intrinsics, PipelineError};
use crate::backend::{DetectionFlags, VisionBackend};
use crate::config::HarnessConfig;
use crate::report::{export_corners_csv, write_summary, CameraSummary, RunSummary, StereoSummary};
use crate::storage::StereoCalibration;
use log::info;

pub const CALIBRATION_SUMMARY_FILE: &str = "calibration_summary.json";
pub const STEREO_SUMMARY_FILE: &str = "stereo_summary.json";
pub const CORNERS_FILE: &str = "corners.csv";

fn summary_for(config: &HarnessConfig, routine: &str, outcome: &DetectionOutcome) -> RunSummary {
    RunSummary {
        routine: routine.to_string(),
        pattern: config.checkerboard().size,
        square_size: config.pattern.square_size,
        image_size: config.image_size,
        valid_pairs: outcome.valid_pairs(),
        failed_pairs: outcome.failed_indices(),
        unreadable_images: outcome.unreadable.clone(),
        cameras: Vec::new(),
        stereo: None,
    }
}

/// Calibrates the left and right cameras independently from every pair in
/// which the board was found, and writes one intrinsic file per camera.
pub fn calibrate_both(
    config: &HarnessConfig,
    backend: &dyn VisionBackend,
) -> Result<RunSummary, PipelineError> {
    let board = config.checkerboard();
    let pairs = config.naming().pairs(config.index_range());
    let options = DetectionOptions {
        flags: if config.calibration.grayscale_preprocessing {
            DetectionFlags::preprocessed()
        } else {
            DetectionFlags::default()
        },
        refine_window: Some(config.calibration.refine_window),
    };

    let outcome = collect_pair_detections(backend, &pairs, board.size, &options)?;
    if outcome.detections.is_empty() {
        return Err(PipelineError::InsufficientPairs {
            found: 0,
            required: 1,
        });
    }

    let object_points = outcome.object_points(&board);
    let left = backend.calibrate_camera(&object_points, &outcome.left_points(), config.image_size)?;
    let right =
        backend.calibrate_camera(&object_points, &outcome.right_points(), config.image_size)?;

    left.calibration.save(&config.calibration.left_file)?;
    right.calibration.save(&config.calibration.right_file)?;
    info!(
        "Saved intrinsics to {} and {}",
        config.calibration.left_file.display(),
        config.calibration.right_file.display()
    );

    print_intrinsics("Left Camera Calibration", &left.calibration, Some(left.rms));
    print_intrinsics("Right Camera Calibration", &right.calibration, Some(right.rms));

    let mut summary = summary_for(config, "calibrate", &outcome);
    summary.cameras = vec![
        CameraSummary::new("left", &left.calibration, left.rms),
        CameraSummary::new("right", &right.calibration, right.rms),
    ];
    write_summary(config.output_path(CALIBRATION_SUMMARY_FILE), &summary)?;
    export_corners_csv(
        config.output_path(CORNERS_FILE),
        &outcome.detections,
        &board.object_points(),
    )?;
    Ok(summary)
}

/// Estimates the pose between the cameras with their intrinsics held fixed.
///
/// Writes the extrinsic file and the combined six-key file used by the
/// disparity routines.
pub fn stereo_calibrate_pair(
    config: &HarnessConfig,
    backend: &dyn VisionBackend,
) -> Result<RunSummary, PipelineError> {
    let left_intrinsics = load_intrinsics(&config.calibration.left_file)?;
    let right_intrinsics = load_intrinsics(&config.calibration.right_file)?;
    println!("Loaded Camera Matrices");
    print_intrinsics("Left Camera", &left_intrinsics, None);
    print_intrinsics("Right Camera", &right_intrinsics, None);

    let board = config.checkerboard();
    let pairs = config.naming().pairs(config.index_range());
    let options = DetectionOptions {
        flags: DetectionFlags::standard(),
        refine_window: config
            .calibration
            .refine_stereo_corners
            .then_some(config.calibration.refine_window),
    };

    let outcome = collect_pair_detections(backend, &pairs, board.size, &options)?;
    let required = config.calibration.min_stereo_pairs;
    if outcome.valid_pairs() < required {
        return Err(PipelineError::InsufficientPairs {
            found: outcome.valid_pairs(),
            required,
        });
    }

    let result = backend.stereo_calibrate(
        &outcome.object_points(&board),
        &outcome.left_points(),
        &outcome.right_points(),
        &left_intrinsics,
        &right_intrinsics,
        config.image_size,
    )?;

    result.extrinsics.save(&config.calibration.stereo_file)?;
    let combined = StereoCalibration {
        left: result.left.clone(),
        right: result.right.clone(),
        rotation: result.extrinsics.rotation,
        translation: result.extrinsics.translation,
    };
    combined.save(&config.calibration.combined_file)?;
    info!(
        "Saved stereo calibration to {} and {}",
        config.calibration.stereo_file.display(),
        config.calibration.combined_file.display()
    );

    println!("\n=== Stereo Calibration ===");
    println!("Reprojection Error = {} pixels", result.rms);
    println!("Rotation Matrix (R):{}", result.extrinsics.rotation);
    println!("Translation Vector (T):{}", result.extrinsics.translation);
    println!("Baseline = {}", result.extrinsics.baseline());

    let mut summary = summary_for(config, "stereo-calibrate", &outcome);
    summary.cameras = vec![
        CameraSummary::new("left", &result.left, result.rms),
        CameraSummary::new("right", &result.right, result.rms),
    ];
    summary.stereo = Some(StereoSummary::new(&result.extrinsics, result.rms));
    write_summary(config.output_path(STEREO_SUMMARY_FILE), &summary)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{sample_intrinsics, ScriptedBackend};
    use crate::dataset::Side;
    use crate::pipeline::fixtures::{config_in, write_capture, write_pair};
    use crate::storage::{read_stereo_calibration, IntrinsicCalibration, StereoExtrinsics};
    use approx::assert_relative_eq;

    fn save_sample_intrinsics(config: &HarnessConfig) {
        sample_intrinsics()
            .save(&config.calibration.left_file)
            .unwrap();
        sample_intrinsics()
            .save(&config.calibration.right_file)
            .unwrap();
    }

    #[test]
    fn test_calibrate_both_writes_intrinsics_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 4);
        for index in 1..=3 {
            write_pair(&config, index, true);
        }
        write_pair(&config, 4, false);

        let backend = ScriptedBackend::default();
        let summary = calibrate_both(&config, &backend).unwrap();

        assert_eq!(summary.valid_pairs, 3);
        assert_eq!(summary.failed_pairs, vec![4]);
        assert_eq!(summary.cameras.len(), 2);
        assert_eq!(backend.calibrations.get(), 2);
        assert_eq!(backend.refinements.get(), 6);

        let left = IntrinsicCalibration::load(&config.calibration.left_file).unwrap();
        assert_eq!(left, sample_intrinsics());
        assert!(config.calibration.right_file.exists());
        assert!(config.output_path(CALIBRATION_SUMMARY_FILE).exists());

        let rows = std::fs::read_to_string(config.output_path(CORNERS_FILE))
            .unwrap()
            .lines()
            .count();
        // header plus 50 corners per image, two images per pair
        assert_eq!(rows, 1 + 3 * 2 * 50);
    }

    #[test]
    fn test_calibrate_both_without_detections_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 2);
        write_pair(&config, 1, false);

        let backend = ScriptedBackend::default();
        assert!(matches!(
            calibrate_both(&config, &backend),
            Err(PipelineError::InsufficientPairs {
                found: 0,
                required: 1
            })
        ));
        assert!(!config.calibration.left_file.exists());
    }

    #[test]
    fn test_stereo_rejects_too_few_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 6);
        save_sample_intrinsics(&config);
        for index in 1..=4 {
            write_pair(&config, index, true);
        }
        write_pair(&config, 6, false);

        let backend = ScriptedBackend::default();
        assert!(matches!(
            stereo_calibrate_pair(&config, &backend),
            Err(PipelineError::InsufficientPairs {
                found: 4,
                required: 5
            })
        ));
        assert_eq!(backend.calibrations.get(), 0);
        assert!(!config.calibration.stereo_file.exists());
    }

    #[test]
    fn test_stereo_skips_missing_image_and_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 7);
        save_sample_intrinsics(&config);
        for index in [1, 2, 3, 5, 6, 7] {
            write_pair(&config, index, true);
        }
        write_capture(&config, Side::Left, 4, true);

        let backend = ScriptedBackend::default();
        let summary = stereo_calibrate_pair(&config, &backend).unwrap();

        assert_eq!(summary.valid_pairs, 6);
        assert_eq!(
            summary.unreadable_images,
            vec![config.naming().path(Side::Right, 4)]
        );
        // corners are not refined for stereo by default
        assert_eq!(backend.refinements.get(), 0);
        assert_relative_eq!(summary.stereo.as_ref().unwrap().baseline, 120.0);

        let extrinsics = StereoExtrinsics::load(&config.calibration.stereo_file).unwrap();
        assert_eq!(extrinsics.translation.x, -120.0);

        let combined = read_stereo_calibration(&config.calibration.combined_file)
            .into_calibration()
            .unwrap();
        assert_eq!(combined.left, sample_intrinsics());
        assert_eq!(combined.rotation, nalgebra::Matrix3::identity());
        assert!(config.output_path(STEREO_SUMMARY_FILE).exists());
    }

    #[test]
    fn test_stereo_needs_intrinsic_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 1);
        let backend = ScriptedBackend::default();
        assert!(matches!(
            stereo_calibrate_pair(&config, &backend),
            Err(PipelineError::Storage(_))
        ));
        assert_eq!(backend.detections.get(), 0);
    }
}
