//! Deterministic [`VisionBackend`] for exercising the routines without a
//! vision library.
//!
//! A board is "found" in any image whose first pixel is not black; its
//! corners are laid out on a regular grid. Calibration returns fixed values.

use super::*;
use nalgebra::{DVector, Vector3};
use std::cell::Cell;

pub struct ScriptedBackend {
    pub rms: f64,
    pub detections: Cell<usize>,
    pub refinements: Cell<usize>,
    pub calibrations: Cell<usize>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        ScriptedBackend {
            rms: 0.25,
            detections: Cell::new(0),
            refinements: Cell::new(0),
            calibrations: Cell::new(0),
        }
    }
}

pub fn sample_intrinsics() -> IntrinsicCalibration {
    IntrinsicCalibration::new(
        Matrix3::new(1400.0, 0.0, 960.0, 0.0, 1400.0, 540.0, 0.0, 0.0, 1.0),
        DVector::from_vec(vec![-0.1, 0.02, 0.0, 0.0, 0.0]),
    )
}

impl VisionBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn find_chessboard_corners(
        &self,
        image: &GrayImage,
        pattern: PatternSize,
        _flags: DetectionFlags,
    ) -> Result<Option<Matrix2xX<f64>>, BackendError> {
        self.detections.set(self.detections.get() + 1);
        if image.width() == 0 || image.get_pixel(0, 0)[0] == 0 {
            return Ok(None);
        }
        let columns = pattern.columns.max(1) as usize;
        Ok(Some(Matrix2xX::from_fn(pattern.corner_count(), |row, i| {
            match row {
                0 => 10.0 + (i % columns) as f64 * 5.0,
                _ => 10.0 + (i / columns) as f64 * 5.0,
            }
        })))
    }

    fn refine_corners(
        &self,
        _image: &GrayImage,
        corners: &mut Matrix2xX<f64>,
        _window: u32,
    ) -> Result<(), BackendError> {
        self.refinements.set(self.refinements.get() + 1);
        corners.add_scalar_mut(0.5);
        Ok(())
    }

    fn calibrate_camera(
        &self,
        object_points: &[Matrix3xX<f64>],
        image_points: &[Matrix2xX<f64>],
        _image_size: Resolution,
    ) -> Result<MonoCalibration, BackendError> {
        check_correspondences(object_points, &[image_points])?;
        self.calibrations.set(self.calibrations.get() + 1);
        Ok(MonoCalibration {
            calibration: sample_intrinsics(),
            rms: self.rms,
        })
    }

    fn stereo_calibrate(
        &self,
        object_points: &[Matrix3xX<f64>],
        left_points: &[Matrix2xX<f64>],
        right_points: &[Matrix2xX<f64>],
        left: &IntrinsicCalibration,
        right: &IntrinsicCalibration,
        _image_size: Resolution,
    ) -> Result<StereoCalibrationResult, BackendError> {
        check_correspondences(object_points, &[left_points, right_points])?;
        self.calibrations.set(self.calibrations.get() + 1);
        Ok(StereoCalibrationResult {
            left: left.clone(),
            right: right.clone(),
            extrinsics: StereoExtrinsics::new(Matrix3::identity(), Vector3::new(-120.0, 0.0, 0.0)),
            rms: self.rms,
        })
    }

    fn stereo_rectify(
        &self,
        calibration: &StereoCalibration,
        image_size: Resolution,
        _alpha: Option<f64>,
    ) -> Result<Rectification, BackendError> {
        let k = calibration.left.camera_matrix;
        let fx = k[(0, 0)];
        let mut p1 = Matrix3x4::zeros();
        p1.fixed_view_mut::<3, 3>(0, 0).copy_from(&k);
        let mut p2 = p1;
        p2[(0, 3)] = fx * calibration.translation.x;
        Ok(Rectification {
            r1: Matrix3::identity(),
            r2: Matrix3::identity(),
            p1,
            p2,
            q: Matrix4::identity(),
            valid_roi_left: Roi {
                x: 0,
                y: 0,
                width: image_size.width as i32,
                height: image_size.height as i32,
            },
            valid_roi_right: Roi::default(),
        })
    }

    fn compute_disparity(
        &self,
        left: &GrayImage,
        right: &GrayImage,
        params: BlockMatchingParams,
    ) -> Result<DisparityMap, BackendError> {
        params.validate()?;
        if left.dimensions() != right.dimensions() {
            return Err(BackendError::InvalidInput(
                "left and right images differ in size".to_string(),
            ));
        }
        let (width, height) = left.dimensions();
        let data = (0..width * height)
            .map(|i| ((i % width) as i64 % params.num_disparities as i64 * 16) as i16)
            .collect();
        DisparityMap::new(width, height, data)
    }
}
