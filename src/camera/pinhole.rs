//! Implements the Pinhole camera model.
//!
//! This module provides the [`PinholeModel`] struct, which represents an ideal
//! camera without lens distortion. In the stereo harness it describes the
//! virtual camera of an undistorted or rectified view: the `newCameraMatrix`
//! of an undistortion, or the left 3x3 block of a rectified projection matrix.

use crate::camera::{validation, CameraModelError, Intrinsics, Resolution};
use nalgebra::{Matrix3, Matrix3x4};
use serde::{Deserialize, Serialize};

/// Represents a Pinhole camera model.
///
/// This struct holds the intrinsic parameters (focal length, principal point)
/// and image resolution for a pinhole camera. It assumes no lens distortion.
///
/// # Examples
///
/// ```rust
/// use nalgebra::Matrix3;
/// use stereo_calib::camera::{PinholeModel, Resolution};
///
/// let camera_matrix = Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
/// let pinhole_model =
///     PinholeModel::from_camera_matrix(&camera_matrix, Resolution::new(640, 480)).unwrap();
///
/// assert_eq!(pinhole_model.intrinsics.fx, 500.0);
/// assert_eq!(pinhole_model.resolution.width, 640);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinholeModel {
    /// The intrinsic parameters of the camera, [`Intrinsics`] (fx, fy, cx, cy).
    pub intrinsics: Intrinsics,
    /// The resolution of the camera image, [`Resolution`] (width, height).
    pub resolution: Resolution,
}

impl PinholeModel {
    /// Builds the model from a 3x3 camera matrix `[fx 0 cx; 0 fy cy; 0 0 1]`.
    ///
    /// Skew is ignored, as it is in the calibration files this harness reads.
    pub fn from_camera_matrix(
        camera_matrix: &Matrix3<f64>,
        resolution: Resolution,
    ) -> Result<Self, CameraModelError> {
        let model = PinholeModel {
            intrinsics: Intrinsics {
                fx: camera_matrix[(0, 0)],
                fy: camera_matrix[(1, 1)],
                cx: camera_matrix[(0, 2)],
                cy: camera_matrix[(1, 2)],
            },
            resolution,
        };
        model.validate()?;
        Ok(model)
    }

    /// Builds the model from the left 3x3 block of a rectified projection matrix.
    pub fn from_projection_matrix(
        projection: &Matrix3x4<f64>,
        resolution: Resolution,
    ) -> Result<Self, CameraModelError> {
        let camera_matrix: Matrix3<f64> = projection.fixed_view::<3, 3>(0, 0).into_owned();
        Self::from_camera_matrix(&camera_matrix, resolution)
    }

    /// Checks the focal lengths and the principal point.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::FocalLengthMustBePositive`]
    /// * [`CameraModelError::PrincipalPointMustBeFinite`]
    pub fn validate(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)
    }

    /// Returns the camera matrix `[fx 0 cx; 0 fy cy; 0 0 1]`.
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.intrinsics.fx,
            0.0,
            self.intrinsics.cx,
            0.0,
            self.intrinsics.fy,
            self.intrinsics.cy,
            0.0,
            0.0,
            1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> PinholeModel {
        PinholeModel::from_camera_matrix(
            &Matrix3::new(461.629, 0.0, 362.680, 0.0, 460.152, 246.049, 0.0, 0.0, 1.0),
            Resolution::new(752, 480),
        )
        .unwrap()
    }

    #[test]
    fn test_pinhole_from_camera_matrix() {
        let model = sample_model();
        assert_eq!(model.intrinsics.fx, 461.629);
        assert_eq!(model.intrinsics.fy, 460.152);
        assert_eq!(model.intrinsics.cx, 362.680);
        assert_eq!(model.intrinsics.cy, 246.049);
        assert_eq!(model.camera_matrix()[(0, 2)], 362.680);
        assert_eq!(model.camera_matrix()[(2, 2)], 1.0);
    }

    #[test]
    fn test_pinhole_from_projection_matrix_ignores_baseline_column() {
        let projection = Matrix3x4::new(
            800.0, 0.0, 320.0, -96.0, 0.0, 800.0, 240.0, 0.0, 0.0, 0.0, 1.0, 0.0,
        );
        let model =
            PinholeModel::from_projection_matrix(&projection, Resolution::new(640, 480)).unwrap();
        assert_eq!(model.intrinsics.fx, 800.0);
        assert_eq!(model.intrinsics.cx, 320.0);
    }

    #[test]
    fn test_pinhole_rejects_degenerate_camera_matrix() {
        let resolution = Resolution::new(640, 480);
        let negative_focal = Matrix3::new(500.0, 0.0, 320.0, 0.0, -500.0, 240.0, 0.0, 0.0, 1.0);
        assert!(matches!(
            PinholeModel::from_camera_matrix(&negative_focal, resolution),
            Err(CameraModelError::FocalLengthMustBePositive)
        ));

        let projection = Matrix3x4::new(
            800.0,
            0.0,
            f64::INFINITY,
            0.0,
            0.0,
            800.0,
            240.0,
            0.0,
            0.0,
            0.0,
            1.0,
            0.0,
        );
        assert!(matches!(
            PinholeModel::from_projection_matrix(&projection, resolution),
            Err(CameraModelError::PrincipalPointMustBeFinite)
        ));
    }
}
