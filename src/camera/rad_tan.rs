//! Implements the Radial-Tangential (RadTan) camera model.
//!
//! This module provides the [`RadTanModel`] struct, a pinhole camera with
//! radial (`k1`, `k2`, `k3`) and tangential (`p1`, `p2`) lens distortion. The
//! coefficient order is the one stored under `DistCoeffs` / `d1` / `d2` in the
//! calibration files, so a model can be built directly from a calibration
//! record with [`RadTanModel::from_calibration`].

use crate::camera::{validation, CameraModelError, Intrinsics, Resolution};
use nalgebra::{DVector, Matrix2, Matrix3, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance for the iterative undistortion.
const UNDISTORT_EPS: f64 = 1e-10;
const UNDISTORT_MAX_ITERATIONS: u32 = 100;

/// Represents a Radial-Tangential (RadTan) camera model.
///
/// # Examples
///
/// ```rust
/// use nalgebra::{DVector, Matrix3, Vector2};
/// use stereo_calib::camera::{RadTanModel, Resolution};
///
/// let camera_matrix = Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
/// // k1, k2, p1, p2, k3
/// let dist_coeffs = DVector::from_vec(vec![0.1, -0.05, 0.001, 0.001, 0.02]);
/// let model =
///     RadTanModel::from_calibration(&camera_matrix, &dist_coeffs, Resolution::new(640, 480))
///         .unwrap();
///
/// assert_eq!(model.intrinsics.fx, 500.0);
/// assert_eq!(model.distortions[0], 0.1);
/// assert_eq!(model.distort_to_pixel(&Vector2::zeros()), Vector2::new(320.0, 240.0));
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct RadTanModel {
    pub intrinsics: Intrinsics,
    pub resolution: Resolution,
    pub distortions: [f64; 5], // k1, k2, p1, p2, k3
}

impl RadTanModel {
    /// Builds the model from a camera matrix and a distortion vector as stored
    /// in the calibration files.
    ///
    /// Four coefficients (`k1, k2, p1, p2`) imply `k3 = 0`. Longer vectors are
    /// accepted only when every coefficient past `k3` is zero, since the
    /// rational and thin-prism terms are not modelled.
    pub fn from_calibration(
        camera_matrix: &Matrix3<f64>,
        dist_coeffs: &DVector<f64>,
        resolution: Resolution,
    ) -> Result<Self, CameraModelError> {
        let mut distortions = [0.0; 5];
        match dist_coeffs.len() {
            0 => {}
            4 | 5 => {
                for (i, value) in dist_coeffs.iter().enumerate() {
                    distortions[i] = *value;
                }
            }
            n if n > 5 && dist_coeffs.iter().skip(5).all(|c| *c == 0.0) => {
                for (i, value) in dist_coeffs.iter().take(5).enumerate() {
                    distortions[i] = *value;
                }
            }
            n => {
                return Err(CameraModelError::InvalidParams(format!(
                    "RadTan model supports 4 or 5 distortion coefficients, got {n}"
                )))
            }
        }

        let model = RadTanModel {
            intrinsics: Intrinsics {
                fx: camera_matrix[(0, 0)],
                fy: camera_matrix[(1, 1)],
                cx: camera_matrix[(0, 2)],
                cy: camera_matrix[(1, 2)],
            },
            resolution,
            distortions,
        };
        model.validate()?;
        Ok(model)
    }

    /// Checks the intrinsics and that every distortion coefficient is finite.
    pub fn validate(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)?;
        if self.distortions.iter().any(|d| !d.is_finite()) {
            return Err(CameraModelError::InvalidParams(
                "Distortion coefficients must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies radial and tangential distortion to a point on the normalized
    /// image plane (`z = 1`).
    pub fn distort(&self, normalized: &Vector2<f64>) -> Vector2<f64> {
        let [k1, k2, p1, p2, k3] = self.distortions;
        let x = normalized.x;
        let y = normalized.y;

        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;

        Vector2::new(
            x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
            y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
        )
    }

    /// Inverts [`RadTanModel::distort`] with Gauss-Newton iterations, starting
    /// from the distorted point itself.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::NumericalError`] if the Jacobian becomes singular
    ///   or the iteration does not converge.
    pub fn undistort(&self, distorted: &Vector2<f64>) -> Result<Vector2<f64>, CameraModelError> {
        let [k1, k2, p1, p2, k3] = self.distortions;
        let mut point = *distorted;

        for _ in 0..UNDISTORT_MAX_ITERATIONS {
            let error = self.distort(&point) - distorted;
            if error.norm() < UNDISTORT_EPS {
                return Ok(point);
            }

            let x = point.x;
            let y = point.y;
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;

            // d(radial)/dx = (k1 + 2 k2 r^2 + 3 k3 r^4) * 2x
            let d_radial = k1 + 2.0 * k2 * r2 + 3.0 * k3 * r4;
            let d_radial_dx = d_radial * 2.0 * x;
            let d_radial_dy = d_radial * 2.0 * y;

            let j00 = radial + x * d_radial_dx + 2.0 * p1 * y + 6.0 * p2 * x;
            let j01 = x * d_radial_dy + 2.0 * p1 * x + 2.0 * p2 * y;
            let j10 = y * d_radial_dx + 2.0 * p1 * x + 2.0 * p2 * y;
            let j11 = radial + y * d_radial_dy + 6.0 * p1 * y + 2.0 * p2 * x;

            let jacobian = Matrix2::new(j00, j01, j10, j11);
            let inv_jacobian = jacobian.try_inverse().ok_or_else(|| {
                CameraModelError::NumericalError("Jacobian is singular".to_string())
            })?;

            let delta = inv_jacobian * error;
            point -= delta;

            if delta.norm() < UNDISTORT_EPS {
                return Ok(point);
            }
        }

        Err(CameraModelError::NumericalError(format!(
            "Undistortion did not converge after {UNDISTORT_MAX_ITERATIONS} iterations"
        )))
    }

    /// Maps a normalized, undistorted point to distorted pixel coordinates
    /// without checking the image bounds.
    pub fn distort_to_pixel(&self, normalized: &Vector2<f64>) -> Vector2<f64> {
        let distorted = self.distort(normalized);
        Vector2::new(
            self.intrinsics.fx * distorted.x + self.intrinsics.cx,
            self.intrinsics.fy * distorted.y + self.intrinsics.cy,
        )
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

impl fmt::Debug for RadTanModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RadTanModel [fx: {} fy: {} cx: {} cy: {} distortions: {:?}]",
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            self.distortions,
        )
    }
}
