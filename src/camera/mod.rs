//! Camera models used to build undistortion and rectification maps.
//!
//! Only the two models the stereo harness needs are provided: an ideal
//! [`PinholeModel`] (the virtual camera of a rectified view) and the
//! five-coefficient [`RadTanModel`], which matches the distortion model
//! written to the calibration files.

use serde::{Deserialize, Serialize};

pub mod pinhole;
pub mod rad_tan;

pub use pinhole::PinholeModel;
pub use rad_tan::RadTanModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Resolution { width, height }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("Principal point must be finite")]
    PrincipalPointMustBeFinite,
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error("Numerical error in computation: {0}")]
    NumericalError(String),
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), CameraModelError> {
        if intrinsics.fx <= 0.0 || intrinsics.fy <= 0.0 {
            return Err(CameraModelError::FocalLengthMustBePositive);
        }
        if !intrinsics.cx.is_finite() || !intrinsics.cy.is_finite() {
            return Err(CameraModelError::PrincipalPointMustBeFinite);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_intrinsics() {
        let good = Intrinsics {
            fx: 1400.0,
            fy: 1400.0,
            cx: 960.0,
            cy: 540.0,
        };
        assert!(validation::validate_intrinsics(&good).is_ok());

        let bad_focal = Intrinsics { fx: 0.0, ..good.clone() };
        assert!(matches!(
            validation::validate_intrinsics(&bad_focal),
            Err(CameraModelError::FocalLengthMustBePositive)
        ));

        let bad_center = Intrinsics {
            cx: f64::NAN,
            ..good
        };
        assert!(matches!(
            validation::validate_intrinsics(&bad_center),
            Err(CameraModelError::PrincipalPointMustBeFinite)
        ));
    }
}
