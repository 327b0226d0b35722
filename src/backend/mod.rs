//! Vision operations delegated to an external library.
//!
//! Chessboard detection, nonlinear calibration, rectification geometry and
//! block matching are not implemented here. Routines reach them through the
//! [`VisionBackend`] trait; the OpenCV binding in [`opencv`] is compiled with
//! the `opencv` cargo feature.

use crate::camera::Resolution;
use crate::pattern::PatternSize;
use crate::storage::{IntrinsicCalibration, StereoCalibration, StereoExtrinsics};
use image::GrayImage;
use nalgebra::{Matrix2xX, Matrix3, Matrix3x4, Matrix3xX, Matrix4};

#[cfg(feature = "opencv")]
pub mod opencv;

#[cfg(test)]
pub mod testing;

/// Scale of the fixed-point disparity values.
pub const DISPARITY_SCALE: f64 = 16.0;

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("No vision backend available: {0}")]
    Unavailable(String),
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Vision library error: {0}")]
    Library(String),
}

/// Preprocessing switches for chessboard detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionFlags {
    pub adaptive_threshold: bool,
    pub normalize_image: bool,
    pub fast_check: bool,
}

impl DetectionFlags {
    /// The detector's own defaults: adaptive threshold and normalization.
    pub fn standard() -> Self {
        DetectionFlags {
            adaptive_threshold: true,
            normalize_image: true,
            fast_check: false,
        }
    }

    /// Adaptive threshold, normalization and the fast pre-check.
    pub fn preprocessed() -> Self {
        DetectionFlags {
            adaptive_threshold: true,
            normalize_image: true,
            fast_check: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonoCalibration {
    pub calibration: IntrinsicCalibration,
    /// RMS reprojection error in pixels.
    pub rms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StereoCalibrationResult {
    pub left: IntrinsicCalibration,
    pub right: IntrinsicCalibration,
    pub extrinsics: StereoExtrinsics,
    pub rms: f64,
}

/// A rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Output of stereo rectification.
#[derive(Debug, Clone, PartialEq)]
pub struct Rectification {
    /// Rotation from the left camera frame into the rectified frame.
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    /// Projection matrices of the rectified views.
    pub p1: Matrix3x4<f64>,
    pub p2: Matrix3x4<f64>,
    /// Disparity-to-depth mapping.
    pub q: Matrix4<f64>,
    pub valid_roi_left: Roi,
    pub valid_roi_right: Roi,
}

/// Parameters of the block matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMatchingParams {
    /// Width of the disparity search range, a positive multiple of 16.
    pub num_disparities: u32,
    /// Side length of the matched block, odd, between 5 and 255.
    pub block_size: u32,
}

impl BlockMatchingParams {
    pub fn new(num_disparities: u32, block_size: u32) -> Self {
        BlockMatchingParams {
            num_disparities,
            block_size,
        }
    }

    pub fn validate(&self) -> Result<(), BackendError> {
        if self.num_disparities == 0 || self.num_disparities % 16 != 0 {
            return Err(BackendError::InvalidParams(format!(
                "num_disparities must be a positive multiple of 16, got {}",
                self.num_disparities
            )));
        }
        if self.block_size % 2 == 0 || !(5..=255).contains(&self.block_size) {
            return Err(BackendError::InvalidParams(format!(
                "block_size must be odd and within 5..=255, got {}",
                self.block_size
            )));
        }
        Ok(())
    }
}

impl Default for BlockMatchingParams {
    fn default() -> Self {
        BlockMatchingParams::new(64, 21)
    }
}

/// Fixed-point disparity map, 16 steps per pixel of disparity.
///
/// Pixels without a match hold a negative value.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<i16>,
}

impl DisparityMap {
    pub fn new(width: u32, height: u32, data: Vec<i16>) -> Result<Self, BackendError> {
        if data.len() != width as usize * height as usize {
            return Err(BackendError::InvalidInput(format!(
                "disparity data has {} values, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(DisparityMap {
            width,
            height,
            data,
        })
    }

    pub fn get(&self, x: u32, y: u32) -> i16 {
        self.data[(y * self.width + x) as usize]
    }

    /// Disparity in pixels, `None` where no match was found.
    pub fn disparity(&self, x: u32, y: u32) -> Option<f64> {
        let raw = self.get(x, y);
        (raw >= 0).then(|| raw as f64 / DISPARITY_SCALE)
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|d| **d >= 0).count()
    }

    /// Smallest and largest matched value, raw fixed-point.
    pub fn valid_range(&self) -> Option<(i16, i16)> {
        self.data
            .iter()
            .filter(|d| **d >= 0)
            .fold(None, |range, &d| match range {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
    }

    /// Min-max normalizes matched pixels into `0..=255`; unmatched pixels are black.
    pub fn to_visual(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width, self.height);
        let Some((lo, hi)) = self.valid_range() else {
            return img;
        };
        let span = (hi - lo) as f64;

        for (pixel, &raw) in img.pixels_mut().zip(self.data.iter()) {
            if raw < 0 {
                continue;
            }
            let value = if span > 0.0 {
                (raw - lo) as f64 * 255.0 / span
            } else {
                255.0
            };
            pixel[0] = value.round() as u8;
        }
        img
    }
}

/// The vision operations the harness delegates.
pub trait VisionBackend {
    fn name(&self) -> &'static str;

    /// Locates the inner corners of a chessboard, row-major.
    ///
    /// Returns `Ok(None)` when the board is not found.
    fn find_chessboard_corners(
        &self,
        image: &GrayImage,
        pattern: PatternSize,
        flags: DetectionFlags,
    ) -> Result<Option<Matrix2xX<f64>>, BackendError>;

    /// Refines corner positions to sub-pixel accuracy in place.
    ///
    /// `window` is the half side length of the search window.
    fn refine_corners(
        &self,
        image: &GrayImage,
        corners: &mut Matrix2xX<f64>,
        window: u32,
    ) -> Result<(), BackendError>;

    fn calibrate_camera(
        &self,
        object_points: &[Matrix3xX<f64>],
        image_points: &[Matrix2xX<f64>],
        image_size: Resolution,
    ) -> Result<MonoCalibration, BackendError>;

    /// Estimates the pose of the right camera relative to the left.
    ///
    /// The intrinsics are used as initial values and kept fixed.
    fn stereo_calibrate(
        &self,
        object_points: &[Matrix3xX<f64>],
        left_points: &[Matrix2xX<f64>],
        right_points: &[Matrix2xX<f64>],
        left: &IntrinsicCalibration,
        right: &IntrinsicCalibration,
        image_size: Resolution,
    ) -> Result<StereoCalibrationResult, BackendError>;

    /// Computes rectifying rotations and projections with zero disparity at
    /// infinity. `alpha` of `None` lets the library pick its default scaling.
    fn stereo_rectify(
        &self,
        calibration: &StereoCalibration,
        image_size: Resolution,
        alpha: Option<f64>,
    ) -> Result<Rectification, BackendError>;

    fn compute_disparity(
        &self,
        left: &GrayImage,
        right: &GrayImage,
        params: BlockMatchingParams,
    ) -> Result<DisparityMap, BackendError>;
}

/// Checks that calibration inputs are non-empty and consistently sized.
pub fn check_correspondences(
    object_points: &[Matrix3xX<f64>],
    image_points: &[&[Matrix2xX<f64>]],
) -> Result<(), BackendError> {
    if object_points.is_empty() {
        return Err(BackendError::InvalidInput(
            "no views to calibrate from".to_string(),
        ));
    }
    for points in image_points {
        if points.len() != object_points.len() {
            return Err(BackendError::InvalidInput(format!(
                "{} object point sets but {} image point sets",
                object_points.len(),
                points.len()
            )));
        }
        for (object, image) in object_points.iter().zip(points.iter()) {
            if object.ncols() != image.ncols() {
                return Err(BackendError::InvalidInput(format!(
                    "view has {} object points but {} image points",
                    object.ncols(),
                    image.ncols()
                )));
            }
        }
    }
    Ok(())
}

/// The backend compiled into this build.
#[cfg(feature = "opencv")]
pub fn default_backend() -> Result<Box<dyn VisionBackend>, BackendError> {
    Ok(Box::new(opencv::OpenCvBackend::new()))
}

/// The backend compiled into this build.
#[cfg(not(feature = "opencv"))]
pub fn default_backend() -> Result<Box<dyn VisionBackend>, BackendError> {
    Err(BackendError::Unavailable(
        "rebuild with `--features opencv` to enable detection, calibration and matching"
            .to_string(),
    ))
}
