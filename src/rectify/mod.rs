//! Undistortion and rectification lookup tables.
//!
//! A table maps every pixel of the corrected view back to the distorted
//! source image: the pixel is lifted onto the normalized plane of the new
//! camera, rotated back into the source camera frame, pushed through the
//! radial-tangential model and projected with the source intrinsics.

use crate::backend::Rectification;
use crate::camera::{CameraModelError, PinholeModel, RadTanModel, Resolution};
use crate::imaging::{remap, RemapTable};
use crate::storage::{IntrinsicCalibration, StereoCalibration};
use image::RgbImage;
use log::debug;
use nalgebra::{Matrix3, Matrix3x4, Vector2, Vector3};

/// Builds the table sending each pixel of the corrected view to the source.
///
/// * `rotation` - rectifying rotation of the source camera, identity for a
///   plain undistortion.
/// * `new_camera_matrix` - intrinsics of the corrected view.
pub fn undistort_rectify_map(
    model: &RadTanModel,
    rotation: &Matrix3<f64>,
    new_camera_matrix: &Matrix3<f64>,
    size: Resolution,
) -> Result<RemapTable, CameraModelError> {
    let inverse = (new_camera_matrix * rotation).try_inverse().ok_or_else(|| {
        CameraModelError::NumericalError(
            "new camera matrix times rotation is singular".to_string(),
        )
    })?;

    let count = size.width as usize * size.height as usize;
    let mut map_x = Vec::with_capacity(count);
    let mut map_y = Vec::with_capacity(count);

    for v in 0..size.height {
        for u in 0..size.width {
            let ray: Vector3<f64> = inverse * Vector3::new(u as f64, v as f64, 1.0);
            if ray.z.abs() < f64::EPSILON {
                map_x.push(f32::NAN);
                map_y.push(f32::NAN);
                continue;
            }
            let pixel = model.distort_to_pixel(&Vector2::new(ray.x / ray.z, ray.y / ray.z));
            map_x.push(pixel.x as f32);
            map_y.push(pixel.y as f32);
        }
    }

    debug!("Built {}x{} undistort map", size.width, size.height);
    Ok(RemapTable {
        width: size.width,
        height: size.height,
        map_x,
        map_y,
    })
}

/// Same as [`undistort_rectify_map`] but takes the new view as a 3x4
/// projection matrix, of which only the left 3x3 block matters.
pub fn rectify_map(
    model: &RadTanModel,
    rotation: &Matrix3<f64>,
    projection: &Matrix3x4<f64>,
    size: Resolution,
) -> Result<RemapTable, CameraModelError> {
    let rectified = PinholeModel::from_projection_matrix(projection, size)?;
    undistort_rectify_map(model, rotation, &rectified.camera_matrix(), size)
}

/// Removes lens distortion, keeping the original camera matrix.
pub fn undistort_image(
    image: &RgbImage,
    calibration: &IntrinsicCalibration,
) -> Result<RgbImage, CameraModelError> {
    let size = Resolution::new(image.width(), image.height());
    let model = calibration.rad_tan_model(size)?;
    let table = undistort_rectify_map(
        &model,
        &Matrix3::identity(),
        &calibration.camera_matrix,
        size,
    )?;
    Ok(remap(image, &table))
}

/// Remap tables for both cameras of a rectified pair.
#[derive(Debug, Clone)]
pub struct StereoRemap {
    pub left: RemapTable,
    pub right: RemapTable,
}

impl StereoRemap {
    pub fn new(
        calibration: &StereoCalibration,
        rectification: &Rectification,
        size: Resolution,
    ) -> Result<Self, CameraModelError> {
        let left_model = calibration.left.rad_tan_model(size)?;
        let right_model = calibration.right.rad_tan_model(size)?;
        Ok(StereoRemap {
            left: rectify_map(&left_model, &rectification.r1, &rectification.p1, size)?,
            right: rectify_map(&right_model, &rectification.r2, &rectification.p2, size)?,
        })
    }

    pub fn apply(&self, left: &RgbImage, right: &RgbImage) -> (RgbImage, RgbImage) {
        (remap(left, &self.left), remap(right, &self.right))
    }
}
