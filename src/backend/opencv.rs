//! [`VisionBackend`] bound to OpenCV through the `opencv` crate.

use super::*;
use ::opencv::calib3d::{self, StereoBM};
use ::opencv::core::{self, Mat, Point2f, Point3f, Rect, Size, TermCriteria, Vector};
use ::opencv::imgproc;
use ::opencv::prelude::*;
use log::debug;
use nalgebra::{DMatrix, DVector, Vector3};

impl From<::opencv::Error> for BackendError {
    fn from(err: ::opencv::Error) -> Self {
        BackendError::Library(err.to_string())
    }
}

const SUBPIX_MAX_ITERATIONS: i32 = 30;
const SUBPIX_EPS: f64 = 0.001;

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvBackend;

impl OpenCvBackend {
    pub fn new() -> Self {
        OpenCvBackend
    }
}

fn gray_to_mat(image: &GrayImage) -> Result<Mat, BackendError> {
    let mat = Mat::new_rows_cols_with_data(
        image.height() as i32,
        image.width() as i32,
        image.as_raw().as_slice(),
    )?;
    Ok(mat.clone_pointee())
}

fn size_of(resolution: Resolution) -> Size {
    Size::new(resolution.width as i32, resolution.height as i32)
}

fn to_mat(matrix: &DMatrix<f64>) -> Result<Mat, BackendError> {
    let rows: Vec<Vec<f64>> = matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect();
    Ok(Mat::from_slice_2d(&rows)?)
}

fn from_mat(mat: &Mat) -> Result<DMatrix<f64>, BackendError> {
    let (rows, cols) = (mat.rows(), mat.cols());
    let mut out = DMatrix::zeros(rows as usize, cols as usize);
    for r in 0..rows {
        for c in 0..cols {
            out[(r as usize, c as usize)] = *mat.at_2d::<f64>(r, c)?;
        }
    }
    Ok(out)
}

fn fixed<const R: usize, const C: usize>(
    mat: &Mat,
    name: &str,
) -> Result<nalgebra::SMatrix<f64, R, C>, BackendError> {
    let dynamic = from_mat(mat)?;
    if dynamic.shape() != (R, C) {
        return Err(BackendError::Library(format!(
            "{name} is {}x{}, expected {R}x{C}",
            dynamic.nrows(),
            dynamic.ncols()
        )));
    }
    Ok(dynamic.fixed_view::<R, C>(0, 0).into_owned())
}

fn dist_to_vector(mat: &Mat) -> Result<DVector<f64>, BackendError> {
    let dynamic = from_mat(mat)?;
    Ok(DVector::from_iterator(
        dynamic.len(),
        dynamic.transpose().iter().copied(),
    ))
}

fn intrinsics_to_mats(calibration: &IntrinsicCalibration) -> Result<(Mat, Mat), BackendError> {
    let k = to_mat(&DMatrix::from_column_slice(
        3,
        3,
        calibration.camera_matrix.as_slice(),
    ))?;
    let d = to_mat(&DMatrix::from_row_slice(
        1,
        calibration.dist_coeffs.len(),
        calibration.dist_coeffs.as_slice(),
    ))?;
    Ok((k, d))
}

fn corners_to_vector(corners: &Matrix2xX<f64>) -> Vector<Point2f> {
    corners
        .column_iter()
        .map(|c| Point2f::new(c[0] as f32, c[1] as f32))
        .collect()
}

fn vector_to_corners(points: &Vector<Point2f>) -> Matrix2xX<f64> {
    let columns: Vec<_> = points.iter().collect();
    Matrix2xX::from_fn(columns.len(), |row, i| match row {
        0 => columns[i].x as f64,
        _ => columns[i].y as f64,
    })
}

fn object_sets(points: &[Matrix3xX<f64>]) -> Vector<Vector<Point3f>> {
    points
        .iter()
        .map(|set| {
            set.column_iter()
                .map(|c| Point3f::new(c[0] as f32, c[1] as f32, c[2] as f32))
                .collect::<Vector<Point3f>>()
        })
        .collect()
}

fn image_sets(points: &[Matrix2xX<f64>]) -> Vector<Vector<Point2f>> {
    points.iter().map(corners_to_vector).collect()
}

fn roi_from_rect(rect: Rect) -> Roi {
    Roi {
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

impl VisionBackend for OpenCvBackend {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn find_chessboard_corners(
        &self,
        image: &GrayImage,
        pattern: PatternSize,
        flags: DetectionFlags,
    ) -> Result<Option<Matrix2xX<f64>>, BackendError> {
        let mat = gray_to_mat(image)?;
        let mut cv_flags = 0;
        if flags.adaptive_threshold {
            cv_flags |= calib3d::CALIB_CB_ADAPTIVE_THRESH;
        }
        if flags.normalize_image {
            cv_flags |= calib3d::CALIB_CB_NORMALIZE_IMAGE;
        }
        if flags.fast_check {
            cv_flags |= calib3d::CALIB_CB_FAST_CHECK;
        }

        let mut corners = Vector::<Point2f>::new();
        let found = calib3d::find_chessboard_corners(
            &mat,
            Size::new(pattern.columns as i32, pattern.rows as i32),
            &mut corners,
            cv_flags,
        )?;
        debug!("Chessboard search found={found}, {} corners", corners.len());
        Ok(found.then(|| vector_to_corners(&corners)))
    }

    fn refine_corners(
        &self,
        image: &GrayImage,
        corners: &mut Matrix2xX<f64>,
        window: u32,
    ) -> Result<(), BackendError> {
        let mat = gray_to_mat(image)?;
        let mut points = corners_to_vector(corners);
        imgproc::corner_sub_pix(
            &mat,
            &mut points,
            Size::new(window as i32, window as i32),
            Size::new(-1, -1),
            TermCriteria::new(
                core::TermCriteria_COUNT + core::TermCriteria_EPS,
                SUBPIX_MAX_ITERATIONS,
                SUBPIX_EPS,
            )?,
        )?;
        *corners = vector_to_corners(&points);
        Ok(())
    }

    fn calibrate_camera(
        &self,
        object_points: &[Matrix3xX<f64>],
        image_points: &[Matrix2xX<f64>],
        image_size: Resolution,
    ) -> Result<MonoCalibration, BackendError> {
        check_correspondences(object_points, &[image_points])?;

        let mut camera_matrix = Mat::zeros(3, 3, core::CV_64F)?.to_mat()?;
        let mut dist_coeffs = Mat::zeros(5, 1, core::CV_64F)?.to_mat()?;
        let mut rvecs = Vector::<Mat>::new();
        let mut tvecs = Vector::<Mat>::new();

        let rms = calib3d::calibrate_camera(
            &object_sets(object_points),
            &image_sets(image_points),
            size_of(image_size),
            &mut camera_matrix,
            &mut dist_coeffs,
            &mut rvecs,
            &mut tvecs,
            0,
            TermCriteria::new(
                core::TermCriteria_COUNT + core::TermCriteria_EPS,
                30,
                f64::EPSILON,
            )?,
        )?;

        Ok(MonoCalibration {
            calibration: IntrinsicCalibration::new(
                fixed::<3, 3>(&camera_matrix, "camera matrix")?,
                dist_to_vector(&dist_coeffs)?,
            ),
            rms,
        })
    }

    fn stereo_calibrate(
        &self,
        object_points: &[Matrix3xX<f64>],
        left_points: &[Matrix2xX<f64>],
        right_points: &[Matrix2xX<f64>],
        left: &IntrinsicCalibration,
        right: &IntrinsicCalibration,
        image_size: Resolution,
    ) -> Result<StereoCalibrationResult, BackendError> {
        check_correspondences(object_points, &[left_points, right_points])?;

        let (mut k1, mut d1) = intrinsics_to_mats(left)?;
        let (mut k2, mut d2) = intrinsics_to_mats(right)?;
        let mut r = Mat::default();
        let mut t = Mat::default();
        let mut e = Mat::default();
        let mut f = Mat::default();

        let rms = calib3d::stereo_calibrate(
            &object_sets(object_points),
            &image_sets(left_points),
            &image_sets(right_points),
            &mut k1,
            &mut d1,
            &mut k2,
            &mut d2,
            size_of(image_size),
            &mut r,
            &mut t,
            &mut e,
            &mut f,
            calib3d::CALIB_FIX_INTRINSIC,
            TermCriteria::new(
                core::TermCriteria_COUNT + core::TermCriteria_EPS,
                30,
                1e-6,
            )?,
        )?;

        let translation: Vector3<f64> = fixed::<3, 1>(&t, "translation")?;
        let mut extrinsics =
            StereoExtrinsics::new(fixed::<3, 3>(&r, "rotation")?, translation);
        extrinsics.essential = Some(fixed::<3, 3>(&e, "essential matrix")?);
        extrinsics.fundamental = Some(fixed::<3, 3>(&f, "fundamental matrix")?);

        Ok(StereoCalibrationResult {
            left: IntrinsicCalibration::new(fixed::<3, 3>(&k1, "K1")?, dist_to_vector(&d1)?),
            right: IntrinsicCalibration::new(fixed::<3, 3>(&k2, "K2")?, dist_to_vector(&d2)?),
            extrinsics,
            rms,
        })
    }

    fn stereo_rectify(
        &self,
        calibration: &StereoCalibration,
        image_size: Resolution,
        alpha: Option<f64>,
    ) -> Result<Rectification, BackendError> {
        let (k1, d1) = intrinsics_to_mats(&calibration.left)?;
        let (k2, d2) = intrinsics_to_mats(&calibration.right)?;
        let r = to_mat(&DMatrix::from_column_slice(
            3,
            3,
            calibration.rotation.as_slice(),
        ))?;
        let t = to_mat(&DMatrix::from_column_slice(
            3,
            1,
            calibration.translation.as_slice(),
        ))?;

        let mut r1 = Mat::default();
        let mut r2 = Mat::default();
        let mut p1 = Mat::default();
        let mut p2 = Mat::default();
        let mut q = Mat::default();
        let mut roi1 = Rect::default();
        let mut roi2 = Rect::default();

        calib3d::stereo_rectify(
            &k1,
            &d1,
            &k2,
            &d2,
            size_of(image_size),
            &r,
            &t,
            &mut r1,
            &mut r2,
            &mut p1,
            &mut p2,
            &mut q,
            calib3d::CALIB_ZERO_DISPARITY,
            alpha.unwrap_or(-1.0),
            size_of(image_size),
            &mut roi1,
            &mut roi2,
        )?;

        Ok(Rectification {
            r1: fixed::<3, 3>(&r1, "R1")?,
            r2: fixed::<3, 3>(&r2, "R2")?,
            p1: fixed::<3, 4>(&p1, "P1")?,
            p2: fixed::<3, 4>(&p2, "P2")?,
            q: fixed::<4, 4>(&q, "Q")?,
            valid_roi_left: roi_from_rect(roi1),
            valid_roi_right: roi_from_rect(roi2),
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
            return Err(BackendError::InvalidInput(format!(
                "left image is {:?} but right image is {:?}",
                left.dimensions(),
                right.dimensions()
            )));
        }

        let mut matcher =
            StereoBM::create(params.num_disparities as i32, params.block_size as i32)?;
        let mut disparity = Mat::default();
        matcher.compute(&gray_to_mat(left)?, &gray_to_mat(right)?, &mut disparity)?;

        let (rows, cols) = (disparity.rows(), disparity.cols());
        let mut data = Vec::with_capacity(rows as usize * cols as usize);
        for r in 0..rows {
            for c in 0..cols {
                data.push(*disparity.at_2d::<i16>(r, c)?);
            }
        }
        DisparityMap::new(cols as u32, rows as u32, data)
    }
}
