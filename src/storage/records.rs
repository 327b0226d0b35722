//! Typed calibration records on top of [`MatrixStore`].
//!
//! Three layouts are in use:
//!
//! * per-camera intrinsics: `CameraMatrix`, `DistCoeffs`
//! * stereo extrinsics: `RotationMatrix`, `TranslationVector` and optionally
//!   `EssentialMatrix`, `FundamentalMatrix`
//! * the combined six-key stereo file: `K1`, `d1`, `K2`, `d2`, `R`, `t`

use super::{MatrixStore, StorageError};
use crate::camera::{CameraModelError, RadTanModel, Resolution};
use log::warn;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use std::path::Path;

pub const CAMERA_MATRIX_KEY: &str = "CameraMatrix";
pub const DIST_COEFFS_KEY: &str = "DistCoeffs";
pub const ROTATION_KEY: &str = "RotationMatrix";
pub const TRANSLATION_KEY: &str = "TranslationVector";
pub const ESSENTIAL_KEY: &str = "EssentialMatrix";
pub const FUNDAMENTAL_KEY: &str = "FundamentalMatrix";

/// Keys of the combined stereo file, in file order.
pub const STEREO_KEYS: [&str; 6] = ["K1", "d1", "K2", "d2", "R", "t"];

/// Camera matrix and distortion coefficients of a single camera.
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicCalibration {
    pub camera_matrix: Matrix3<f64>,
    /// `k1, k2, p1, p2[, k3, ...]`
    pub dist_coeffs: DVector<f64>,
}

impl IntrinsicCalibration {
    pub fn new(camera_matrix: Matrix3<f64>, dist_coeffs: DVector<f64>) -> Self {
        IntrinsicCalibration {
            camera_matrix,
            dist_coeffs,
        }
    }

    pub fn to_store(&self) -> MatrixStore {
        let mut store = MatrixStore::new();
        store.insert(CAMERA_MATRIX_KEY, to_dynamic(&self.camera_matrix));
        store.insert(DIST_COEFFS_KEY, row_vector(&self.dist_coeffs));
        store
    }

    pub fn from_store(store: &MatrixStore) -> Result<Self, StorageError> {
        Ok(IntrinsicCalibration {
            camera_matrix: as_matrix3(CAMERA_MATRIX_KEY, store.require(CAMERA_MATRIX_KEY)?)?,
            dist_coeffs: as_vector(DIST_COEFFS_KEY, store.require(DIST_COEFFS_KEY)?)?,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        self.to_store().save(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::from_store(&MatrixStore::load(path)?)
    }

    /// The distortion model described by this record at a given image size.
    pub fn rad_tan_model(&self, resolution: Resolution) -> Result<RadTanModel, CameraModelError> {
        RadTanModel::from_calibration(&self.camera_matrix, &self.dist_coeffs, resolution)
    }
}

/// Pose of the right camera relative to the left one.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoExtrinsics {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub essential: Option<Matrix3<f64>>,
    pub fundamental: Option<Matrix3<f64>>,
}

impl StereoExtrinsics {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        StereoExtrinsics {
            rotation,
            translation,
            essential: None,
            fundamental: None,
        }
    }

    /// Distance between the two camera centres, in calibration units.
    pub fn baseline(&self) -> f64 {
        self.translation.norm()
    }

    pub fn to_store(&self) -> MatrixStore {
        let mut store = MatrixStore::new();
        store.insert(ROTATION_KEY, to_dynamic(&self.rotation));
        store.insert(TRANSLATION_KEY, to_dynamic(&self.translation));
        if let Some(essential) = &self.essential {
            store.insert(ESSENTIAL_KEY, to_dynamic(essential));
        }
        if let Some(fundamental) = &self.fundamental {
            store.insert(FUNDAMENTAL_KEY, to_dynamic(fundamental));
        }
        store
    }

    pub fn from_store(store: &MatrixStore) -> Result<Self, StorageError> {
        let optional = |key: &str| -> Result<Option<Matrix3<f64>>, StorageError> {
            store.get(key).map(|m| as_matrix3(key, m)).transpose()
        };
        Ok(StereoExtrinsics {
            rotation: as_matrix3(ROTATION_KEY, store.require(ROTATION_KEY)?)?,
            translation: as_vector3(TRANSLATION_KEY, store.require(TRANSLATION_KEY)?)?,
            essential: optional(ESSENTIAL_KEY)?,
            fundamental: optional(FUNDAMENTAL_KEY)?,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        self.to_store().save(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::from_store(&MatrixStore::load(path)?)
    }
}

/// Everything the disparity demo needs: both intrinsics plus the pose.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoCalibration {
    pub left: IntrinsicCalibration,
    pub right: IntrinsicCalibration,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl StereoCalibration {
    pub fn extrinsics(&self) -> StereoExtrinsics {
        StereoExtrinsics::new(self.rotation, self.translation)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        save_stereo_calibration(
            path,
            &to_dynamic(&self.left.camera_matrix),
            &row_vector(&self.left.dist_coeffs),
            &to_dynamic(&self.right.camera_matrix),
            &row_vector(&self.right.dist_coeffs),
            &to_dynamic(&self.rotation),
            &to_dynamic(&self.translation),
        )
    }
}

/// The six matrices of a combined stereo file, each `None` when absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoCalibrationSlots {
    pub k1: Option<DMatrix<f64>>,
    pub d1: Option<DMatrix<f64>>,
    pub k2: Option<DMatrix<f64>>,
    pub d2: Option<DMatrix<f64>>,
    pub r: Option<DMatrix<f64>>,
    pub t: Option<DMatrix<f64>>,
}

impl StereoCalibrationSlots {
    fn from_store(store: &MatrixStore) -> Self {
        let slot = |key: &str| store.get(key).cloned();
        StereoCalibrationSlots {
            k1: slot(STEREO_KEYS[0]),
            d1: slot(STEREO_KEYS[1]),
            k2: slot(STEREO_KEYS[2]),
            d2: slot(STEREO_KEYS[3]),
            r: slot(STEREO_KEYS[4]),
            t: slot(STEREO_KEYS[5]),
        }
    }

    /// Slots paired with their file keys, in file order.
    pub fn entries(&self) -> [(&'static str, Option<&DMatrix<f64>>); 6] {
        [
            (STEREO_KEYS[0], self.k1.as_ref()),
            (STEREO_KEYS[1], self.d1.as_ref()),
            (STEREO_KEYS[2], self.k2.as_ref()),
            (STEREO_KEYS[3], self.d2.as_ref()),
            (STEREO_KEYS[4], self.r.as_ref()),
            (STEREO_KEYS[5], self.t.as_ref()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(|(_, slot)| slot.is_none())
    }

    /// Converts the slots into a typed record, checking presence and shape.
    pub fn into_calibration(self) -> Result<StereoCalibration, StorageError> {
        fn take(slot: Option<DMatrix<f64>>, key: &str) -> Result<DMatrix<f64>, StorageError> {
            slot.ok_or_else(|| StorageError::MissingKey(key.to_string()))
        }
        let [k1_key, d1_key, k2_key, d2_key, r_key, t_key] = STEREO_KEYS;

        Ok(StereoCalibration {
            left: IntrinsicCalibration {
                camera_matrix: as_matrix3(k1_key, &take(self.k1, k1_key)?)?,
                dist_coeffs: as_vector(d1_key, &take(self.d1, d1_key)?)?,
            },
            right: IntrinsicCalibration {
                camera_matrix: as_matrix3(k2_key, &take(self.k2, k2_key)?)?,
                dist_coeffs: as_vector(d2_key, &take(self.d2, d2_key)?)?,
            },
            rotation: as_matrix3(r_key, &take(self.r, r_key)?)?,
            translation: as_vector3(t_key, &take(self.t, t_key)?)?,
        })
    }
}

/// Writes the combined stereo file with keys `K1, d1, K2, d2, R, t`.
pub fn save_stereo_calibration(
    path: impl AsRef<Path>,
    k1: &DMatrix<f64>,
    d1: &DMatrix<f64>,
    k2: &DMatrix<f64>,
    d2: &DMatrix<f64>,
    r: &DMatrix<f64>,
    t: &DMatrix<f64>,
) -> Result<(), StorageError> {
    let mut store = MatrixStore::new();
    for (key, matrix) in STEREO_KEYS.iter().zip([k1, d1, k2, d2, r, t]) {
        store.insert(*key, matrix.clone());
    }
    store.save(path)
}

/// Reads the combined stereo file.
///
/// An unreadable or unparsable file leaves every slot empty, and an absent
/// key leaves its slot empty; neither is an error at this level.
pub fn read_stereo_calibration(path: impl AsRef<Path>) -> StereoCalibrationSlots {
    let path = path.as_ref();
    match MatrixStore::load(path) {
        Ok(store) => StereoCalibrationSlots::from_store(&store),
        Err(e) => {
            warn!("Could not read stereo calibration {}: {e}", path.display());
            StereoCalibrationSlots::default()
        }
    }
}

fn to_dynamic<const R: usize, const C: usize>(
    matrix: &nalgebra::SMatrix<f64, R, C>,
) -> DMatrix<f64> {
    DMatrix::from_column_slice(R, C, matrix.as_slice())
}

fn row_vector(vector: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_row_slice(1, vector.len(), vector.as_slice())
}

fn as_matrix3(key: &str, matrix: &DMatrix<f64>) -> Result<Matrix3<f64>, StorageError> {
    if matrix.shape() != (3, 3) {
        return Err(StorageError::Shape {
            key: key.to_string(),
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            expected: "3x3",
        });
    }
    Ok(matrix.fixed_view::<3, 3>(0, 0).into_owned())
}

fn as_vector3(key: &str, matrix: &DMatrix<f64>) -> Result<Vector3<f64>, StorageError> {
    if matrix.len() != 3 || (matrix.nrows() != 1 && matrix.ncols() != 1) {
        return Err(StorageError::Shape {
            key: key.to_string(),
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            expected: "3x1 or 1x3",
        });
    }
    Ok(Vector3::from_iterator(matrix.iter().copied()))
}

fn as_vector(key: &str, matrix: &DMatrix<f64>) -> Result<DVector<f64>, StorageError> {
    if matrix.nrows() != 1 && matrix.ncols() != 1 {
        return Err(StorageError::Shape {
            key: key.to_string(),
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            expected: "1xN or Nx1",
        });
    }
    Ok(DVector::from_iterator(matrix.len(), matrix.iter().copied()))
}
