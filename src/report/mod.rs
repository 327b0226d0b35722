//! Run reports written next to the images in the output directory.

use crate::camera::Resolution;
use crate::dataset::Side;
use crate::pattern::PatternSize;
use crate::pipeline::PairDetection;
use crate::storage::{IntrinsicCalibration, StereoExtrinsics};
use log::info;
use nalgebra::{Matrix3, Matrix3xX};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("IO Error: {0}")]
    IOError(String),
    #[error("Failed to write JSON: {0}")]
    JsonError(String),
    #[error("Failed to write CSV: {0}")]
    CsvError(String),
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::IOError(err.to_string())
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        ReportError::JsonError(err.to_string())
    }
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        ReportError::CsvError(err.to_string())
    }
}

fn rows3(matrix: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [0, 1, 2].map(|r| [matrix[(r, 0)], matrix[(r, 1)], matrix[(r, 2)]])
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraSummary {
    pub camera: String,
    pub rms: f64,
    pub camera_matrix: [[f64; 3]; 3],
    pub dist_coeffs: Vec<f64>,
}

impl CameraSummary {
    pub fn new(camera: &str, calibration: &IntrinsicCalibration, rms: f64) -> Self {
        CameraSummary {
            camera: camera.to_string(),
            rms,
            camera_matrix: rows3(&calibration.camera_matrix),
            dist_coeffs: calibration.dist_coeffs.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StereoSummary {
    pub rms: f64,
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
    pub baseline: f64,
}

impl StereoSummary {
    pub fn new(extrinsics: &StereoExtrinsics, rms: f64) -> Self {
        let t = extrinsics.translation;
        StereoSummary {
            rms,
            rotation: rows3(&extrinsics.rotation),
            translation: [t.x, t.y, t.z],
            baseline: extrinsics.baseline(),
        }
    }
}

/// What a calibration routine did, for later inspection.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub routine: String,
    pub pattern: PatternSize,
    pub square_size: f64,
    pub image_size: Resolution,
    pub valid_pairs: usize,
    /// Indices of pairs where the board was not found in both images.
    pub failed_pairs: Vec<u32>,
    pub unreadable_images: Vec<PathBuf>,
    pub cameras: Vec<CameraSummary>,
    pub stereo: Option<StereoSummary>,
}

pub fn write_summary(path: impl AsRef<Path>, summary: &RunSummary) -> Result<(), ReportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    info!("Wrote run summary to {}", path.display());
    Ok(())
}

#[derive(Debug, Serialize)]
struct CornerRecord {
    index: u32,
    side: &'static str,
    corner: usize,
    u: f64,
    v: f64,
    x: f64,
    y: f64,
    z: f64,
}

/// Writes every detected corner with its board coordinate, one row per corner.
///
/// Returns the number of rows written.
pub fn export_corners_csv(
    path: impl AsRef<Path>,
    detections: &[PairDetection],
    object_points: &Matrix3xX<f64>,
) -> Result<usize, ReportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;

    for detection in detections {
        for (side, corners) in [(Side::Left, &detection.left), (Side::Right, &detection.right)] {
            for (corner, (image, board)) in corners
                .column_iter()
                .zip(object_points.column_iter())
                .enumerate()
            {
                writer.serialize(CornerRecord {
                    index: detection.pair.index,
                    side: side.label(),
                    corner,
                    u: image[0],
                    v: image[1],
                    x: board[0],
                    y: board[1],
                    z: board[2],
                })?;
                rows += 1;
            }
        }
    }

    writer.flush()?;
    info!("Exported {rows} corners to {}", path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ImagePairNaming;
    use crate::pattern::Checkerboard;
    use nalgebra::{DVector, Matrix2xX, Vector3};

    #[test]
    fn test_summary_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let intrinsics = IntrinsicCalibration::new(
            Matrix3::new(1400.0, 0.0, 960.0, 0.0, 1400.0, 540.0, 0.0, 0.0, 1.0),
            DVector::from_vec(vec![-0.1, 0.02, 0.0, 0.0]),
        );
        let summary = RunSummary {
            routine: "stereo-calibrate".to_string(),
            pattern: PatternSize::new(10, 5),
            square_size: 47.0,
            image_size: Resolution::new(1920, 1080),
            valid_pairs: 12,
            failed_pairs: vec![460, 471],
            unreadable_images: vec![PathBuf::from("data/CalibrationLeft/DSCF0465_L.JPG")],
            cameras: vec![CameraSummary::new("left", &intrinsics, 0.31)],
            stereo: Some(StereoSummary::new(
                &StereoExtrinsics::new(Matrix3::identity(), Vector3::new(-3.0, 4.0, 0.0)),
                0.42,
            )),
        };
        write_summary(&path, &summary).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["valid_pairs"], 12);
        assert_eq!(value["failed_pairs"][1], 471);
        assert_eq!(value["pattern"]["columns"], 10);
        assert_eq!(value["cameras"][0]["camera_matrix"][0][2], 960.0);
        assert_eq!(value["stereo"]["baseline"], 5.0);
    }

    #[test]
    fn test_corner_csv_has_one_row_per_corner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corners.csv");
        let board = Checkerboard::new(PatternSize::new(3, 2), 10.0);
        let corners = Matrix2xX::from_fn(6, |r, c| (r * 100 + c) as f64);
        let detections = vec![PairDetection {
            pair: ImagePairNaming::default().pair(457),
            left: corners.clone(),
            right: corners,
        }];

        let rows = export_corners_csv(&path, &detections, &board.object_points()).unwrap();
        assert_eq!(rows, 12);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["index", "side", "corner", "u", "v", "x", "y", "z"]
        );
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 12);
        assert_eq!(&records[4][0], "457");
        assert_eq!(&records[4][1], "left");
        assert_eq!(&records[4][3], "4.0");
        assert_eq!(&records[4][5], "10.0");
        assert_eq!(&records[4][6], "10.0");
        assert_eq!(&records[6][1], "right");
    }
}
