//! Tagged-matrix calibration files.
//!
//! Calibration results are stored in the YAML dialect written by OpenCV's
//! `FileStorage`: a `%YAML:1.0` header followed by one `!!opencv-matrix` node
//! per key. [`MatrixStore`] reads and writes that layout, and the
//! [`records`] submodule maps the well-known keys onto typed records.

use log::debug;
use nalgebra::DMatrix;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use yaml_rust::{Yaml, YamlLoader};

pub mod records;

pub use records::{
    read_stereo_calibration, save_stereo_calibration, IntrinsicCalibration, StereoCalibration,
    StereoCalibrationSlots, StereoExtrinsics,
};

const YAML_HEADER: &str = "%YAML:1.0";
const MATRIX_TAG: &str = "!!opencv-matrix";

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("IO Error: {0}")]
    IOError(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("Malformed matrix '{key}': {reason}")]
    Malformed { key: String, reason: String },
    #[error("Missing key '{0}'")]
    MissingKey(String),
    #[error("Matrix '{key}' is {rows}x{cols}, expected {expected}")]
    Shape {
        key: String,
        rows: usize,
        cols: usize,
        expected: &'static str,
    },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for StorageError {
    fn from(err: yaml_rust::ScanError) -> Self {
        StorageError::YamlError(err.to_string())
    }
}

/// An insertion-ordered set of named matrices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixStore {
    entries: Vec<(String, DMatrix<f64>)>,
}

impl MatrixStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a matrix, replacing any previous value stored under `key`
    /// while keeping its position.
    pub fn insert(&mut self, key: impl Into<String>, matrix: DMatrix<f64>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = matrix,
            None => self.entries.push((key, matrix)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&DMatrix<f64>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, matrix)| matrix)
    }

    /// Like [`MatrixStore::get`] but reports an absent key as an error.
    pub fn require(&self, key: &str) -> Result<&DMatrix<f64>, StorageError> {
        self.get(key)
            .ok_or_else(|| StorageError::MissingKey(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the store in the `FileStorage` layout.
    ///
    /// Values use Rust's shortest round-trip formatting, so reading the text
    /// back yields bit-identical matrices.
    pub fn to_yaml_string(&self) -> String {
        let mut out = String::new();
        out.push_str(YAML_HEADER);
        out.push_str("\n---\n");
        for (key, matrix) in &self.entries {
            let data: Vec<String> = matrix
                .transpose()
                .iter()
                .map(|value| format!("{value:?}"))
                .collect();
            // Writing into a String cannot fail.
            let _ = writeln!(out, "{key}: {MATRIX_TAG}");
            let _ = writeln!(out, "   rows: {}", matrix.nrows());
            let _ = writeln!(out, "   cols: {}", matrix.ncols());
            let _ = writeln!(out, "   dt: d");
            let _ = writeln!(out, "   data: [ {} ]", data.join(", "));
        }
        out
    }

    /// Parses text in the `FileStorage` layout.
    ///
    /// Top-level keys that do not hold a matrix node are skipped.
    pub fn from_yaml_str(contents: &str) -> Result<Self, StorageError> {
        // yaml-rust rejects OpenCV's `%YAML:1.0` directive
        let sanitized: String = contents
            .lines()
            .filter(|line| !line.trim_start().starts_with("%YAML"))
            .map(|line| line.replace(MATRIX_TAG, ""))
            .collect::<Vec<_>>()
            .join("\n");

        let docs = YamlLoader::load_from_str(&sanitized)?;
        let mut store = MatrixStore::new();
        let Some(doc) = docs.first() else {
            return Ok(store);
        };

        let hash = match doc {
            Yaml::Hash(hash) => hash,
            Yaml::Null => return Ok(store),
            _ => {
                return Err(StorageError::YamlError(
                    "top level of a calibration file must be a mapping".to_string(),
                ))
            }
        };

        for (key, node) in hash {
            let Some(key) = key.as_str() else {
                continue;
            };
            if node.as_hash().is_none() || node["data"].is_badvalue() {
                debug!("Skipping non-matrix key '{key}'");
                continue;
            }
            store.insert(key, parse_matrix(key, node)?);
        }

        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_yaml_string())?;
        debug!("Wrote {} matrices to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }
}

fn parse_matrix(key: &str, node: &Yaml) -> Result<DMatrix<f64>, StorageError> {
    let malformed = |reason: String| StorageError::Malformed {
        key: key.to_string(),
        reason,
    };

    let rows = node["rows"]
        .as_i64()
        .filter(|r| *r >= 0)
        .ok_or_else(|| malformed("'rows' is not a non-negative integer".to_string()))?
        as usize;
    let cols = node["cols"]
        .as_i64()
        .filter(|c| *c >= 0)
        .ok_or_else(|| malformed("'cols' is not a non-negative integer".to_string()))?
        as usize;
    let data_yaml = node["data"]
        .as_vec()
        .ok_or_else(|| malformed("'data' is not a list".to_string()))?;

    let mut data = Vec::with_capacity(data_yaml.len());
    for (i, value) in data_yaml.iter().enumerate() {
        let value = match value {
            Yaml::Integer(v) => *v as f64,
            Yaml::Real(_) => value
                .as_f64()
                .ok_or_else(|| malformed(format!("invalid number at index {i}")))?,
            _ => return Err(malformed(format!("non-numeric value at index {i}"))),
        };
        data.push(value);
    }

    let expected = rows
        .checked_mul(cols)
        .ok_or_else(|| malformed(format!("{rows}x{cols} is too large")))?;
    if data.len() != expected {
        return Err(malformed(format!(
            "expected {expected} values for {rows}x{cols}, found {}",
            data.len()
        )));
    }

    Ok(DMatrix::from_row_slice(rows, cols, &data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_preserves_insertion_order_and_replaces_in_place() {
        let mut store = MatrixStore::new();
        store.insert("b", DMatrix::zeros(1, 1));
        store.insert("a", DMatrix::zeros(2, 2));
        store.insert("b", DMatrix::from_element(1, 2, 3.0));

        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(store.get("b").unwrap().ncols(), 2);
        assert!(matches!(
            store.require("c"),
            Err(StorageError::MissingKey(key)) if key == "c"
        ));
    }

    #[test]
    fn test_written_layout_matches_file_storage() {
        let mut store = MatrixStore::new();
        store.insert(
            "CameraMatrix",
            DMatrix::from_row_slice(2, 2, &[1400.0, 0.0, 0.5, 1.0]),
        );
        let text = store.to_yaml_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "%YAML:1.0");
        assert_eq!(lines[1], "---");
        assert_eq!(lines[2], "CameraMatrix: !!opencv-matrix");
        assert_eq!(lines[3], "   rows: 2");
        assert_eq!(lines[4], "   cols: 2");
        assert_eq!(lines[5], "   dt: d");
        assert_eq!(lines[6], "   data: [ 1400.0, 0.0, 0.5, 1.0 ]");
    }

    #[test]
    fn test_reads_file_storage_output() {
        let text = "%YAML:1.0\n---\nCameraMatrix: !!opencv-matrix\n   rows: 3\n   cols: 3\n   dt: d\n   data: [ 1.4e+03, 0., 9.6e+02, 0., 1.4e+03,\n       5.4e+02, 0., 0., 1. ]\nDistCoeffs: !!opencv-matrix\n   rows: 1\n   cols: 5\n   dt: d\n   data: [ -1.2e-01, 3.e-02, 0, 0, 1.5e-03 ]\nimage_count: 17\n";
        let store = MatrixStore::from_yaml_str(text).unwrap();

        assert_eq!(store.len(), 2);
        let k = store.get("CameraMatrix").unwrap();
        assert_eq!(k.shape(), (3, 3));
        assert_eq!(k[(0, 0)], 1400.0);
        assert_eq!(k[(0, 2)], 960.0);
        assert_eq!(k[(1, 2)], 540.0);
        assert_eq!(k[(2, 2)], 1.0);

        let d = store.get("DistCoeffs").unwrap();
        assert_eq!(d.shape(), (1, 5));
        assert_eq!(d[(0, 0)], -0.12);
        assert_eq!(d[(0, 2)], 0.0);
        assert_eq!(d[(0, 4)], 0.0015);
    }

    #[test]
    fn test_round_trip_is_exact() {
        let mut store = MatrixStore::new();
        store.insert(
            "R",
            DMatrix::from_row_slice(
                3,
                3,
                &[
                    0.9998476951563913,
                    -0.017452406437283512,
                    1e-17,
                    0.017452406437283512,
                    0.9998476951563913,
                    -3.5e-9,
                    -0.0,
                    1.0 / 3.0,
                    1.0,
                ],
            ),
        );
        store.insert("t", DMatrix::from_row_slice(3, 1, &[-119.87, 0.25, 1.5e3]));

        let parsed = MatrixStore::from_yaml_str(&store.to_yaml_string()).unwrap();
        assert_eq!(parsed, store);
    }

    #[test]
    fn test_data_length_mismatch_is_malformed() {
        let text = concat!(
            "%YAML:1.0\n---\nR: !!opencv-matrix\n",
            "   rows: 3\n   cols: 3\n   dt: d\n   data: [ 1., 0., 0. ]\n",
        );
        assert!(matches!(
            MatrixStore::from_yaml_str(text),
            Err(StorageError::Malformed { key, .. }) if key == "R"
        ));
    }

    #[test]
    fn test_oversized_header_is_malformed() {
        let text = concat!(
            "%YAML:1.0\n---\nR: !!opencv-matrix\n",
            "   rows: 4294967296\n   cols: 4294967296\n   dt: d\n   data: []\n",
        );
        assert!(matches!(
            MatrixStore::from_yaml_str(text),
            Err(StorageError::Malformed { key, .. }) if key == "R"
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = MatrixStore::load(dir.path().join("absent.yml"));
        assert!(matches!(result, Err(StorageError::IOError(_))));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("calib.yml");
        let mut store = MatrixStore::new();
        store.insert("t", DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]));
        store.save(&path).unwrap();

        assert_eq!(MatrixStore::load(&path).unwrap(), store);
    }
}
