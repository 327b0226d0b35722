//! Calibration image pairs.
//!
//! Left and right captures share a numeric index and differ only in their
//! directory and suffix, e.g. `data/CalibrationLeft/DSCF0457_L.JPG` and
//! `data/CalibrationRight/DSCF0457_R.JPG`.

use crate::config::DatasetConfig;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn label(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// File naming scheme of the capture rig.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePairNaming {
    pub left_dir: PathBuf,
    pub right_dir: PathBuf,
    pub prefix: String,
    pub index_width: usize,
    pub left_suffix: String,
    pub right_suffix: String,
}

impl ImagePairNaming {
    pub fn from_config(config: &DatasetConfig) -> Self {
        ImagePairNaming {
            left_dir: config.left_dir.clone(),
            right_dir: config.right_dir.clone(),
            prefix: config.prefix.clone(),
            index_width: config.index_width,
            left_suffix: config.left_suffix.clone(),
            right_suffix: config.right_suffix.clone(),
        }
    }

    pub fn file_name(&self, side: Side, index: u32) -> String {
        let suffix = match side {
            Side::Left => &self.left_suffix,
            Side::Right => &self.right_suffix,
        };
        format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            suffix,
            width = self.index_width
        )
    }

    pub fn path(&self, side: Side, index: u32) -> PathBuf {
        let dir = match side {
            Side::Left => &self.left_dir,
            Side::Right => &self.right_dir,
        };
        dir.join(self.file_name(side, index))
    }

    pub fn pair(&self, index: u32) -> ImagePair {
        ImagePair {
            index,
            left: self.path(Side::Left, index),
            right: self.path(Side::Right, index),
        }
    }

    /// Every pair in a half-open index range, in ascending order.
    pub fn pairs(&self, range: Range<u32>) -> Vec<ImagePair> {
        range.map(|index| self.pair(index)).collect()
    }
}

impl Default for ImagePairNaming {
    fn default() -> Self {
        Self::from_config(&DatasetConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub index: u32,
    pub left: PathBuf,
    pub right: PathBuf,
}

impl ImagePair {
    pub fn path(&self, side: Side) -> &Path {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_are_zero_padded() {
        let naming = ImagePairNaming::default();
        let pair = naming.pair(457);
        assert_eq!(pair.left, PathBuf::from("data/CalibrationLeft/DSCF0457_L.JPG"));
        assert_eq!(
            pair.right,
            PathBuf::from("data/CalibrationRight/DSCF0457_R.JPG")
        );
        assert_eq!(naming.file_name(Side::Left, 7), "DSCF0007_L.JPG");
    }

    #[test]
    fn test_pairs_cover_half_open_range() {
        let naming = ImagePairNaming::default();
        let pairs = naming.pairs(457..476);
        assert_eq!(pairs.len(), 19);
        assert_eq!(pairs.first().unwrap().index, 457);
        assert_eq!(pairs.last().unwrap().index, 475);
        assert!(naming.pairs(10..10).is_empty());
    }

    #[test]
    fn test_wide_index_is_not_truncated() {
        let naming = ImagePairNaming::default();
        assert_eq!(naming.file_name(Side::Right, 12345), "DSCF12345_R.JPG");
    }

    #[test]
    fn test_pair_path_by_side() {
        let naming = ImagePairNaming {
            left_dir: PathBuf::from("l"),
            right_dir: PathBuf::from("r"),
            ..ImagePairNaming::default()
        };
        let pair = naming.pair(1);
        assert_eq!(pair.path(Side::Left), Path::new("l/DSCF0001_L.JPG"));
        assert_eq!(pair.path(Side::Right), pair.right.as_path());
        assert_eq!(Side::Right.label(), "right");
    }
}
