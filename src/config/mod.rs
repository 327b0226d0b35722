//! Harness configuration.
//!
//! Every field defaults to the constants the calibration rig was shot with
//! (10x5 inner corners, 47 mm squares, 1920x1080 images, indices 457..476).
//! A YAML file may override any subset of them.

use crate::backend::BlockMatchingParams;
use crate::camera::Resolution;
use crate::dataset::ImagePairNaming;
use crate::pattern::{Checkerboard, PatternSize};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    IOError(String),
    #[error("Failed to parse YAML config: {0}")]
    YamlError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IOError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::YamlError(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Inner corners per checkerboard row.
    pub columns: u32,
    /// Inner corners per checkerboard column.
    pub rows: u32,
    /// Edge length of one square, in millimetres.
    pub square_size: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            columns: 10,
            rows: 5,
            square_size: 47.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub left_dir: PathBuf,
    pub right_dir: PathBuf,
    pub prefix: String,
    pub index_width: usize,
    pub left_suffix: String,
    pub right_suffix: String,
    pub first_index: u32,
    /// Exclusive end of the calibration index range.
    pub end_index: u32,
    /// Pair used by the left/right pixel difference check.
    pub difference_index: u32,
    /// Left image used by the undistortion check.
    pub undistort_index: u32,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            left_dir: PathBuf::from("data/CalibrationLeft"),
            right_dir: PathBuf::from("data/CalibrationRight"),
            prefix: "DSCF".to_string(),
            index_width: 4,
            left_suffix: "_L.JPG".to_string(),
            right_suffix: "_R.JPG".to_string(),
            first_index: 457,
            end_index: 476,
            difference_index: 455,
            undistort_index: 463,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub left_file: PathBuf,
    pub right_file: PathBuf,
    pub stereo_file: PathBuf,
    /// Six-key file (`K1, d1, K2, d2, R, t`) read by the disparity demo.
    pub combined_file: PathBuf,
    pub min_stereo_pairs: usize,
    /// Detect on grayscale images with adaptive threshold, normalization and fast check.
    pub grayscale_preprocessing: bool,
    pub refine_stereo_corners: bool,
    /// Half side length of the sub-pixel refinement window; the search
    /// window spans `2 * refine_window + 1` pixels.
    pub refine_window: u32,
    /// Free scaling parameter of the rectification, 0 crops to valid pixels, 1 keeps all.
    pub rectify_alpha: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            left_file: PathBuf::from("left_camera_calibration.yml"),
            right_file: PathBuf::from("right_camera_calibration.yml"),
            stereo_file: PathBuf::from("stereo_calibration.yml"),
            combined_file: PathBuf::from("stereo_pair_calibration.yml"),
            min_stereo_pairs: 5,
            grayscale_preprocessing: true,
            refine_stereo_corners: false,
            refine_window: 11,
            rectify_alpha: 1.0,
        }
    }
}

/// An inclusive stepped range, e.g. `16..=128` in steps of 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepRange {
    pub start: u32,
    pub end: u32,
    pub step: u32,
}

impl SweepRange {
    pub fn values(&self) -> Vec<u32> {
        if self.step == 0 || self.start > self.end {
            return Vec::new();
        }
        (self.start..=self.end).step_by(self.step as usize).collect()
    }

    fn check_non_empty(&self, name: &str) -> Result<(), ConfigError> {
        if self.step == 0 || self.start > self.end {
            return Err(ConfigError::Invalid(format!(
                "{name} sweep {}..={} in steps of {} is empty",
                self.start, self.end, self.step
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub num_disparities: u32,
    pub block_size: u32,
    /// Scale applied to the rectified images before matching.
    pub downscale: f64,
    pub sweep_disparities: SweepRange,
    pub sweep_block_sizes: SweepRange,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            num_disparities: 64,
            block_size: 21,
            downscale: 0.25,
            sweep_disparities: SweepRange {
                start: 16,
                end: 128,
                step: 16,
            },
            sweep_block_sizes: SweepRange {
                start: 5,
                end: 21,
                step: 2,
            },
        }
    }
}

impl MatcherConfig {
    pub fn params(&self) -> BlockMatchingParams {
        BlockMatchingParams::new(self.num_disparities, self.block_size)
    }

    /// Every combination of the two sweep ranges, disparities outermost.
    ///
    /// Fails on an empty range or when any combination is rejected by the
    /// matcher.
    pub fn sweep_grid(&self) -> Result<Vec<BlockMatchingParams>, ConfigError> {
        self.sweep_disparities.check_non_empty("disparity")?;
        self.sweep_block_sizes.check_non_empty("block size")?;
        let block_sizes = self.sweep_block_sizes.values();
        let mut grid = Vec::new();
        for num_disparities in self.sweep_disparities.values() {
            for &block_size in &block_sizes {
                let params = BlockMatchingParams::new(num_disparities, block_size);
                params
                    .validate()
                    .map_err(|e| ConfigError::Invalid(format!("sweep: {e}")))?;
                grid.push(params);
            }
        }
        Ok(grid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Vertical spacing of the scanline guides drawn on rectified views.
    pub guide_line_spacing: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            directory: PathBuf::from("output"),
            guide_line_spacing: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub pattern: PatternConfig,
    pub image_size: Resolution,
    pub dataset: DatasetConfig,
    pub calibration: CalibrationConfig,
    pub matcher: MatcherConfig,
    pub output: OutputConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            pattern: PatternConfig::default(),
            image_size: Resolution::new(1920, 1080),
            dataset: DatasetConfig::default(),
            calibration: CalibrationConfig::default(),
            matcher: MatcherConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Loads a configuration file; absent fields keep their defaults.
    pub fn load_from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: HarnessConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pattern.columns == 0 || self.pattern.rows == 0 {
            return Err(ConfigError::Invalid(
                "pattern needs at least one inner corner in each direction".to_string(),
            ));
        }
        if !(self.pattern.square_size > 0.0) {
            return Err(ConfigError::Invalid(
                "square_size must be positive".to_string(),
            ));
        }
        if self.image_size.width == 0 || self.image_size.height == 0 {
            return Err(ConfigError::Invalid("image_size must be non-zero".to_string()));
        }
        if self.dataset.first_index >= self.dataset.end_index {
            return Err(ConfigError::Invalid(format!(
                "empty image index range {}..{}",
                self.dataset.first_index, self.dataset.end_index
            )));
        }
        if !(self.matcher.downscale > 0.0) {
            return Err(ConfigError::Invalid("downscale must be positive".to_string()));
        }
        if self.calibration.refine_window == 0 {
            return Err(ConfigError::Invalid(
                "refine_window must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.calibration.rectify_alpha) {
            return Err(ConfigError::Invalid(
                "rectify_alpha must lie in [0, 1]".to_string(),
            ));
        }
        self.matcher
            .params()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.matcher.sweep_grid()?;
        Ok(())
    }

    pub fn checkerboard(&self) -> Checkerboard {
        Checkerboard::new(
            PatternSize::new(self.pattern.columns, self.pattern.rows),
            self.pattern.square_size,
        )
    }

    pub fn naming(&self) -> ImagePairNaming {
        ImagePairNaming::from_config(&self.dataset)
    }

    pub fn index_range(&self) -> Range<u32> {
        self.dataset.first_index..self.dataset.end_index
    }

    /// Resolves a path relative to the output directory.
    pub fn output_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.output.directory.join(name)
    }
}
