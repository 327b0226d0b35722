//! Stereo Calibration Library
//!
//! A harness for calibrating a two-camera rig from checkerboard image pairs
//! and inspecting the result. It provides:
//! - Intrinsic calibration of both cameras and stereo calibration of the pair
//! - Calibration files in the OpenCV `FileStorage` YAML layout
//! - Undistortion and rectification maps built on the radial-tangential model
//! - Block-matching disparity, including a sweep over matcher parameters
//!
//! Chessboard detection, the nonlinear calibration solvers and block matching
//! are delegated to a vision library through [`backend::VisionBackend`].

pub mod backend;
pub mod camera;
pub mod config;
pub mod dataset;
pub mod imaging;
pub mod pattern;
pub mod pipeline;
pub mod rectify;
pub mod report;
pub mod storage;

// Re-export commonly used types
pub use backend::{BackendError, BlockMatchingParams, DisparityMap, VisionBackend};
pub use camera::{CameraModelError, Intrinsics, PinholeModel, RadTanModel, Resolution};
pub use config::HarnessConfig;
pub use pipeline::PipelineError;
pub use storage::{
    read_stereo_calibration, save_stereo_calibration, IntrinsicCalibration, MatrixStore,
    StereoCalibration, StereoCalibrationSlots, StereoExtrinsics,
};
