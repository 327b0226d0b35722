//! Rectification views, the disparity demo and the block-matcher sweep.

use super::{check_index, load_intrinsics, log_saved, PipelineError};
use crate::backend::{DisparityMap, VisionBackend};
use crate::camera::Resolution;
use crate::config::{ConfigError, HarnessConfig};
use crate::imaging::{
    draw_guide_lines, load_image, save_image, save_view, scale, to_grayscale, GUIDE_GREEN,
};
use crate::rectify::StereoRemap;
use crate::storage::{read_stereo_calibration, StereoCalibration, StereoExtrinsics};
use image::{GrayImage, RgbImage};
use log::{debug, info};
use rand::Rng;
use std::path::{Path, PathBuf};

/// File name of one sweep result, e.g. `disparity_nd064_bs21.png`.
pub fn sweep_file_name(num_disparities: u32, block_size: u32) -> String {
    format!("disparity_nd{num_disparities:03}_bs{block_size:02}.png")
}

/// Rectifies one calibration pair and saves the raw and rectified views,
/// then the same four views with horizontal guide lines.
///
/// Without an explicit index one is drawn uniformly from the image range.
/// Returns the index used.
pub fn rectify_and_display(
    config: &HarnessConfig,
    backend: &dyn VisionBackend,
    index: Option<u32>,
) -> Result<u32, PipelineError> {
    let range = config.index_range();
    if range.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "empty image index range {}..{}",
            range.start, range.end
        ))
        .into());
    }
    let index = match index {
        Some(index) => index,
        None => rand::thread_rng().gen_range(range),
    };
    check_index(config, index)?;
    info!("Rectifying pair {index}");

    let extrinsics = StereoExtrinsics::load(&config.calibration.stereo_file)?;
    let calibration = StereoCalibration {
        left: load_intrinsics(&config.calibration.left_file)?,
        right: load_intrinsics(&config.calibration.right_file)?,
        rotation: extrinsics.rotation,
        translation: extrinsics.translation,
    };

    let size = config.image_size;
    let rectification =
        backend.stereo_rectify(&calibration, size, Some(config.calibration.rectify_alpha))?;
    debug!("P1:{}P2:{}", rectification.p1, rectification.p2);
    let remap = StereoRemap::new(&calibration, &rectification, size)?;

    let pair = config.naming().pair(index);
    let left = load_image(&pair.left)?;
    let right = load_image(&pair.right)?;
    let (rectified_left, rectified_right) = remap.apply(&left, &right);

    let dir = &config.output.directory;
    let mut saved = vec![
        save_view(dir, "Original Left", &left)?,
        save_view(dir, "Original Right", &right)?,
        save_view(dir, "Rectified Left", &rectified_left)?,
        save_view(dir, "Rectified Right", &rectified_right)?,
    ];

    let spacing = config.output.guide_line_spacing;
    for (name, image) in [
        ("Rectified Left with Lines", rectified_left),
        ("Rectified Right with Lines", rectified_right),
        ("Original Left with lines", left),
        ("Original Right with lines", right),
    ] {
        let mut lined = image;
        draw_guide_lines(&mut lined, spacing, GUIDE_GREEN);
        saved.push(save_view(dir, name, &lined)?);
    }

    log_saved("rectify", saved.len(), config);
    Ok(index)
}

/// A stereo pair rectified with a combined calibration file and reduced to
/// the grayscale images handed to the block matcher.
struct MatchingInput {
    left: RgbImage,
    right: RgbImage,
    rectified_left: RgbImage,
    rectified_right: RgbImage,
    left_gray: GrayImage,
    right_gray: GrayImage,
}

fn print_calibration_slots(path: &Path) -> Result<StereoCalibration, PipelineError> {
    let slots = read_stereo_calibration(path);
    println!("Stereo calibration from {}:", path.display());
    for (key, slot) in slots.entries() {
        match slot {
            Some(matrix) => println!("{key}:{matrix}"),
            None => println!("{key}: <missing>"),
        }
    }
    Ok(slots.into_calibration()?)
}

fn prepare_matching_input(
    config: &HarnessConfig,
    backend: &dyn VisionBackend,
    left_path: &Path,
    right_path: &Path,
    calibration_path: &Path,
) -> Result<MatchingInput, PipelineError> {
    let calibration = print_calibration_slots(calibration_path)?;
    let left = load_image(left_path)?;
    let right = load_image(right_path)?;

    let size = Resolution::new(left.width(), left.height());
    let rectification = backend.stereo_rectify(&calibration, size, None)?;
    let remap = StereoRemap::new(&calibration, &rectification, size)?;
    let (rectified_left, rectified_right) = remap.apply(&left, &right);

    let factor = config.matcher.downscale;
    let rectified_left = scale(&rectified_left, factor)?;
    let rectified_right = scale(&rectified_right, factor)?;
    let left_gray = to_grayscale(&rectified_left);
    let right_gray = to_grayscale(&rectified_right);
    debug!(
        "Matching input is {}x{}",
        left_gray.width(),
        left_gray.height()
    );

    Ok(MatchingInput {
        left,
        right,
        rectified_left,
        rectified_right,
        left_gray,
        right_gray,
    })
}

/// Rectifies two images with a combined calibration file and computes one
/// disparity map with the configured matcher parameters.
pub fn stereo_disparity(
    config: &HarnessConfig,
    backend: &dyn VisionBackend,
    left_path: &Path,
    right_path: &Path,
    calibration_path: &Path,
) -> Result<DisparityMap, PipelineError> {
    let input = prepare_matching_input(config, backend, left_path, right_path, calibration_path)?;
    let params = config.matcher.params();
    let disparity = backend.compute_disparity(&input.left_gray, &input.right_gray, params)?;

    let dir = &config.output.directory;
    save_view(dir, "Left", &input.left)?;
    save_view(dir, "Right", &input.right)?;
    save_view(dir, "Left_Remapped", &input.rectified_left)?;
    save_view(dir, "Right_Remapped", &input.rectified_right)?;
    save_view(dir, "Disparity", &disparity.to_visual())?;

    match disparity.valid_range() {
        Some((lo, hi)) => info!(
            "{} of {} pixels matched, raw disparity {lo}..={hi}",
            disparity.valid_count(),
            disparity.data.len()
        ),
        None => info!("No pixel matched"),
    }
    log_saved("disparity", 5, config);
    Ok(disparity)
}

/// Rectifies once, then runs the matcher over every combination of the
/// configured disparity and block-size ranges, saving one image per run.
pub fn matcher_sweep(
    config: &HarnessConfig,
    backend: &dyn VisionBackend,
    left_path: &Path,
    right_path: &Path,
    calibration_path: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let grid = config.matcher.sweep_grid()?;
    let input = prepare_matching_input(config, backend, left_path, right_path, calibration_path)?;

    let mut saved = Vec::with_capacity(grid.len());
    for params in grid {
        let disparity = backend.compute_disparity(&input.left_gray, &input.right_gray, params)?;
        let path = config.output_path(sweep_file_name(params.num_disparities, params.block_size));
        save_image(&disparity.to_visual(), &path)?;
        debug!(
            "nd={} bs={} -> {}",
            params.num_disparities,
            params.block_size,
            path.display()
        );
        saved.push(path);
    }

    log_saved("sweep", saved.len(), config);
    Ok(saved)
}
