//! Image I/O and the small pixel operations the harness routines need.
//!
//! Images are handled as 8-bit [`RgbImage`] / [`GrayImage`] buffers from the
//! `image` crate. Windows of an interactive viewer are replaced by PNG files
//! written with [`save_view`].

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, ImageReader, Pixel, PixelWithColorType, Rgb, RgbImage};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

pub mod draw;
pub mod remap;

pub use draw::{draw_chessboard_corners, draw_guide_lines, draw_horizontal_line};
pub use remap::{remap, RemapTable};

pub const GUIDE_GREEN: Rgb<u8> = Rgb([0, 255, 0]);

#[derive(thiserror::Error, Debug)]
pub enum ImagingError {
    #[error("IO Error: {0}")]
    IOError(String),
    #[error("Failed to load image {path}: {reason}")]
    LoadError { path: PathBuf, reason: String },
    #[error("Failed to save image {path}: {reason}")]
    SaveError { path: PathBuf, reason: String },
    #[error("Image sizes differ: {left:?} vs {right:?}")]
    SizeMismatch { left: (u32, u32), right: (u32, u32) },
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

impl From<std::io::Error> for ImagingError {
    fn from(err: std::io::Error) -> Self {
        ImagingError::IOError(err.to_string())
    }
}

/// Load an image from file path as 8-bit RGB.
///
/// The format is taken from the file contents, not the extension.
pub fn load_image(path: impl AsRef<Path>) -> Result<RgbImage, ImagingError> {
    let path = path.as_ref();
    let load_error = |reason: String| ImagingError::LoadError {
        path: path.to_path_buf(),
        reason,
    };
    let img = ImageReader::open(path)
        .map_err(|e| load_error(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| load_error(e.to_string()))?
        .decode()
        .map_err(|e| load_error(e.to_string()))?;
    debug!(
        "Loaded {} ({}x{})",
        path.display(),
        img.width(),
        img.height()
    );
    Ok(img.to_rgb8())
}

pub fn save_image<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    path: impl AsRef<Path>,
) -> Result<(), ImagingError>
where
    P: Pixel<Subpixel = u8> + PixelWithColorType,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    image.save(path).map_err(|e| ImagingError::SaveError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// File name a view is saved under: lowercase, spaces replaced by underscores.
pub fn view_file_name(view_name: &str) -> String {
    format!("{}.png", view_name.to_lowercase().replace(' ', "_"))
}

/// Saves a named view into `output_dir` and returns the written path.
pub fn save_view<P>(
    output_dir: &Path,
    view_name: &str,
    image: &ImageBuffer<P, Vec<u8>>,
) -> Result<PathBuf, ImagingError>
where
    P: Pixel<Subpixel = u8> + PixelWithColorType,
{
    let path = output_dir.join(view_file_name(view_name));
    save_image(image, &path)?;
    info!("Saved '{view_name}' to {}", path.display());
    Ok(path)
}

/// Convert RGB image to grayscale
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut gray_img = GrayImage::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let gray_value =
            0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64;
        gray_img.put_pixel(x, y, image::Luma([gray_value.round().min(255.0) as u8]));
    }

    gray_img
}

/// Resizes with bilinear filtering.
pub fn resize<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    width: u32,
    height: u32,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    imageops::resize(img, width, height, FilterType::Triangle)
}

/// Scales both dimensions by `factor`, rounding to the nearest pixel.
pub fn scale<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    factor: f64,
) -> Result<ImageBuffer<P, Vec<u8>>, ImagingError>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if !(factor > 0.0) || !factor.is_finite() {
        return Err(ImagingError::InvalidParams(format!(
            "scale factor must be positive, got {factor}"
        )));
    }
    let width = ((img.width() as f64 * factor).round() as u32).max(1);
    let height = ((img.height() as f64 * factor).round() as u32).max(1);
    Ok(resize(img, width, height))
}

fn check_same_size(a: &RgbImage, b: &RgbImage) -> Result<(), ImagingError> {
    if a.dimensions() != b.dimensions() {
        return Err(ImagingError::SizeMismatch {
            left: a.dimensions(),
            right: b.dimensions(),
        });
    }
    Ok(())
}

/// Per-channel absolute difference.
pub fn abs_diff(a: &RgbImage, b: &RgbImage) -> Result<RgbImage, ImagingError> {
    check_same_size(a, b)?;
    let mut out = RgbImage::new(a.width(), a.height());
    for ((dst, pa), pb) in out.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
        for c in 0..3 {
            dst[c] = pa[c].abs_diff(pb[c]);
        }
    }
    Ok(out)
}

/// Mean of each channel over the whole image.
pub fn channel_means(img: &RgbImage) -> [f64; 3] {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return [0.0; 3];
    }
    let mut sums = [0u64; 3];
    for pixel in img.pixels() {
        for c in 0..3 {
            sums[c] += pixel[c] as u64;
        }
    }
    sums.map(|s| s as f64 / count as f64)
}

/// `a * alpha + b * beta + gamma`, rounded and saturated per channel.
pub fn blend(
    a: &RgbImage,
    alpha: f64,
    b: &RgbImage,
    beta: f64,
    gamma: f64,
) -> Result<RgbImage, ImagingError> {
    check_same_size(a, b)?;
    let mut out = RgbImage::new(a.width(), a.height());
    for ((dst, pa), pb) in out.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
        for c in 0..3 {
            let value = pa[c] as f64 * alpha + pb[c] as f64 * beta + gamma;
            dst[c] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }

    #[test]
    fn test_grayscale_weights() {
        let img = solid(2, 2, [255, 0, 0]);
        assert_eq!(to_grayscale(&img).get_pixel(0, 0)[0], 76);
        let img = solid(2, 2, [255, 255, 255]);
        assert_eq!(to_grayscale(&img).get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn test_abs_diff_and_means() {
        let a = solid(4, 2, [10, 200, 30]);
        let b = solid(4, 2, [20, 100, 30]);
        let diff = abs_diff(&a, &b).unwrap();
        assert_eq!(diff.get_pixel(3, 1), &Rgb([10, 100, 0]));
        assert_eq!(channel_means(&diff), [10.0, 100.0, 0.0]);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let a = solid(4, 2, [0, 0, 0]);
        let b = solid(2, 4, [0, 0, 0]);
        assert!(matches!(
            abs_diff(&a, &b),
            Err(ImagingError::SizeMismatch { .. })
        ));
        assert!(blend(&a, 0.5, &b, 0.5, 0.0).is_err());
    }

    #[test]
    fn test_blend_rounds_and_saturates() {
        let a = solid(1, 1, [100, 255, 0]);
        let b = solid(1, 1, [201, 255, 1]);
        let out = blend(&a, 0.5, &b, 0.5, 0.0).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([151, 255, 1]));
        let out = blend(&a, 1.0, &b, 1.0, 0.0).unwrap();
        assert_eq!(out.get_pixel(0, 0)[1], 255);
    }

    #[test]
    fn test_scale_quarter() {
        let img = solid(1920, 1080, [1, 2, 3]);
        let small = scale(&img, 0.25).unwrap();
        assert_eq!(small.dimensions(), (480, 270));
        assert_eq!(small.get_pixel(10, 10), &Rgb([1, 2, 3]));
        assert!(scale(&img, 0.0).is_err());
    }

    #[test]
    fn test_view_file_name() {
        assert_eq!(
            view_file_name("Rectified Left with Lines"),
            "rectified_left_with_lines.png"
        );
    }

    #[test]
    fn test_save_and_load_view() {
        let dir = tempfile::tempdir().unwrap();
        let img = solid(3, 2, [9, 8, 7]);
        let path = save_view(dir.path(), "Blended Overlay", &img).unwrap();
        assert_eq!(path, dir.path().join("blended_overlay.png"));
        assert_eq!(load_image(&path).unwrap(), img);
    }

    #[test]
    fn test_load_missing_image() {
        assert!(matches!(
            load_image("samples/no_such_image.png"),
            Err(ImagingError::LoadError { .. })
        ));
    }
}
