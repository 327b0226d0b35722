//! Per-pixel lookup tables and bilinear resampling.

use super::ImagingError;
use image::{Rgb, RgbImage};

/// For every destination pixel, the source coordinate it samples from.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapTable {
    pub width: u32,
    pub height: u32,
    pub map_x: Vec<f32>,
    pub map_y: Vec<f32>,
}

impl RemapTable {
    pub fn new(
        width: u32,
        height: u32,
        map_x: Vec<f32>,
        map_y: Vec<f32>,
    ) -> Result<Self, ImagingError> {
        let size = width as usize * height as usize;
        if map_x.len() != size || map_y.len() != size {
            return Err(ImagingError::InvalidParams(format!(
                "remap table for {width}x{height} needs {size} entries, got {} and {}",
                map_x.len(),
                map_y.len()
            )));
        }
        Ok(RemapTable {
            width,
            height,
            map_x,
            map_y,
        })
    }

    /// The table that samples every pixel from itself.
    pub fn identity(width: u32, height: u32) -> Self {
        let mut map_x = Vec::with_capacity(width as usize * height as usize);
        let mut map_y = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                map_x.push(x as f32);
                map_y.push(y as f32);
            }
        }
        RemapTable {
            width,
            height,
            map_x,
            map_y,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> (f32, f32) {
        let idx = (y * self.width + x) as usize;
        (self.map_x[idx], self.map_y[idx])
    }
}

/// Resamples `src` through `table` with bilinear interpolation.
///
/// Neighbours that fall outside the source contribute black, so regions
/// without a source pixel come out black.
pub fn remap(src: &RgbImage, table: &RemapTable) -> RgbImage {
    let mut dst = RgbImage::new(table.width, table.height);

    for y in 0..table.height {
        for x in 0..table.width {
            let (sx, sy) = table.get(x, y);
            dst.put_pixel(x, y, bilinear_interpolate(src, sx, sy));
        }
    }

    dst
}

fn bilinear_interpolate(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    if !x.is_finite() || !y.is_finite() {
        return Rgb([0, 0, 0]);
    }
    let (width, height) = (img.width() as i64, img.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    if x0 < -1 || y0 < -1 || x0 >= width || y0 >= height {
        return Rgb([0, 0, 0]);
    }

    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let sample = |px: i64, py: i64| -> [f32; 3] {
        if px < 0 || py < 0 || px >= width || py >= height {
            return [0.0; 3];
        }
        let p = img.get_pixel(px as u32, py as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32]
    };

    let i00 = sample(x0, y0);
    let i10 = sample(x0 + 1, y0);
    let i01 = sample(x0, y0 + 1);
    let i11 = sample(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let value = i00[c] * (1.0 - dx) * (1.0 - dy)
            + i10[c] * dx * (1.0 - dy)
            + i01[c] * (1.0 - dx) * dy
            + i11[c] * dx * dy;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 10) as u8, (y * 10) as u8, 128])
        })
    }

    #[test]
    fn test_identity_table_reproduces_image() {
        let img = gradient(7, 5);
        let out = remap(&img, &RemapTable::identity(7, 5));
        assert_eq!(out, img);
    }

    #[test]
    fn test_half_pixel_interpolates() {
        let img = gradient(4, 4);
        let table = RemapTable::new(1, 1, vec![1.5], vec![2.5]).unwrap();
        let out = remap(&img, &table);
        assert_eq!(out.get_pixel(0, 0), &Rgb([15, 25, 128]));
    }

    #[test]
    fn test_outside_source_is_black() {
        let img = gradient(4, 4);
        let table = RemapTable::new(2, 1, vec![-5.0, 100.0], vec![0.0, 0.0]).unwrap();
        let out = remap(&img, &table);
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_table_size_is_checked() {
        assert!(RemapTable::new(2, 2, vec![0.0; 3], vec![0.0; 4]).is_err());
    }
}
