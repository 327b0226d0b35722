//! Overlay drawing on RGB images.

use crate::pattern::PatternSize;
use image::{Rgb, RgbImage};
use nalgebra::Matrix2xX;

/// Row colours cycled by [`draw_chessboard_corners`].
const ROW_COLORS: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 200, 255]),
    Rgb([0, 0, 255]),
];

const CORNER_RADIUS: i32 = 4;

/// Draws a horizontal line `thickness` pixels tall, starting at row `y`.
pub fn draw_horizontal_line(img: &mut RgbImage, y: u32, thickness: u32, color: Rgb<u8>) {
    let (width, height) = img.dimensions();
    for row in y..y.saturating_add(thickness).min(height) {
        for x in 0..width {
            img.put_pixel(x, row, color);
        }
    }
}

/// Draws one-pixel horizontal lines every `spacing` rows, starting at row 0.
pub fn draw_guide_lines(img: &mut RgbImage, spacing: u32, color: Rgb<u8>) {
    if spacing == 0 {
        return;
    }
    for y in (0..img.height()).step_by(spacing as usize) {
        draw_horizontal_line(img, y, 1, color);
    }
}

fn draw_circle(img: &mut RgbImage, center_x: i32, center_y: i32, radius: i32, color: Rgb<u8>) {
    let (width, height) = (img.width() as i32, img.height() as i32);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                let x = center_x + dx;
                let y = center_y + dy;

                if x >= 0 && x < width && y >= 0 && y < height {
                    img.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}

fn draw_segment(img: &mut RgbImage, from: (i32, i32), to: (i32, i32), color: Rgb<u8>) {
    let (width, height) = (img.width() as i32, img.height() as i32);
    let (mut x, mut y) = from;
    let dx = (to.0 - from.0).abs();
    let dy = -(to.1 - from.1).abs();
    let sx = if from.0 < to.0 { 1 } else { -1 };
    let sy = if from.1 < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x >= 0 && x < width && y >= 0 && y < height {
            img.put_pixel(x as u32, y as u32, color);
        }
        if (x, y) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Marks detected corners, one colour per board row, joined in detection order.
///
/// Corners must be row-major as returned by the detector; any trailing
/// corners beyond `pattern.corner_count()` are ignored.
pub fn draw_chessboard_corners(img: &mut RgbImage, pattern: PatternSize, corners: &Matrix2xX<f64>) {
    let columns = pattern.columns.max(1) as usize;
    let count = corners.ncols().min(pattern.corner_count());
    let pixel = |i: usize| {
        (
            corners[(0, i)].round() as i32,
            corners[(1, i)].round() as i32,
        )
    };

    for i in 0..count {
        let color = ROW_COLORS[(i / columns) % ROW_COLORS.len()];
        if i > 0 {
            draw_segment(img, pixel(i - 1), pixel(i), color);
        }
        let (x, y) = pixel(i);
        draw_circle(img, x, y, CORNER_RADIUS, color);
    }
}
