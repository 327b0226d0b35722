//! Checkerboard calibration target.

use nalgebra::Matrix3xX;
use serde::{Deserialize, Serialize};

/// Number of inner corners along each axis of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSize {
    pub columns: u32,
    pub rows: u32,
}

impl PatternSize {
    pub fn new(columns: u32, rows: u32) -> Self {
        PatternSize { columns, rows }
    }

    pub fn corner_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkerboard {
    pub size: PatternSize,
    /// Edge length of one square, in the unit of the calibrated translation.
    pub square_size: f64,
}

impl Checkerboard {
    pub fn new(size: PatternSize, square_size: f64) -> Self {
        Checkerboard { size, square_size }
    }

    /// Board-frame coordinates of the inner corners.
    ///
    /// Corners are enumerated row by row, `(x * s, y * s, 0)`, which is the
    /// order the corner detector reports them in.
    pub fn object_points(&self) -> Matrix3xX<f64> {
        let columns = self.size.columns as usize;
        Matrix3xX::from_fn(self.size.corner_count(), |row, i| match row {
            0 => (i % columns) as f64 * self.square_size,
            1 => (i / columns) as f64 * self.square_size,
            _ => 0.0,
        })
    }
}
