//! Planar chessboard geometry.

use crate::camera::CameraModelError;
use nalgebra::{Matrix3xX, Vector3};
use serde::{Deserialize, Serialize};

/// Interior-corner layout of a chessboard target.
///
/// `cols` and `rows` count interior corners, so the board has
/// `(cols + 1) × (rows + 1)` squares. `square_size` is in world units
/// (millimetres throughout this crate).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub cols: usize,
    pub rows: usize,
    pub square_size: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            cols: 9,
            rows: 6,
            square_size: 25.0,
        }
    }
}

impl PatternConfig {
    pub fn new(cols: usize, rows: usize, square_size: f64) -> Self {
        PatternConfig {
            cols,
            rows,
            square_size,
        }
    }

    pub fn corner_count(&self) -> usize {
        self.cols * self.rows
    }

    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] if the board has fewer than two
    ///   corners per side or a non-positive square size.
    pub fn validate(&self) -> Result<(), CameraModelError> {
        if self.cols < 2 || self.rows < 2 {
            return Err(CameraModelError::InvalidParams(format!(
                "Pattern needs at least 2x2 interior corners, got {}x{}",
                self.cols, self.rows
            )));
        }
        if !(self.square_size > 0.0) || !self.square_size.is_finite() {
            return Err(CameraModelError::InvalidParams(format!(
                "Square size must be positive, got {}",
                self.square_size
            )));
        }
        Ok(())
    }

    /// Object points on the `Z = 0` plane in row-major order: column
    /// `row·cols + col` holds `(col·size, row·size, 0)`.
    ///
    /// This is the same order a corner detector reports its corners in.
    pub fn object_points(&self) -> Matrix3xX<f64> {
        let mut points = Matrix3xX::zeros(self.corner_count());
        for row in 0..self.rows {
            for col in 0..self.cols {
                points.set_column(
                    row * self.cols + col,
                    &Vector3::new(
                        col as f64 * self.square_size,
                        row as f64 * self.square_size,
                        0.0,
                    ),
                );
            }
        }
        points
    }
}
