//! Forward radial-tangential lens distortion.
//!
//! The model acts on normalized camera-plane coordinates `(x, y) = (X/Z, Y/Z)`
//! before the intrinsic matrix is applied. With `r2 = x² + y²`:
//!
//! ```text
//! x_d = x·(1 + k1·r2 + k2·r2² + k3·r2³) + 2·p1·x·y + p2·(r2 + 2x²)
//! y_d = y·(1 + k1·r2 + k2·r2² + k3·r2³) + p1·(r2 + 2y²) + 2·p2·x·y
//! ```
//!
//! Only the forward direction lives here. Removing distortion from an image is
//! the job of an [`Undistorter`](crate::calibration::Undistorter).

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Radial (`k1`, `k2`, `k3`) and tangential (`p1`, `p2`) coefficients.
///
/// Serialized as the ordered array `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 5]", into = "[f64; 5]")]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn new(k1: f64, k2: f64, p1: f64, p2: f64, k3: f64) -> Self {
        Distortion { k1, k2, p1, p2, k3 }
    }

    pub fn zero() -> Self {
        Distortion::default()
    }

    /// Radial-only distortion `(k1, k2, 0, 0, 0)`.
    pub fn radial(k1: f64, k2: f64) -> Self {
        Distortion::new(k1, k2, 0.0, 0.0, 0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.as_array().iter().all(|c| *c == 0.0)
    }

    pub fn as_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_array(coefficients: [f64; 5]) -> Self {
        let [k1, k2, p1, p2, k3] = coefficients;
        Distortion { k1, k2, p1, p2, k3 }
    }

    /// Applies the distortion polynomial to a normalized point.
    pub fn distort(&self, normalized: &Vector2<f64>) -> Vector2<f64> {
        let x = normalized.x;
        let y = normalized.y;

        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let x_distorted = x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_distorted = y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        Vector2::new(x_distorted, y_distorted)
    }
}

impl From<[f64; 5]> for Distortion {
    fn from(coefficients: [f64; 5]) -> Self {
        Distortion::from_array(coefficients)
    }
}

impl From<Distortion> for [f64; 5] {
    fn from(distortion: Distortion) -> Self {
        distortion.as_array()
    }
}
