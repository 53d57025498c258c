//! World-to-pixel projection and the algebraic inverse used for validation.
//!
//! The forward pipeline for each world point `P` is:
//!
//! 1. `P_cam = R·P + t` ([`Pose::transform_point`]).
//! 2. Depth check on `Z_cam`, governed by [`DepthPolicy`].
//! 3. `(x, y) = (X_cam / Z_cam, Y_cam / Z_cam)`.
//! 4. Optional [`Distortion`].
//! 5. `u = fx·x_d + cx`, `v = fy·y_d + cy`.
//!
//! The output is always index-aligned with the input. A focal-length-only
//! camera ([`project_pinhole`]) or a camera-frame-only projection
//! ([`Pose::identity`]) are parameter choices of the same pipeline.

use crate::camera::{Distortion, Intrinsics, Pose};
use nalgebra::{Matrix2xX, Matrix3xX, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// What to do with points whose camera-frame depth is not positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DepthPolicy {
    /// Replace `Z_cam <= 0` with `min_depth` and project anyway.
    Clamp { min_depth: f64 },
    /// Leave the point out: its slot holds NaN and is flagged
    /// [`DepthStatus::Rejected`].
    Reject,
}

impl Default for DepthPolicy {
    fn default() -> Self {
        DepthPolicy::Clamp { min_depth: 1e-6 }
    }
}

/// Per-point outcome of the depth check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthStatus {
    InFront,
    Clamped,
    Rejected,
}

/// Projected pixels together with the depth status of every input point.
#[derive(Debug, Clone)]
pub struct ProjectedPoints {
    /// 2xN pixel coordinates, column `i` belongs to input point `i`.
    pub points: Matrix2xX<f64>,
    pub status: Vec<DepthStatus>,
}

impl ProjectedPoints {
    pub fn len(&self) -> usize {
        self.status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
    }

    /// True when every input point was in front of the camera.
    pub fn all_in_front(&self) -> bool {
        self.status.iter().all(|s| *s == DepthStatus::InFront)
    }

    /// Indices of points that were clamped or rejected.
    pub fn non_projectable(&self) -> Vec<usize> {
        self.status
            .iter()
            .enumerate()
            .filter(|(_, s)| **s != DepthStatus::InFront)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Projects a single world point.
pub fn project_point(
    point: &Vector3<f64>,
    intrinsics: &Intrinsics,
    pose: &Pose,
    distortion: Option<&Distortion>,
    policy: DepthPolicy,
) -> (Vector2<f64>, DepthStatus) {
    let p_cam = pose.transform_point(point);

    let (z, status) = if p_cam.z > 0.0 {
        (p_cam.z, DepthStatus::InFront)
    } else {
        match policy {
            DepthPolicy::Clamp { min_depth } => (min_depth, DepthStatus::Clamped),
            DepthPolicy::Reject => {
                return (Vector2::new(f64::NAN, f64::NAN), DepthStatus::Rejected);
            }
        }
    };

    let normalized = Vector2::new(p_cam.x / z, p_cam.y / z);
    let distorted = match distortion {
        Some(d) => d.distort(&normalized),
        None => normalized,
    };

    (intrinsics.apply(&distorted), status)
}

/// Projects an ordered 3xN set of world points into pixel coordinates.
///
/// # Examples
///
/// ```rust
/// use nalgebra::{Matrix3xX, Vector3};
/// use pinhole_calib::camera::{projection, DepthPolicy, Intrinsics, Pose};
///
/// let intrinsics = Intrinsics::new(900.0, 900.0, 640.0, 480.0);
/// let pose = Pose::from_translation(&Vector3::new(0.0, 0.0, 400.0));
/// let points = Matrix3xX::from_columns(&[Vector3::new(200.0, 0.0, 0.0)]);
///
/// let projected =
///     projection::project_points(&points, &intrinsics, &pose, None, DepthPolicy::default());
/// assert!((projected.points[(0, 0)] - 1090.0).abs() < 1e-9);
/// assert!((projected.points[(1, 0)] - 480.0).abs() < 1e-9);
/// ```
pub fn project_points(
    points: &Matrix3xX<f64>,
    intrinsics: &Intrinsics,
    pose: &Pose,
    distortion: Option<&Distortion>,
    policy: DepthPolicy,
) -> ProjectedPoints {
    let mut projected = Matrix2xX::zeros(points.ncols());
    let mut status = Vec::with_capacity(points.ncols());

    for (i, column) in points.column_iter().enumerate() {
        let (pixel, point_status) =
            project_point(&column.into_owned(), intrinsics, pose, distortion, policy);
        projected.set_column(i, &pixel);
        status.push(point_status);
    }

    ProjectedPoints {
        points: projected,
        status,
    }
}

/// Focal-length-only projection of camera-frame points: `x' = f·X/Z`,
/// `y' = f·Y/Z`, with depths clamped to `1e-6`.
pub fn project_pinhole(points: &Matrix3xX<f64>, focal_length: f64) -> Matrix2xX<f64> {
    project_points(
        points,
        &Intrinsics::focal_only(focal_length),
        &Pose::identity(),
        None,
        DepthPolicy::default(),
    )
    .points
}

/// Pixel to normalized camera-plane coordinates (inverse intrinsics only).
pub fn normalize_pixel(intrinsics: &Intrinsics, pixel: &Vector2<f64>) -> Vector2<f64> {
    intrinsics.normalize(pixel)
}

/// Lifts a distortion-free pixel back to the world point at camera depth
/// `depth`, inverting both the intrinsic and extrinsic maps.
pub fn back_project(
    intrinsics: &Intrinsics,
    pose: &Pose,
    pixel: &Vector2<f64>,
    depth: f64,
) -> Vector3<f64> {
    let normalized = intrinsics.normalize(pixel);
    let p_cam = Vector3::new(normalized.x * depth, normalized.y * depth, depth);
    pose.inverse().transform_point(&p_cam)
}

/// Vertices (8) and edges (12) of an axis-aligned cube of side `size`
/// centred on the optical axis at depth `z_offset`.
pub fn cube(size: f64, z_offset: f64) -> (Matrix3xX<f64>, Vec<(usize, usize)>) {
    let s = size / 2.0;
    let vertices = Matrix3xX::from_columns(&[
        Vector3::new(-s, -s, z_offset - s),
        Vector3::new(s, -s, z_offset - s),
        Vector3::new(s, s, z_offset - s),
        Vector3::new(-s, s, z_offset - s),
        Vector3::new(-s, -s, z_offset + s),
        Vector3::new(s, -s, z_offset + s),
        Vector3::new(s, s, z_offset + s),
        Vector3::new(-s, s, z_offset + s),
    ]);
    let edges = vec![
        (0, 1),
        (1, 2),
        (2, 3),
        (3, 0),
        (4, 5),
        (5, 6),
        (6, 7),
        (7, 4),
        (0, 4),
        (1, 5),
        (2, 6),
        (3, 7),
    ];
    (vertices, edges)
}
