//! Homogeneous transforms in 2-D (3x3) and 3-D (4x4).
//!
//! Transforms act on homogeneous column vectors, so composition reads right to
//! left: `a.compose(&b)` is the matrix product `A·B`, and applying it to a point
//! runs `B` first and `A` second. Composition is **not** commutative.
//!
//! ```rust
//! use nalgebra::Vector2;
//! use pinhole_calib::geometry::Transform2;
//!
//! let rotate = Transform2::rotation(std::f64::consts::FRAC_PI_2);
//! let shift = Transform2::translation(2.0, 0.0);
//!
//! // Translate first, then rotate.
//! let p = rotate.compose(&shift).apply_point(&Vector2::new(1.0, 0.0));
//! assert!((p - Vector2::new(0.0, 3.0)).norm() < 1e-12);
//!
//! // Rotate first, then translate.
//! let q = shift.compose(&rotate).apply_point(&Vector2::new(1.0, 0.0));
//! assert!((q - Vector2::new(2.0, 1.0)).norm() < 1e-12);
//! ```

use crate::camera::CameraModelError;
use nalgebra::{Matrix2, Matrix3, Matrix4, Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Determinant magnitude below which a transform is treated as singular.
pub const SINGULAR_EPSILON: f64 = 1e-12;

/// Coordinate axis for 3-D rotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// 2-D mirror. `X` mirrors across the x axis (negates y), `Y` across the y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reflection2 {
    X,
    Y,
}

/// 3-D mirror naming the coordinates that get negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reflection3 {
    X,
    Y,
    Z,
    XY,
    XZ,
    YZ,
}

/// Right-handed rotation about a coordinate axis, angle in radians.
pub fn axis_rotation(axis: Axis, angle: f64) -> Rotation3<f64> {
    let (s, c) = angle.sin_cos();
    let m = match axis {
        Axis::X => Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, c, -s, //
            0.0, s, c,
        ),
        Axis::Y => Matrix3::new(
            c, 0.0, s, //
            0.0, 1.0, 0.0, //
            -s, 0.0, c,
        ),
        Axis::Z => Matrix3::new(
            c, -s, 0.0, //
            s, c, 0.0, //
            0.0, 0.0, 1.0,
        ),
    };
    Rotation3::from_matrix_unchecked(m)
}

/// `Rz(rz)·Ry(ry)·Rx(rx)`; `Rx` is applied first.
pub fn euler_rotation(rx: f64, ry: f64, rz: f64) -> Rotation3<f64> {
    axis_rotation(Axis::Z, rz) * axis_rotation(Axis::Y, ry) * axis_rotation(Axis::X, rx)
}

fn check_invertible(det: f64) -> Result<(), CameraModelError> {
    if det.abs() < SINGULAR_EPSILON || !det.is_finite() {
        return Err(CameraModelError::DegenerateGeometry(format!(
            "transform is singular (determinant {det:e})"
        )));
    }
    Ok(())
}

/// Affine map of the plane as a 3x3 homogeneous matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform2 {
    matrix: Matrix3<f64>,
}

impl Default for Transform2 {
    fn default() -> Self {
        Transform2::identity()
    }
}

impl Transform2 {
    pub fn identity() -> Self {
        Transform2 {
            matrix: Matrix3::identity(),
        }
    }

    /// Wraps a 3x3 matrix.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] if the bottom row is not `(0, 0, 1)`.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Result<Self, CameraModelError> {
        if matrix[(2, 0)] != 0.0 || matrix[(2, 1)] != 0.0 || matrix[(2, 2)] != 1.0 {
            return Err(CameraModelError::InvalidParams(
                "homogeneous 2-D transform must end with row (0, 0, 1)".to_string(),
            ));
        }
        Ok(Transform2 { matrix })
    }

    fn from_linear(linear: Matrix2<f64>, offset: Vector2<f64>) -> Self {
        let mut matrix = Matrix3::identity();
        matrix.fixed_view_mut::<2, 2>(0, 0).copy_from(&linear);
        matrix.fixed_view_mut::<2, 1>(0, 2).copy_from(&offset);
        Transform2 { matrix }
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Transform2::from_linear(Matrix2::identity(), Vector2::new(dx, dy))
    }

    /// Counter-clockwise rotation about the origin, angle in radians.
    pub fn rotation(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Transform2::from_linear(Matrix2::new(c, -s, s, c), Vector2::zeros())
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Transform2::from_linear(Matrix2::new(sx, 0.0, 0.0, sy), Vector2::zeros())
    }

    pub fn reflection(axis: Reflection2) -> Self {
        match axis {
            Reflection2::X => Transform2::scale(1.0, -1.0),
            Reflection2::Y => Transform2::scale(-1.0, 1.0),
        }
    }

    /// `self · other`: `other` is applied first.
    pub fn compose(&self, other: &Transform2) -> Transform2 {
        Transform2 {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Product of `steps` in the order given, so the last step acts first.
    pub fn compose_all<'a, I>(steps: I) -> Transform2
    where
        I: IntoIterator<Item = &'a Transform2>,
    {
        steps
            .into_iter()
            .fold(Transform2::identity(), |acc, step| acc.compose(step))
    }

    /// # Errors
    ///
    /// * [`CameraModelError::DegenerateGeometry`] if the determinant is within
    ///   [`SINGULAR_EPSILON`] of zero.
    pub fn invert(&self) -> Result<Transform2, CameraModelError> {
        check_invertible(self.matrix.determinant())?;
        let inverse = self.matrix.try_inverse().ok_or_else(|| {
            CameraModelError::DegenerateGeometry("matrix inversion failed".to_string())
        })?;
        Ok(Transform2 { matrix: inverse })
    }

    pub fn apply_point(&self, point: &Vector2<f64>) -> Vector2<f64> {
        let h = self.matrix * point.push(1.0);
        Vector2::new(h.x, h.y)
    }

    /// Applies only the linear part; directions ignore translation.
    pub fn apply_vector(&self, vector: &Vector2<f64>) -> Vector2<f64> {
        self.matrix.fixed_view::<2, 2>(0, 0) * vector
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    pub fn approx_eq(&self, other: &Transform2, tolerance: f64) -> bool {
        (self.matrix - other.matrix).amax() <= tolerance
    }

    /// Joint positions of a planar serial arm.
    ///
    /// Each joint contributes `Rot(θi)·Trans(Li, 0)` to the running product; the
    /// returned list starts with the base at the origin and ends with the
    /// end effector.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] if the two slices differ in length.
    pub fn forward_kinematics(
        joint_angles: &[f64],
        link_lengths: &[f64],
    ) -> Result<Vec<Vector2<f64>>, CameraModelError> {
        if joint_angles.len() != link_lengths.len() {
            return Err(CameraModelError::InvalidParams(format!(
                "{} joint angles for {} links",
                joint_angles.len(),
                link_lengths.len()
            )));
        }
        let mut current = Transform2::identity();
        let mut positions = vec![Vector2::zeros()];
        for (angle, length) in joint_angles.iter().zip(link_lengths) {
            current = current
                .compose(&Transform2::rotation(*angle))
                .compose(&Transform2::translation(*length, 0.0));
            positions.push(current.apply_point(&Vector2::zeros()));
        }
        Ok(positions)
    }
}

/// Affine map of space as a 4x4 homogeneous matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3 {
    matrix: Matrix4<f64>,
}

impl Default for Transform3 {
    fn default() -> Self {
        Transform3::identity()
    }
}

impl Transform3 {
    pub fn identity() -> Self {
        Transform3 {
            matrix: Matrix4::identity(),
        }
    }

    /// Wraps a 4x4 matrix.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] if the bottom row is not `(0, 0, 0, 1)`.
    pub fn from_matrix(matrix: Matrix4<f64>) -> Result<Self, CameraModelError> {
        let bottom = matrix.fixed_view::<1, 4>(3, 0);
        if bottom[0] != 0.0 || bottom[1] != 0.0 || bottom[2] != 0.0 || bottom[3] != 1.0 {
            return Err(CameraModelError::InvalidParams(
                "homogeneous 3-D transform must end with row (0, 0, 0, 1)".to_string(),
            ));
        }
        Ok(Transform3 { matrix })
    }

    /// `[linear | offset]` with the homogeneous bottom row.
    pub fn from_parts(linear: &Matrix3<f64>, offset: &Vector3<f64>) -> Self {
        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(linear);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(offset);
        Transform3 { matrix }
    }

    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Transform3::from_parts(&Matrix3::identity(), &Vector3::new(dx, dy, dz))
    }

    /// Right-handed rotation about `axis`, angle in radians.
    pub fn rotation(axis: Axis, angle: f64) -> Self {
        Transform3::from_parts(axis_rotation(axis, angle).matrix(), &Vector3::zeros())
    }

    /// `Rz·Ry·Rx`, applying the X rotation first.
    pub fn euler(rx: f64, ry: f64, rz: f64) -> Self {
        Transform3::from_parts(euler_rotation(rx, ry, rz).matrix(), &Vector3::zeros())
    }

    pub fn scale(sx: f64, sy: f64, sz: f64) -> Self {
        Transform3::from_parts(
            &Matrix3::from_diagonal(&Vector3::new(sx, sy, sz)),
            &Vector3::zeros(),
        )
    }

    pub fn reflection(axis: Reflection3) -> Self {
        match axis {
            Reflection3::X => Transform3::scale(-1.0, 1.0, 1.0),
            Reflection3::Y => Transform3::scale(1.0, -1.0, 1.0),
            Reflection3::Z => Transform3::scale(1.0, 1.0, -1.0),
            Reflection3::XY => Transform3::scale(-1.0, -1.0, 1.0),
            Reflection3::XZ => Transform3::scale(-1.0, 1.0, -1.0),
            Reflection3::YZ => Transform3::scale(1.0, -1.0, -1.0),
        }
    }

    /// `T·Rz·Ry·Rx·S`: scale first, then rotate, then translate.
    pub fn trs(translation: &Vector3<f64>, euler_xyz: &Vector3<f64>, scale: &Vector3<f64>) -> Self {
        Transform3::compose_all(&[
            Transform3::translation(translation.x, translation.y, translation.z),
            Transform3::euler(euler_xyz.x, euler_xyz.y, euler_xyz.z),
            Transform3::scale(scale.x, scale.y, scale.z),
        ])
    }

    /// Frame-to-world transform whose columns are the frame axes and origin.
    pub fn from_frame_axes(
        origin: &Vector3<f64>,
        x_axis: &Vector3<f64>,
        y_axis: &Vector3<f64>,
        z_axis: &Vector3<f64>,
    ) -> Self {
        Transform3::from_parts(&Matrix3::from_columns(&[*x_axis, *y_axis, *z_axis]), origin)
    }

    /// World-to-frame transform for a frame with orientation `r_frame` (columns
    /// are the frame axes in world coordinates) placed at `origin`.
    ///
    /// This is the affine inverse of the frame-to-world pose: rotation
    /// `r_frameᵀ` and translation `-r_frameᵀ·origin`.
    pub fn change_of_basis(r_frame: &Matrix3<f64>, origin: &Vector3<f64>) -> Self {
        let r_t = r_frame.transpose();
        Transform3::from_parts(&r_t, &(-(r_t * origin)))
    }

    /// `self · other`: `other` is applied first.
    pub fn compose(&self, other: &Transform3) -> Transform3 {
        Transform3 {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Product of `steps` in the order given, so the last step acts first.
    pub fn compose_all<'a, I>(steps: I) -> Transform3
    where
        I: IntoIterator<Item = &'a Transform3>,
    {
        steps
            .into_iter()
            .fold(Transform3::identity(), |acc, step| acc.compose(step))
    }

    /// # Errors
    ///
    /// * [`CameraModelError::DegenerateGeometry`] if the determinant is within
    ///   [`SINGULAR_EPSILON`] of zero.
    pub fn invert(&self) -> Result<Transform3, CameraModelError> {
        check_invertible(self.matrix.determinant())?;
        let inverse = self.matrix.try_inverse().ok_or_else(|| {
            CameraModelError::DegenerateGeometry("matrix inversion failed".to_string())
        })?;
        Ok(Transform3 { matrix: inverse })
    }

    pub fn apply_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        let h = self.matrix * point.push(1.0);
        Vector3::new(h.x, h.y, h.z)
    }

    /// Applies only the linear part; directions ignore translation.
    pub fn apply_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation_part() * vector
    }

    /// Upper-left 3x3 block: rotation combined with any scale or reflection.
    pub fn rotation_part(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation_part(&self) -> Vector3<f64> {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    pub fn approx_eq(&self, other: &Transform3, tolerance: f64) -> bool {
        (self.matrix - other.matrix).amax() <= tolerance
    }
}
