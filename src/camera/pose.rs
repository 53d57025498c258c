//! Extrinsic camera pose: the rigid transform taking world coordinates into the
//! camera frame, `P_cam = R·P_world + t`.

use crate::camera::CameraModelError;
use crate::geometry::transform::{euler_rotation, Transform3};
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that a matrix is a proper rotation.
const ROTATION_TOLERANCE: f64 = 1e-6;

/// World-to-camera rigid transform.
///
/// Serialized as a Rodrigues rotation vector plus translation, the same pair a
/// calibration solver reports per view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "PoseRecord", into = "PoseRecord")]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

#[derive(Serialize, Deserialize)]
struct PoseRecord {
    rvec: [f64; 3],
    tvec: [f64; 3],
}

impl From<PoseRecord> for Pose {
    fn from(record: PoseRecord) -> Self {
        Pose::from_rodrigues(&Vector3::from(record.rvec), &Vector3::from(record.tvec))
    }
}

impl From<Pose> for PoseRecord {
    fn from(pose: Pose) -> Self {
        let rvec = pose.rodrigues();
        PoseRecord {
            rvec: [rvec.x, rvec.y, rvec.z],
            tvec: [pose.translation.x, pose.translation.y, pose.translation.z],
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::identity()
    }
}

impl Pose {
    /// Builds a pose from a rotation matrix and a translation.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::DegenerateGeometry`] if `rotation` is not
    ///   orthonormal with determinant `+1`.
    pub fn new(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Result<Self, CameraModelError> {
        let orthogonality = (rotation * rotation.transpose() - Matrix3::identity()).amax();
        if orthogonality > ROTATION_TOLERANCE {
            return Err(CameraModelError::DegenerateGeometry(format!(
                "rotation is not orthonormal (max |R·Rᵀ - I| = {orthogonality:e})"
            )));
        }
        let det = rotation.determinant();
        if (det - 1.0).abs() > ROTATION_TOLERANCE {
            return Err(CameraModelError::DegenerateGeometry(format!(
                "rotation determinant is {det}, expected +1"
            )));
        }
        Ok(Pose {
            rotation: Rotation3::from_matrix_unchecked(*rotation),
            translation: *translation,
        })
    }

    /// Camera frame coincides with the world frame (`R = I`, `t = 0`).
    pub fn identity() -> Self {
        Pose {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Pure translation, `R = I`.
    pub fn from_translation(translation: &Vector3<f64>) -> Self {
        Pose {
            rotation: Rotation3::identity(),
            translation: *translation,
        }
    }

    /// Rotation `Rz·Ry·Rx` from Euler angles in degrees.
    pub fn from_euler_degrees(rotation_deg: &[f64; 3], translation: &Vector3<f64>) -> Self {
        Pose {
            rotation: euler_rotation(
                rotation_deg[0].to_radians(),
                rotation_deg[1].to_radians(),
                rotation_deg[2].to_radians(),
            ),
            translation: *translation,
        }
    }

    /// Rotation from a Rodrigues vector (axis scaled by angle in radians).
    pub fn from_rodrigues(rvec: &Vector3<f64>, translation: &Vector3<f64>) -> Self {
        Pose {
            rotation: Rotation3::from_scaled_axis(*rvec),
            translation: *translation,
        }
    }

    /// Rodrigues rotation vector of this pose.
    pub fn rodrigues(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    /// `R·p + t`.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Camera-to-world pose, `(Rᵀ, -Rᵀ·t)`.
    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    /// Camera center in world coordinates.
    pub fn camera_center(&self) -> Vector3<f64> {
        self.inverse().translation
    }

    pub fn to_transform(&self) -> Transform3 {
        Transform3::from_parts(self.rotation.matrix(), &self.translation)
    }
}
