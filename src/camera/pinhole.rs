//! Implements the distortion-free pinhole camera model.
//!
//! This module provides the [`PinholeModel`] struct, the simplest
//! [`CameraModel`]: perspective division followed by the intrinsic matrix.

use crate::camera::{
    projection, validation, yaml, CameraModel, CameraModelError, DepthPolicy, DepthStatus,
    Intrinsics, Pose, Resolution,
};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Represents a Pinhole camera model.
///
/// # Examples
///
/// ```rust
/// use nalgebra::Vector3;
/// use pinhole_calib::camera::{CameraModel, Intrinsics, PinholeModel, Resolution};
///
/// let model = PinholeModel::new(
///     Intrinsics::new(500.0, 500.0, 320.0, 240.0),
///     Resolution::new(640, 480),
/// )
/// .unwrap();
///
/// let pixel = model.project(&Vector3::new(0.1, 0.2, 1.0)).unwrap();
/// assert!((pixel.x - 370.0).abs() < 1e-9);
/// assert!((pixel.y - 340.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinholeModel {
    /// The intrinsic parameters of the camera, [`Intrinsics`] (fx, fy, cx, cy).
    pub intrinsics: Intrinsics,
    /// The resolution of the camera image, [`Resolution`] (width, height).
    pub resolution: Resolution,
}

impl PinholeModel {
    /// # Errors
    ///
    /// * [`CameraModelError::FocalLengthMustBePositive`]
    /// * [`CameraModelError::PrincipalPointMustBeFinite`]
    pub fn new(intrinsics: Intrinsics, resolution: Resolution) -> Result<Self, CameraModelError> {
        let model = PinholeModel {
            intrinsics,
            resolution,
        };
        model.validate_params()?;
        Ok(model)
    }
}

impl CameraModel for PinholeModel {
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        let (pixel, status) = projection::project_point(
            point_3d,
            &self.intrinsics,
            &Pose::identity(),
            None,
            DepthPolicy::Reject,
        );
        if status != DepthStatus::InFront {
            return Err(CameraModelError::PointAtCameraCenter);
        }
        if !self.resolution.contains(&pixel, 0.0) {
            return Err(CameraModelError::ProjectionOutSideImage);
        }
        Ok(pixel)
    }

    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let cam0 = yaml::load_cam0(path)?;
        let model = PinholeModel {
            intrinsics: yaml::parse_intrinsics(&cam0)?,
            resolution: yaml::parse_resolution(&cam0)?,
        };
        model.validate_params()?;
        Ok(model)
    }

    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        yaml::save_cam0(path, "pinhole", &self.intrinsics, &self.resolution, None)
    }

    fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)
    }

    fn get_resolution(&self) -> Resolution {
        self.resolution
    }

    fn get_intrinsics(&self) -> Intrinsics {
        self.intrinsics
    }

    fn get_distortion(&self) -> Vec<f64> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn get_sample_model() -> PinholeModel {
        PinholeModel::new(
            Intrinsics::new(461.629, 460.152, 362.680, 246.049),
            Resolution::new(752, 480),
        )
        .unwrap()
    }

    #[test]
    fn test_pinhole_project_unproject() {
        let model = get_sample_model();
        let point_3d = Vector3::new(0.5, -0.3, 2.0);

        let point_2d = model.project(&point_3d).unwrap();
        let normalized = model.normalize(&point_2d);

        assert!((normalized.x - 0.25).abs() < 1e-12);
        assert!((normalized.y + 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_pinhole_rejects_points_behind_camera() {
        let model = get_sample_model();
        assert!(matches!(
            model.project(&Vector3::new(0.0, 0.0, -1.0)),
            Err(CameraModelError::PointAtCameraCenter)
        ));
        assert!(matches!(
            model.project(&Vector3::new(0.0, 0.0, 0.0)),
            Err(CameraModelError::PointAtCameraCenter)
        ));
    }

    #[test]
    fn test_pinhole_projection_outside_image() {
        let model = get_sample_model();
        assert!(matches!(
            model.project(&Vector3::new(5.0, 0.0, 1.0)),
            Err(CameraModelError::ProjectionOutSideImage)
        ));
    }

    #[test]
    fn test_pinhole_yaml_round_trip() {
        fs::create_dir_all("output").expect("Failed to create output directory for test.");
        let output_path = "output/pinhole_saved.yaml";

        let model = get_sample_model();
        model.save_to_yaml(output_path).unwrap();
        let loaded = PinholeModel::load_from_yaml(output_path).unwrap();
        assert_eq!(model, loaded);
        assert!(loaded.get_distortion().is_empty());

        fs::remove_file(output_path).unwrap();
    }

    #[test]
    fn test_pinhole_invalid_focal_length() {
        assert!(matches!(
            PinholeModel::new(
                Intrinsics::new(-1.0, 500.0, 320.0, 240.0),
                Resolution::new(640, 480)
            ),
            Err(CameraModelError::FocalLengthMustBePositive)
        ));
    }
}
