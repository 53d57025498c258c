//! The `camera` module holds the pinhole camera model and everything needed to
//! map world geometry onto the image plane.
//!
//! It provides:
//! - [`Intrinsics`] and [`Resolution`], the parameters shared by every model.
//! - [`Distortion`], the forward radial-tangential lens model.
//! - [`Pose`], the extrinsic world-to-camera rigid transform.
//! - [`projection`], the full world-to-pixel pipeline and its inverse path.
//! - The [`CameraModel`] trait with the [`PinholeModel`] and [`RadTanModel`]
//!   implementations.

use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub mod distortion;
pub mod pinhole;
pub mod pose;
pub mod projection;
pub mod rad_tan;

pub use distortion::Distortion;
pub use pinhole::PinholeModel;
pub use pose::Pose;
pub use projection::{DepthPolicy, DepthStatus, ProjectedPoints};
pub use rad_tan::RadTanModel;

/// Focal lengths and principal point, in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Intrinsics { fx, fy, cx, cy }
    }

    /// `K = diag(f, f, 1)` with the principal point at the origin.
    ///
    /// This is the focal-length-only camera `x' = f·X/Z`.
    pub fn focal_only(focal_length: f64) -> Self {
        Intrinsics::new(focal_length, focal_length, 0.0, 0.0)
    }

    /// The 3x3 intrinsic matrix `K`. Its bottom row is always `(0, 0, 1)`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Builds intrinsics from a 3x3 matrix.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] if the bottom row is not exactly
    ///   `(0, 0, 1)`, or if the skew and lower-triangle entries are nonzero.
    pub fn from_matrix(k: &Matrix3<f64>) -> Result<Self, CameraModelError> {
        if k[(2, 0)] != 0.0 || k[(2, 1)] != 0.0 || k[(2, 2)] != 1.0 {
            return Err(CameraModelError::InvalidParams(format!(
                "Intrinsic matrix bottom row must be (0, 0, 1), got ({}, {}, {})",
                k[(2, 0)],
                k[(2, 1)],
                k[(2, 2)]
            )));
        }
        if k[(0, 1)] != 0.0 || k[(1, 0)] != 0.0 {
            return Err(CameraModelError::InvalidParams(
                "Intrinsic matrix must not carry skew".to_string(),
            ));
        }
        let intrinsics = Intrinsics::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)]);
        validation::validate_intrinsics(&intrinsics)?;
        Ok(intrinsics)
    }

    /// Maps normalized camera-plane coordinates to pixels: `u = fx·x + cx`, `v = fy·y + cy`.
    pub fn apply(&self, normalized: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            self.fx * normalized.x + self.cx,
            self.fy * normalized.y + self.cy,
        )
    }

    /// Inverse of [`Intrinsics::apply`].
    pub fn normalize(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            (pixel.x - self.cx) / self.fx,
            (pixel.y - self.cy) / self.fy,
        )
    }
}

/// Image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Resolution { width, height }
    }

    /// Whether `pixel` lies strictly inside the image once `margin` pixels are
    /// removed from every side.
    pub fn contains(&self, pixel: &Vector2<f64>, margin: f64) -> bool {
        pixel.x > margin
            && pixel.x < self.width as f64 - margin
            && pixel.y > margin
            && pixel.y < self.height as f64 - margin
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("Projection is outside the image")]
    ProjectionOutSideImage,
    #[error("z is close to zero, point is at camera center")]
    PointAtCameraCenter,
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("Principal point must be finite")]
    PrincipalPointMustBeFinite,
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("Insufficient data: {found} usable views, at least {required} required")]
    InsufficientData { found: usize, required: usize },
    #[error("Corner detection failed: {0}")]
    DetectionFailure(String),
    #[error("View {view} projects outside the image frame ({outside} corners out of bounds)")]
    OutOfFrame { view: usize, outside: usize },
    #[error("Numerical error in computation: {0}")]
    NumericalError(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraModelError {
    fn from(err: std::io::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for CameraModelError {
    fn from(err: yaml_rust::ScanError) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CameraModelError {
    fn from(err: serde_yaml::Error) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

/// Trait defining the core functionality for camera models.
///
/// Points handed to [`CameraModel::project`] are already expressed in the
/// camera frame. World points go through [`projection::project_points`] with a
/// [`Pose`] first.
pub trait CameraModel {
    /// Projects a camera-frame 3D point to pixel coordinates.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::PointAtCameraCenter`] if the depth is not positive.
    /// * [`CameraModelError::ProjectionOutSideImage`] if the pixel falls outside
    ///   the model's resolution.
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError>;

    /// Maps a pixel to normalized camera-plane coordinates by inverting the
    /// intrinsic matrix only. Lens distortion is not removed.
    fn normalize(&self, point_2d: &Vector2<f64>) -> Vector2<f64> {
        self.get_intrinsics().normalize(point_2d)
    }

    /// Load camera parameters from a Kalibr-style YAML file (`cam0:` block).
    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError>
    where
        Self: Sized;

    /// Save camera parameters to a Kalibr-style YAML file.
    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError>;

    /// Validate camera parameters
    fn validate_params(&self) -> Result<(), CameraModelError>;

    fn get_resolution(&self) -> Resolution;

    fn get_intrinsics(&self) -> Intrinsics;

    /// Distortion coefficients in `[k1, k2, p1, p2, k3]` order, empty for
    /// distortion-free models.
    fn get_distortion(&self) -> Vec<f64>;
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), CameraModelError> {
        if !(intrinsics.fx > 0.0) || !(intrinsics.fy > 0.0) {
            return Err(CameraModelError::FocalLengthMustBePositive);
        }
        if !intrinsics.cx.is_finite() || !intrinsics.cy.is_finite() {
            return Err(CameraModelError::PrincipalPointMustBeFinite);
        }
        Ok(())
    }
}

/// Shared Kalibr-style YAML helpers used by [`PinholeModel`] and [`RadTanModel`].
pub(crate) mod yaml {
    use super::*;
    use std::{fs, io::Write};
    use yaml_rust::{Yaml, YamlLoader};

    pub fn load_cam0(path: &str) -> Result<Yaml, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;
        let doc = docs.into_iter().next().ok_or_else(|| {
            CameraModelError::InvalidParams("Empty YAML document".to_string())
        })?;
        let cam0 = doc["cam0"].clone();
        if cam0.is_badvalue() {
            return Err(CameraModelError::InvalidParams(
                "Missing cam0 section".to_string(),
            ));
        }
        Ok(cam0)
    }

    fn as_number(value: &Yaml) -> Option<f64> {
        value.as_f64().or_else(|| value.as_i64().map(|v| v as f64))
    }

    pub fn parse_intrinsics(cam0: &Yaml) -> Result<Intrinsics, CameraModelError> {
        let values = cam0["intrinsics"]
            .as_vec()
            .ok_or_else(|| CameraModelError::InvalidParams("Invalid intrinsics".to_string()))?;
        if values.len() != 4 {
            return Err(CameraModelError::InvalidParams(format!(
                "Expected 4 intrinsic parameters, found {}",
                values.len()
            )));
        }
        let names = ["fx", "fy", "cx", "cy"];
        let mut parsed = [0.0; 4];
        for (i, value) in values.iter().enumerate() {
            parsed[i] = as_number(value).ok_or_else(|| {
                CameraModelError::InvalidParams(format!("Invalid {}", names[i]))
            })?;
        }
        Ok(Intrinsics::new(parsed[0], parsed[1], parsed[2], parsed[3]))
    }

    pub fn parse_resolution(cam0: &Yaml) -> Result<Resolution, CameraModelError> {
        let values = cam0["resolution"]
            .as_vec()
            .ok_or_else(|| CameraModelError::InvalidParams("Invalid resolution".to_string()))?;
        let width = values
            .first()
            .and_then(Yaml::as_i64)
            .ok_or_else(|| CameraModelError::InvalidParams("Invalid width".to_string()))?;
        let height = values
            .get(1)
            .and_then(Yaml::as_i64)
            .ok_or_else(|| CameraModelError::InvalidParams("Invalid height".to_string()))?;
        Ok(Resolution::new(width as u32, height as u32))
    }

    pub fn parse_distortion(cam0: &Yaml) -> Result<[f64; 5], CameraModelError> {
        let values = cam0["distortion"].as_vec().ok_or_else(|| {
            CameraModelError::InvalidParams("Missing distortion parameters".to_string())
        })?;
        if values.len() != 5 {
            return Err(CameraModelError::InvalidParams(format!(
                "Expected 5 distortion parameters in YAML, found {}",
                values.len()
            )));
        }
        let mut coefficients = [0.0; 5];
        for (i, value) in values.iter().enumerate() {
            coefficients[i] = as_number(value).ok_or_else(|| {
                CameraModelError::InvalidParams(format!(
                    "Invalid distortion parameter at index {i}"
                ))
            })?;
        }
        Ok(coefficients)
    }

    pub fn save_cam0(
        path: &str,
        camera_model: &str,
        intrinsics: &Intrinsics,
        resolution: &Resolution,
        distortion: Option<&[f64; 5]>,
    ) -> Result<(), CameraModelError> {
        let mut cam0 = serde_yaml::Mapping::new();
        cam0.insert(
            "camera_model".into(),
            serde_yaml::Value::String(camera_model.to_string()),
        );
        cam0.insert(
            "intrinsics".into(),
            serde_yaml::to_value(vec![intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy])?,
        );
        if let Some(coefficients) = distortion {
            cam0.insert(
                "distortion".into(),
                serde_yaml::to_value(coefficients.to_vec())?,
            );
        }
        cam0.insert(
            "rostopic".into(),
            serde_yaml::Value::String("/cam0/image_raw".to_string()),
        );
        cam0.insert(
            "resolution".into(),
            serde_yaml::to_value(vec![resolution.width, resolution.height])?,
        );

        let mut root = serde_yaml::Mapping::new();
        root.insert("cam0".into(), serde_yaml::Value::Mapping(cam0));
        let yaml_string = serde_yaml::to_string(&root)?;

        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intrinsic_matrix_bottom_row() {
        let k = Intrinsics::new(900.0, 880.0, 640.0, 480.0).matrix();
        assert_eq!(k[(2, 0)], 0.0);
        assert_eq!(k[(2, 1)], 0.0);
        assert_eq!(k[(2, 2)], 1.0);
        assert_eq!(k[(0, 2)], 640.0);
        assert_eq!(k[(1, 1)], 880.0);
    }

    #[test]
    fn test_intrinsics_from_matrix() {
        let intrinsics = Intrinsics::new(900.0, 900.0, 640.0, 480.0);
        let recovered = Intrinsics::from_matrix(&intrinsics.matrix()).unwrap();
        assert_eq!(intrinsics, recovered);

        let mut bad = intrinsics.matrix();
        bad[(2, 2)] = 2.0;
        assert!(matches!(
            Intrinsics::from_matrix(&bad),
            Err(CameraModelError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_validate_intrinsics() {
        let bad_focal = Intrinsics::new(0.0, 500.0, 320.0, 240.0);
        assert!(matches!(
            validation::validate_intrinsics(&bad_focal),
            Err(CameraModelError::FocalLengthMustBePositive)
        ));
        let bad_center = Intrinsics::new(500.0, 500.0, f64::NAN, 240.0);
        assert!(matches!(
            validation::validate_intrinsics(&bad_center),
            Err(CameraModelError::PrincipalPointMustBeFinite)
        ));
    }

    #[test]
    fn test_apply_then_normalize() {
        let intrinsics = Intrinsics::new(500.0, 510.0, 320.0, 240.0);
        let normalized = Vector2::new(0.1, -0.2);
        let pixel = intrinsics.apply(&normalized);
        assert!((pixel.x - 370.0).abs() < 1e-12);
        assert!((pixel.y - 138.0).abs() < 1e-12);
        let back = intrinsics.normalize(&pixel);
        assert!((back - normalized).norm() < 1e-12);
    }

    #[test]
    fn test_resolution_contains_with_margin() {
        let resolution = Resolution::new(1280, 960);
        assert!(resolution.contains(&Vector2::new(640.0, 480.0), 20.0));
        assert!(!resolution.contains(&Vector2::new(10.0, 480.0), 20.0));
        assert!(!resolution.contains(&Vector2::new(640.0, 950.0), 20.0));
    }
}
