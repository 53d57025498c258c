//! Implements the Radial-Tangential (RadTan) camera model.
//!
//! This module provides the [`RadTanModel`] struct: a pinhole camera whose
//! normalized image coordinates pass through the [`Distortion`] polynomial
//! before the intrinsic matrix is applied. It adheres to the [`CameraModel`]
//! trait defined in the parent `camera` module ([`crate::camera`]).

use crate::camera::{
    projection, validation, yaml, CameraModel, CameraModelError, DepthPolicy, DepthStatus,
    Distortion, Intrinsics, Pose, Resolution,
};
use nalgebra::{DVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a Radial-Tangential (RadTan) camera model.
///
/// The distortion coefficients are ordered `[k1, k2, p1, p2, k3]`:
/// *   `k1`, `k2`, `k3`: Radial distortion coefficients.
/// *   `p1`, `p2`: Tangential distortion coefficients.
///
/// # Examples
///
/// ```rust
/// use nalgebra::DVector;
/// use pinhole_calib::camera::{RadTanModel, Resolution};
///
/// // Parameters: fx, fy, cx, cy, k1, k2, p1, p2, k3
/// let params = DVector::from_vec(vec![
///     900.0, 900.0, 640.0, 480.0,
///     -0.15, 0.05, 0.0, 0.0, 0.0,
/// ]);
/// let mut model = RadTanModel::new(&params).unwrap();
/// model.resolution = Resolution::new(1280, 960);
///
/// assert_eq!(model.intrinsics.fx, 900.0);
/// assert_eq!(model.distortion.k1, -0.15);
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RadTanModel {
    /// The intrinsic parameters of the camera, [`Intrinsics`] (fx, fy, cx, cy).
    pub intrinsics: Intrinsics,
    /// The resolution of the camera image, [`Resolution`] (width, height).
    pub resolution: Resolution,
    pub distortion: Distortion,
}

impl RadTanModel {
    /// Creates a new [`RadTanModel`] from the parameter vector
    /// `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`.
    ///
    /// The resolution is initialized to 0x0 and should be set manually or by
    /// loading from YAML.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] if fewer than 9 values are given.
    /// * Any error from [`CameraModel::validate_params`].
    pub fn new(parameters: &DVector<f64>) -> Result<Self, CameraModelError> {
        if parameters.len() < 9 {
            return Err(CameraModelError::InvalidParams(format!(
                "RadTan model needs 9 parameters, got {}",
                parameters.len()
            )));
        }
        let model = RadTanModel {
            intrinsics: Intrinsics::new(parameters[0], parameters[1], parameters[2], parameters[3]),
            resolution: Resolution::new(0, 0),
            distortion: Distortion::new(
                parameters[4],
                parameters[5],
                parameters[6],
                parameters[7],
                parameters[8],
            ),
        };

        model.validate_params()?;
        Ok(model)
    }

    /// Builds a model from already-typed parts.
    pub fn from_parts(
        intrinsics: Intrinsics,
        distortion: Distortion,
        resolution: Resolution,
    ) -> Result<Self, CameraModelError> {
        let model = RadTanModel {
            intrinsics,
            resolution,
            distortion,
        };
        model.validate_params()?;
        Ok(model)
    }

    /// Flattened `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`, the layout the
    /// optimizer works on.
    pub fn parameters(&self) -> DVector<f64> {
        let d = self.distortion.as_array();
        DVector::from_vec(vec![
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            d[0],
            d[1],
            d[2],
            d[3],
            d[4],
        ])
    }
}

impl fmt::Debug for RadTanModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RadTanModel [fx: {} fy: {} cx: {} cy: {} distortion: {:?}]",
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            self.distortion.as_array(),
        )
    }
}

impl CameraModel for RadTanModel {
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        // If z is very small, the point is at the camera center
        if point_3d.z < f64::EPSILON.sqrt() {
            return Err(CameraModelError::PointAtCameraCenter);
        }

        let (pixel, status) = projection::project_point(
            point_3d,
            &self.intrinsics,
            &Pose::identity(),
            Some(&self.distortion),
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
        let model = RadTanModel {
            intrinsics: yaml::parse_intrinsics(&cam0)?,
            resolution: yaml::parse_resolution(&cam0)?,
            distortion: Distortion::from_array(yaml::parse_distortion(&cam0)?),
        };
        model.validate_params()?;
        Ok(model)
    }

    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        yaml::save_cam0(
            path,
            "pinhole",
            &self.intrinsics,
            &self.resolution,
            Some(&self.distortion.as_array()),
        )
    }

    fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)?;
        if self.distortion.as_array().iter().any(|c| !c.is_finite()) {
            return Err(CameraModelError::InvalidParams(
                "Distortion coefficients must be finite".to_string(),
            ));
        }
        Ok(())
    }

    fn get_resolution(&self) -> Resolution {
        self.resolution
    }

    fn get_intrinsics(&self) -> Intrinsics {
        self.intrinsics
    }

    fn get_distortion(&self) -> Vec<f64> {
        self.distortion.as_array().to_vec()
    }
}
