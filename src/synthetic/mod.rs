//! Synthetic calibration data.
//!
//! [`SyntheticGenerator`] places a chessboard in front of a known camera,
//! projects its interior corners with lens distortion and renders the image
//! the camera would see. Views whose corners leave the image are dropped.

use crate::calibration::{PatternConfig, View};
use crate::camera::{
    projection, validation, CameraModelError, DepthPolicy, DepthStatus, Distortion, Intrinsics,
    Pose, Resolution,
};
use image::GrayImage;
use log::{info, warn};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;

pub mod render;

pub use render::{
    add_sensor_noise, extrapolate_border, generate_pattern_image, render_chessboard,
};

/// Ground-truth camera and rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub pattern: PatternConfig,
    pub resolution: Resolution,
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
    /// Corners must stay this many pixels away from every image edge.
    pub margin: f64,
    /// Standard deviation of the additive sensor noise, in grey levels.
    pub noise_sigma: f64,
    pub background: u8,
    /// View `i` draws its noise from a generator seeded with `seed + i`.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            pattern: PatternConfig::new(9, 6, 30.0),
            resolution: Resolution::new(1280, 960),
            intrinsics: Intrinsics::new(900.0, 900.0, 640.0, 480.0),
            distortion: Distortion::radial(-0.15, 0.05),
            margin: 20.0,
            noise_sigma: 3.0,
            background: 200,
            seed: 42,
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> Result<(), CameraModelError> {
        self.pattern.validate()?;
        validation::validate_intrinsics(&self.intrinsics)?;
        if !(self.margin >= 0.0) {
            return Err(CameraModelError::InvalidParams(format!(
                "margin must be non-negative, got {}",
                self.margin
            )));
        }
        if !(self.noise_sigma >= 0.0) {
            return Err(CameraModelError::InvalidParams(format!(
                "noise sigma must be non-negative, got {}",
                self.noise_sigma
            )));
        }
        Ok(())
    }

    pub fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let config: SyntheticConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

/// Board placement: Euler angles in degrees (applied `Rz·Ry·Rx`) and the
/// translation in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewParams {
    pub rotation_deg: [f64; 3],
    pub translation: [f64; 3],
}

impl ViewParams {
    pub const fn new(rotation_deg: [f64; 3], translation: [f64; 3]) -> Self {
        ViewParams {
            rotation_deg,
            translation,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::from_euler_degrees(&self.rotation_deg, &Vector3::from(self.translation))
    }
}

/// The fourteen-view sweep: frontal, tilted up/down, turned left/right,
/// diagonals, steep angles and slight in-plane rotations.
pub fn default_views() -> Vec<ViewParams> {
    vec![
        ViewParams::new([0.0, 0.0, 0.0], [0.0, 0.0, 400.0]),
        ViewParams::new([12.0, 0.0, 0.0], [0.0, 30.0, 420.0]),
        ViewParams::new([-12.0, 0.0, 0.0], [0.0, -30.0, 420.0]),
        ViewParams::new([0.0, 15.0, 0.0], [40.0, 0.0, 450.0]),
        ViewParams::new([0.0, -15.0, 0.0], [-40.0, 0.0, 450.0]),
        ViewParams::new([8.0, 10.0, 0.0], [30.0, 25.0, 430.0]),
        ViewParams::new([-8.0, -10.0, 0.0], [-30.0, -25.0, 430.0]),
        ViewParams::new([15.0, 10.0, 3.0], [35.0, 40.0, 460.0]),
        ViewParams::new([-10.0, 15.0, 0.0], [40.0, -20.0, 450.0]),
        ViewParams::new([5.0, -15.0, -3.0], [-40.0, 15.0, 450.0]),
        ViewParams::new([18.0, 5.0, 0.0], [10.0, 45.0, 470.0]),
        ViewParams::new([-18.0, -5.0, 0.0], [-10.0, -45.0, 470.0]),
        ViewParams::new([5.0, 5.0, 8.0], [20.0, 20.0, 410.0]),
        ViewParams::new([-5.0, -5.0, -8.0], [-20.0, -20.0, 410.0]),
    ]
}

/// A rendered view with its exact corners and pose.
#[derive(Debug, Clone)]
pub struct SyntheticView {
    pub view: View,
    pub pose: Pose,
    pub image: GrayImage,
}

pub struct SyntheticGenerator {
    config: SyntheticConfig,
}

impl SyntheticGenerator {
    pub fn new(config: SyntheticConfig) -> Result<Self, CameraModelError> {
        config.validate()?;
        Ok(SyntheticGenerator { config })
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Projects and renders one board placement.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::OutOfFrame`] if any corner lands closer than
    ///   `margin` to an image edge or behind the camera.
    pub fn generate_view(
        &self,
        index: usize,
        params: &ViewParams,
    ) -> Result<SyntheticView, CameraModelError> {
        let config = &self.config;
        let pose = params.pose();
        let object_points = config.pattern.object_points();

        let projected = projection::project_points(
            &object_points,
            &config.intrinsics,
            &pose,
            Some(&config.distortion),
            DepthPolicy::default(),
        );

        let outside = projected
            .points
            .column_iter()
            .zip(projected.status.iter())
            .filter(|(pixel, status)| {
                **status != DepthStatus::InFront
                    || !config
                        .resolution
                        .contains(&pixel.clone_owned(), config.margin)
            })
            .count();
        if outside > 0 {
            return Err(CameraModelError::OutOfFrame {
                view: index,
                outside,
            });
        }

        let mut image = render_chessboard(
            &projected.points,
            config.resolution,
            &config.pattern,
            config.background,
        )?;
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(index as u64));
        add_sensor_noise(&mut image, config.noise_sigma, &mut rng);

        let view = View::new(format!("calib_{index:03}"), object_points, projected.points)?;
        Ok(SyntheticView { view, pose, image })
    }

    /// Generates every placement, dropping out-of-frame ones with a warning.
    ///
    /// Views keep the index of their placement in their name. Nothing is
    /// retried.
    ///
    /// # Errors
    ///
    /// Any error other than [`CameraModelError::OutOfFrame`].
    pub fn generate_views(
        &self,
        placements: &[ViewParams],
    ) -> Result<Vec<SyntheticView>, CameraModelError> {
        let mut views = Vec::with_capacity(placements.len());
        for (index, params) in placements.iter().enumerate() {
            match self.generate_view(index, params) {
                Ok(view) => {
                    info!(
                        "Generated {} (rot={:?} deg)",
                        view.view.name, params.rotation_deg
                    );
                    views.push(view);
                }
                Err(err @ CameraModelError::OutOfFrame { .. }) => {
                    warn!("View {index} discarded: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        info!("Generated {}/{} views", views.len(), placements.len());
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::view_reprojection_error;

    fn quiet_config() -> SyntheticConfig {
        SyntheticConfig {
            noise_sigma: 0.0,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn test_default_views() {
        let views = default_views();
        assert_eq!(views.len(), 14);
        assert_eq!(views[0], ViewParams::new([0.0, 0.0, 0.0], [0.0, 0.0, 400.0]));
        let pose = views[0].pose();
        assert!((pose.translation - Vector3::new(0.0, 0.0, 400.0)).norm() < 1e-12);
    }

    #[test]
    fn test_frontal_view_is_consistent() {
        let generator = SyntheticGenerator::new(quiet_config()).unwrap();
        let view = generator.generate_view(0, &default_views()[0]).unwrap();
        assert_eq!(view.view.name, "calib_000");
        assert_eq!(view.view.len(), 54);
        assert_eq!(view.image.dimensions(), (1280, 960));

        // Board origin sits on the optical axis.
        let first = view.view.image_points.column(0);
        assert!((first[0] - 640.0).abs() < 1e-9);
        assert!((first[1] - 480.0).abs() < 1e-9);

        let config = generator.config();
        let error =
            view_reprojection_error(&view.view, &config.intrinsics, &config.distortion, &view.pose);
        assert!(error.rms < 1e-9);
    }

    #[test]
    fn test_out_of_frame_views_are_dropped() {
        let generator = SyntheticGenerator::new(quiet_config()).unwrap();
        let far_right = ViewParams::new([0.0, 0.0, 0.0], [500.0, 0.0, 400.0]);
        assert!(matches!(
            generator.generate_view(3, &far_right),
            Err(CameraModelError::OutOfFrame { view: 3, .. })
        ));
        let behind = ViewParams::new([0.0, 0.0, 0.0], [0.0, 0.0, -400.0]);
        assert!(matches!(
            generator.generate_view(4, &behind),
            Err(CameraModelError::OutOfFrame { view: 4, outside: 54 })
        ));

        let placements = vec![default_views()[0], far_right, default_views()[1]];
        let views = generator.generate_views(&placements).unwrap();
        let names: Vec<&str> = views.iter().map(|v| v.view.name.as_str()).collect();
        assert_eq!(names, vec!["calib_000", "calib_002"]);
    }

    #[test]
    fn test_noise_is_reproducible_per_view() {
        let generator = SyntheticGenerator::new(SyntheticConfig::default()).unwrap();
        let a = generator.generate_view(5, &default_views()[5]).unwrap();
        let b = generator.generate_view(5, &default_views()[5]).unwrap();
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SyntheticConfig {
            noise_sigma: -1.0,
            ..SyntheticConfig::default()
        };
        assert!(SyntheticGenerator::new(config).is_err());
    }
}
