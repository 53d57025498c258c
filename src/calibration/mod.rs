//! The `calibration` module pairs board geometry with observations and turns
//! a solver's estimate into an evaluated calibration.
//!
//! It provides:
//! - [`PatternConfig`] and [`View`], the correspondence data of a run.
//! - [`reprojection`] metrics (per view, aggregate, summary statistics).
//! - [`Calibrator`], which gates a run on the number of usable views, calls
//!   a [`CalibrationSolver`] and evaluates the result.
//! - The [`CornerDetector`] and [`Undistorter`] seams.
//! - [`CalibrationFile`], the persisted `K` + distortion artifact.

use crate::camera::{CameraModelError, Distortion, Intrinsics, Pose, RadTanModel, Resolution};
use crate::optimization::CalibrationSolver;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;

pub mod detector;
pub mod pattern;
pub mod persist;
pub mod reprojection;
pub mod undistort;
pub mod view;

pub use detector::{collect_views, detect_view, CornerDetector};
pub use pattern::PatternConfig;
pub use persist::CalibrationFile;
pub use reprojection::{
    aggregate_rms, mean_view_rms, view_reprojection_error, CalibrationQuality, ProjectionError,
    ViewError,
};
pub use undistort::{undistort_image, Roi, Undistorted, Undistorter};
pub use view::View;

/// Fewest views a calibration run accepts.
pub const MIN_VIEWS: usize = 3;

/// Settings of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub pattern: PatternConfig,
    pub resolution: Resolution,
    /// Raised to [`MIN_VIEWS`] if set lower.
    pub min_views: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            pattern: PatternConfig::default(),
            resolution: Resolution::new(1280, 960),
            min_views: MIN_VIEWS,
        }
    }
}

impl CalibrationConfig {
    pub fn required_views(&self) -> usize {
        self.min_views.max(MIN_VIEWS)
    }

    pub fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let config: CalibrationConfig = serde_yaml::from_str(&contents)?;
        config.pattern.validate()?;
        Ok(config)
    }

    pub fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

/// Outcome of a successful run. Built once by [`Calibrator::calibrate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
    /// One pose per input view, in input order.
    pub poses: Vec<Pose>,
    pub view_errors: Vec<ViewError>,
    /// RMS over all corners of all views, evaluated locally.
    pub rms: f64,
    /// RMS as reported by the solver.
    pub solver_rms: f64,
    pub resolution: Resolution,
}

impl CalibrationResult {
    pub fn mean_view_rms(&self) -> f64 {
        mean_view_rms(&self.view_errors)
    }

    pub fn quality(&self) -> CalibrationQuality {
        CalibrationQuality::from_rms(self.rms)
    }

    pub fn statistics(&self) -> Option<ProjectionError> {
        ProjectionError::from_views(&self.view_errors)
    }

    pub fn to_file(&self) -> CalibrationFile {
        CalibrationFile::new(&self.intrinsics, &self.distortion, self.resolution, self.rms)
    }

    pub fn camera_model(&self) -> Result<RadTanModel, CameraModelError> {
        RadTanModel::from_parts(self.intrinsics, self.distortion, self.resolution)
    }
}

/// Runs a [`CalibrationSolver`] over a set of views and evaluates its output.
pub struct Calibrator<S: CalibrationSolver> {
    config: CalibrationConfig,
    solver: S,
}

impl<S: CalibrationSolver> Calibrator<S> {
    pub fn new(config: CalibrationConfig, solver: S) -> Self {
        Calibrator { config, solver }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Calibrates from already paired views.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InsufficientData`] with fewer than
    ///   [`CalibrationConfig::required_views`] views. The solver is not called.
    /// * [`CameraModelError::InvalidParams`] for an invalid pattern or a view
    ///   whose corner count differs from it.
    /// * Whatever the solver reports, e.g. [`CameraModelError::DegenerateGeometry`].
    pub fn calibrate(&self, views: &[View]) -> Result<CalibrationResult, CameraModelError> {
        self.config.pattern.validate()?;

        let required = self.config.required_views();
        if views.len() < required {
            return Err(CameraModelError::InsufficientData {
                found: views.len(),
                required,
            });
        }
        let expected = self.config.pattern.corner_count();
        for view in views {
            view.validate()?;
            if view.object_points.ncols() != expected || view.image_points.ncols() != expected {
                return Err(CameraModelError::InvalidParams(format!(
                    "{} has {} object and {} image corners, pattern has {expected}",
                    view.name,
                    view.object_points.ncols(),
                    view.image_points.ncols()
                )));
            }
        }

        info!("Calibrating with {} views", views.len());
        let output = self.solver.solve(views, self.config.resolution)?;
        if output.poses.len() != views.len() {
            return Err(CameraModelError::NumericalError(format!(
                "solver returned {} poses for {} views",
                output.poses.len(),
                views.len()
            )));
        }

        let view_errors: Vec<ViewError> = views
            .iter()
            .zip(output.poses.iter())
            .map(|(view, pose)| {
                view_reprojection_error(view, &output.intrinsics, &output.distortion, pose)
            })
            .collect();
        for error in &view_errors {
            debug!("{}: reprojection error {:.4} px", error.name, error.rms);
        }
        let rms = aggregate_rms(&view_errors);
        info!(
            "RMS reprojection error {rms:.4} px (solver {:.4} px)",
            output.rms
        );

        Ok(CalibrationResult {
            intrinsics: output.intrinsics,
            distortion: output.distortion,
            poses: output.poses,
            view_errors,
            rms,
            solver_rms: output.rms,
            resolution: self.config.resolution,
        })
    }
}
