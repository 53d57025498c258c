//! The `optimization` module provides the nonlinear calibration solver.
//!
//! The calibration core treats the solver as an opaque collaborator behind the
//! [`CalibrationSolver`] trait: it hands over the paired views and the image
//! size, and receives the shared intrinsics, the distortion coefficients and
//! one pose per view. [`RadTanSolver`] is the bundled implementation.
//!
//! The process in [`RadTanSolver`] is:
//! 1. A linear estimation step ([`linear`]) for the initial guess: one
//!    homography per view, closed-form intrinsics, then a pose per view.
//! 2. A Levenberg-Marquardt refinement of all parameters with `tiny_solver`.

use serde::{Deserialize, Serialize};

pub mod linear;
pub mod rad_tan;

pub use rad_tan::{RadTanSolver, SolverOptions};

use crate::calibration::View;
use crate::camera::{CameraModelError, Distortion, Intrinsics, Pose, Resolution};

/// Everything a solver reports back for one calibration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOutput {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
    /// One world-to-camera pose per input view, in input order.
    pub poses: Vec<Pose>,
    /// RMS reprojection error as measured by the solver itself.
    pub rms: f64,
}

/// A trait for the nonlinear calibration step.
///
/// Implementations are free to pick their own parameterization and method.
/// The returned parameters must reproduce the observations through
/// [`crate::camera::projection::project_points`] within the reported `rms`.
pub trait CalibrationSolver {
    /// Estimates intrinsics, distortion and per-view poses.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::DegenerateGeometry`] when the views do not
    ///   constrain the camera.
    /// * [`CameraModelError::NumericalError`] when the optimizer fails.
    fn solve(&self, views: &[View], resolution: Resolution)
        -> Result<SolverOutput, CameraModelError>;
}
