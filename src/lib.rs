//! Pinhole Calibration Library
//!
//! Camera geometry and chessboard calibration building blocks:
//! - Homogeneous 2D/3D transforms (translation, scaling, reflection,
//!   axis and Euler rotations).
//! - The pinhole camera with radial-tangential lens distortion.
//! - World-to-pixel projection with explicit depth handling.
//! - Chessboard correspondences, reprojection metrics and a calibration
//!   driver around a pluggable solver.
//! - Synthetic chessboard rendering for end-to-end testing.
//!
//! The default solver initialises from homographies and refines all
//! parameters with Levenberg-Marquardt from the tiny-solver framework.

pub mod calibration;
pub mod camera;
pub mod geometry;
pub mod optimization;
pub mod synthetic;
pub mod util;

// Re-export commonly used types
pub use calibration::{
    CalibrationConfig, CalibrationFile, CalibrationQuality, CalibrationResult, Calibrator,
    PatternConfig, View,
};
pub use camera::{
    CameraModel, CameraModelError, DepthPolicy, Distortion, Intrinsics, PinholeModel, Pose,
    RadTanModel, Resolution,
};
pub use geometry::{Transform2, Transform3};
pub use optimization::{CalibrationSolver, RadTanSolver, SolverOptions};
pub use synthetic::{SyntheticConfig, SyntheticGenerator};
