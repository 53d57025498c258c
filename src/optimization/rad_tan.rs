//! Levenberg-Marquardt calibration of the radial-tangential pinhole camera.
//!
//! The problem has one parameter block `"intrinsics"` holding
//! `[fx, fy, cx, cy, k1, k2, p1, p2, k3]` shared by every view and one block
//! `"pose_{i}"` per view holding `[rx, ry, rz, tx, ty, tz]` (Rodrigues vector
//! and translation). Each view contributes a single residual block with two
//! rows per corner.

use crate::calibration::{aggregate_rms, view_reprojection_error, View, ViewError};
use crate::camera::{validation, CameraModelError, Distortion, Intrinsics, Pose, Resolution};
use crate::optimization::{linear, CalibrationSolver, SolverOutput};

use log::{debug, info, warn};
use nalgebra::{DVector, RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tiny_solver::factors::Factor;
use tiny_solver::optimizer::{Optimizer as TinySolverOptimizer, OptimizerOptions};
use tiny_solver::LevenbergMarquardtOptimizer;

const INTRINSICS_KEY: &str = "intrinsics";

fn pose_key(index: usize) -> String {
    format!("pose_{index}")
}

/// Rotates `p` by the Rodrigues vector `w`.
///
/// Near the identity the first-order form `p + w×p` is used so the square
/// root never sees a zero argument.
fn rotate<T: RealField>(w: &Vector3<T>, p: &Vector3<T>) -> Vector3<T> {
    let small: T = nalgebra::convert(1e-12);
    let theta2 = w.dot(w);
    if theta2 > small {
        let theta = theta2.sqrt();
        let k = w / theta.clone();
        let (sin, cos) = (theta.clone().sin(), theta.cos());
        let k_dot_p = k.dot(p);
        let k_cross_p = k.cross(p);
        p * cos.clone() + k_cross_p * sin + k * (k_dot_p * (T::one() - cos))
    } else {
        p + w.cross(p)
    }
}

/// Reprojection residual of all corners of one view.
#[derive(Debug, Clone)]
struct ViewReprojectionCost {
    object_points: Vec<Vector3<f64>>,
    image_points: Vec<Vector2<f64>>,
}

impl ViewReprojectionCost {
    fn new(view: &View) -> Self {
        Self {
            object_points: view
                .object_points
                .column_iter()
                .map(|c| c.into_owned())
                .collect(),
            image_points: view
                .image_points
                .column_iter()
                .map(|c| c.into_owned())
                .collect(),
        }
    }
}

impl<T: RealField> Factor<T> for ViewReprojectionCost {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let camera = &params[0];
        let pose = &params[1];

        let fx = camera[0].clone();
        let fy = camera[1].clone();
        let cx = camera[2].clone();
        let cy = camera[3].clone();
        let k1 = camera[4].clone();
        let k2 = camera[5].clone();
        let p1 = camera[6].clone();
        let p2 = camera[7].clone();
        let k3 = camera[8].clone();

        let rvec = Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
        let tvec = Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());
        let two: T = nalgebra::convert(2.0);

        let mut residuals = DVector::zeros(self.object_points.len() * 2);

        for (i, (object, observed)) in self
            .object_points
            .iter()
            .zip(self.image_points.iter())
            .enumerate()
        {
            let p_world = Vector3::new(
                nalgebra::convert::<f64, T>(object.x),
                nalgebra::convert::<f64, T>(object.y),
                nalgebra::convert::<f64, T>(object.z),
            );
            let p_cam = rotate(&rvec, &p_world) + &tvec;

            let x = p_cam.x.clone() / p_cam.z.clone();
            let y = p_cam.y.clone() / p_cam.z.clone();

            let r2 = x.clone() * x.clone() + y.clone() * y.clone();
            let r4 = r2.clone() * r2.clone();
            let r6 = r4.clone() * r2.clone();
            let radial = T::one() + k1.clone() * r2.clone() + k2.clone() * r4 + k3.clone() * r6;

            let x_d = x.clone() * radial.clone()
                + two.clone() * p1.clone() * x.clone() * y.clone()
                + p2.clone() * (r2.clone() + two.clone() * x.clone() * x.clone());
            let y_d = y.clone() * radial
                + p1.clone() * (r2 + two.clone() * y.clone() * y.clone())
                + two.clone() * p2.clone() * x * y;

            let u = fx.clone() * x_d + cx.clone();
            let v = fy.clone() * y_d + cy.clone();

            residuals[i * 2] = u - nalgebra::convert::<f64, T>(observed.x);
            residuals[i * 2 + 1] = v - nalgebra::convert::<f64, T>(observed.y);
        }
        residuals
    }
}

/// Knobs for [`RadTanSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Run the nonlinear refinement. With `false` the closed-form
    /// initialisation (zero distortion) is returned as is.
    pub refine: bool,
    /// Log progress at `info` level.
    pub verbose: bool,
    /// Levenberg-Marquardt iteration cap, rejected steps included.
    pub max_iterations: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            refine: true,
            verbose: false,
            max_iterations: 200,
        }
    }
}

/// Sum of squared residuals below which the optimizer stops.
const MIN_ERROR: f64 = 1e-16;

/// Initial RMS (px) above which a refinement that gains nothing is an error.
const STALL_RMS: f64 = 1e-6;

impl SolverOptions {
    /// `tiny_solver` stops as soon as the error changes by less than its
    /// decrease thresholds. A rejected step leaves the error unchanged, so
    /// both thresholds are zero here: a rejection only raises the damping and
    /// the run ends at the iteration cap or at [`MIN_ERROR`].
    fn optimizer_options(&self) -> OptimizerOptions {
        OptimizerOptions {
            max_iteration: self.max_iterations,
            min_abs_error_decrease_threshold: 0.0,
            min_rel_error_decrease_threshold: 0.0,
            min_error_threshold: MIN_ERROR,
            ..OptimizerOptions::default()
        }
    }
}

/// Planar calibration on the `tiny_solver` Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct RadTanSolver {
    pub options: SolverOptions,
}

impl RadTanSolver {
    pub fn new(options: SolverOptions) -> Self {
        RadTanSolver { options }
    }

    /// Closed-form starting point: intrinsics and poses with zero distortion.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`linear::estimate_homography`],
    /// [`linear::estimate_intrinsics`] and [`linear::pose_from_homography`].
    pub fn initial_guess(
        &self,
        views: &[View],
        resolution: Resolution,
    ) -> Result<(Intrinsics, Vec<Pose>), CameraModelError> {
        let homographies = views
            .iter()
            .map(|view| linear::estimate_homography(&view.object_points, &view.image_points))
            .collect::<Result<Vec<_>, _>>()?;
        let intrinsics = linear::estimate_intrinsics(&homographies, resolution)?;
        let poses = homographies
            .iter()
            .map(|h| linear::pose_from_homography(&intrinsics, h))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("initial intrinsics {intrinsics:?}");
        Ok((intrinsics, poses))
    }

    fn refine(
        &self,
        views: &[View],
        intrinsics: Intrinsics,
        poses: &[Pose],
    ) -> Result<(Intrinsics, Distortion, Vec<Pose>), CameraModelError> {
        let mut problem = tiny_solver::Problem::new();
        let mut initial_values = HashMap::new();

        initial_values.insert(
            INTRINSICS_KEY.to_string(),
            DVector::from_vec(vec![
                intrinsics.fx,
                intrinsics.fy,
                intrinsics.cx,
                intrinsics.cy,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
            ]),
        );

        for (i, (view, pose)) in views.iter().zip(poses.iter()).enumerate() {
            let key = pose_key(i);
            let rvec = pose.rodrigues();
            initial_values.insert(
                key.clone(),
                DVector::from_vec(vec![
                    rvec.x,
                    rvec.y,
                    rvec.z,
                    pose.translation.x,
                    pose.translation.y,
                    pose.translation.z,
                ]),
            );
            problem.add_residual_block(
                view.len() * 2,
                &[INTRINSICS_KEY, key.as_str()],
                Box::new(ViewReprojectionCost::new(view)),
                None,
            );
        }

        if self.options.verbose {
            info!("Starting optimization with tiny-solver Levenberg-Marquardt...");
        }

        let optimizer = LevenbergMarquardtOptimizer::default();
        let result = optimizer
            .optimize(
                &problem,
                &initial_values,
                Some(self.options.optimizer_options()),
            )
            .ok_or_else(|| CameraModelError::NumericalError("Optimization failed".to_string()))?;

        if self.options.verbose {
            info!("Optimization finished");
        }

        let camera = result.get(INTRINSICS_KEY).ok_or_else(|| {
            CameraModelError::NumericalError("optimizer dropped the intrinsics block".to_string())
        })?;
        let intrinsics = Intrinsics::new(camera[0], camera[1], camera[2], camera[3]);
        let distortion = Distortion::new(camera[4], camera[5], camera[6], camera[7], camera[8]);

        let poses = (0..views.len())
            .map(|i| {
                let block = result.get(&pose_key(i)).ok_or_else(|| {
                    CameraModelError::NumericalError(format!("optimizer dropped pose {i}"))
                })?;
                Ok(Pose::from_rodrigues(
                    &Vector3::new(block[0], block[1], block[2]),
                    &Vector3::new(block[3], block[4], block[5]),
                ))
            })
            .collect::<Result<Vec<_>, CameraModelError>>()?;

        Ok((intrinsics, distortion, poses))
    }
}

/// RMS over all corners, the same figure [`crate::calibration::Calibrator`]
/// reports.
fn rms_over_views(
    views: &[View],
    intrinsics: &Intrinsics,
    distortion: &Distortion,
    poses: &[Pose],
) -> f64 {
    let errors: Vec<ViewError> = views
        .iter()
        .zip(poses.iter())
        .map(|(view, pose)| view_reprojection_error(view, intrinsics, distortion, pose))
        .collect();
    aggregate_rms(&errors)
}

impl CalibrationSolver for RadTanSolver {
    fn solve(
        &self,
        views: &[View],
        resolution: Resolution,
    ) -> Result<SolverOutput, CameraModelError> {
        for view in views {
            view.validate()?;
        }
        let (initial_intrinsics, initial_poses) = self.initial_guess(views, resolution)?;
        let initial_distortion = Distortion::zero();

        let (intrinsics, distortion, poses) = if self.options.refine {
            let initial_rms =
                rms_over_views(views, &initial_intrinsics, &initial_distortion, &initial_poses);
            let refined = self.refine(views, initial_intrinsics, &initial_poses)?;
            let refined_rms = rms_over_views(views, &refined.0, &refined.1, &refined.2);
            let stalled = !refined_rms.is_finite() || refined_rms >= initial_rms;
            if initial_rms > STALL_RMS && stalled {
                warn!(
                    "Refinement made no progress (RMS {initial_rms:.6} px -> {refined_rms:.6} px)"
                );
                return Err(CameraModelError::NumericalError(format!(
                    "refinement did not reduce the reprojection error ({initial_rms:.6} px)"
                )));
            }
            debug!("refinement RMS {initial_rms:.6} px -> {refined_rms:.6} px");
            refined
        } else {
            (initial_intrinsics, initial_distortion, initial_poses)
        };

        validation::validate_intrinsics(&intrinsics)?;
        let rms = rms_over_views(views, &intrinsics, &distortion, &poses);
        if !rms.is_finite() {
            return Err(CameraModelError::NumericalError(
                "solver produced a non-finite reprojection error".to_string(),
            ));
        }

        if self.options.verbose {
            info!("Solver RMS reprojection error: {rms:.6} px");
        }

        Ok(SolverOutput {
            intrinsics,
            distortion,
            poses,
            rms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::PatternConfig;
    use crate::camera::{projection, DepthPolicy};

    fn synthetic_views(intrinsics: &Intrinsics, distortion: &Distortion) -> Vec<View> {
        let pattern = PatternConfig::new(9, 6, 25.0);
        let object_points = pattern.object_points();
        [
            ([15.0, 10.0, 3.0], [-100.0, -60.0, 460.0]),
            ([-12.0, 5.0, -8.0], [-90.0, -70.0, 420.0]),
            ([5.0, -18.0, 10.0], [-110.0, -50.0, 500.0]),
            ([-20.0, -6.0, 0.0], [-95.0, -65.0, 440.0]),
            ([10.0, 15.0, -5.0], [-105.0, -55.0, 480.0]),
        ]
        .iter()
        .enumerate()
        .map(|(i, (rotation, translation))| {
            let pose = Pose::from_euler_degrees(rotation, &Vector3::from(*translation));
            let image_points = projection::project_points(
                &object_points,
                intrinsics,
                &pose,
                Some(distortion),
                DepthPolicy::default(),
            )
            .points;
            View::new(format!("view_{i:02}"), object_points.clone(), image_points).unwrap()
        })
        .collect()
    }

    #[test]
    fn test_rotate_matches_rotation_matrix() {
        let w = Vector3::new(0.2, -0.1, 0.3);
        let p = Vector3::new(1.0, 2.0, 3.0);
        let expected = nalgebra::Rotation3::from_scaled_axis(w) * p;
        assert!((rotate(&w, &p) - expected).norm() < 1e-12);

        let tiny = Vector3::new(1e-8, 0.0, 0.0);
        assert!((rotate(&tiny, &p) - p).norm() < 1e-6);
    }

    #[test]
    fn test_residual_is_zero_at_truth() {
        let intrinsics = Intrinsics::new(900.0, 900.0, 640.0, 480.0);
        let distortion = Distortion::new(-0.15, 0.05, 0.001, -0.0005, 0.0);
        let views = synthetic_views(&intrinsics, &distortion);
        let pose = Pose::from_euler_degrees(&[15.0, 10.0, 3.0], &Vector3::new(-100.0, -60.0, 460.0));
        let rvec = pose.rodrigues();

        let cost = ViewReprojectionCost::new(&views[0]);
        let camera = DVector::from_vec(vec![
            900.0, 900.0, 640.0, 480.0, -0.15, 0.05, 0.001, -0.0005, 0.0,
        ]);
        let pose_block = DVector::from_vec(vec![
            rvec.x,
            rvec.y,
            rvec.z,
            pose.translation.x,
            pose.translation.y,
            pose.translation.z,
        ]);
        let residuals: DVector<f64> = cost.residual_func(&[camera, pose_block]);
        assert_eq!(residuals.len(), 54 * 2);
        assert!(residuals.amax() < 1e-8);
    }

    #[test]
    fn test_initial_guess_without_refinement() {
        let intrinsics = Intrinsics::new(900.0, 900.0, 640.0, 480.0);
        let views = synthetic_views(&intrinsics, &Distortion::zero());
        let solver = RadTanSolver::new(SolverOptions {
            refine: false,
            ..SolverOptions::default()
        });
        let output = solver.solve(&views, Resolution::new(1280, 960)).unwrap();
        assert_eq!(output.poses.len(), views.len());
        assert!(output.distortion.is_zero());
        assert!((output.intrinsics.fx - 900.0).abs() < 1e-3);
        assert!((output.intrinsics.cy - 480.0).abs() < 1e-3);
        assert!(output.rms < 1e-6);
    }

    #[test]
    fn test_refinement_keeps_exact_solution() {
        let intrinsics = Intrinsics::new(900.0, 900.0, 640.0, 480.0);
        let views = synthetic_views(&intrinsics, &Distortion::zero());
        let output = RadTanSolver::default()
            .solve(&views, Resolution::new(1280, 960))
            .unwrap();
        assert!((output.intrinsics.fx - 900.0).abs() < 1.0);
        assert!((output.intrinsics.fy - 900.0).abs() < 1.0);
        assert!(output.rms < 1e-3);
    }

    #[test]
    fn test_refinement_recovers_distortion() {
        let intrinsics = Intrinsics::new(900.0, 900.0, 640.0, 480.0);
        let views = synthetic_views(&intrinsics, &Distortion::radial(-0.15, 0.05));
        let output = RadTanSolver::default()
            .solve(&views, Resolution::new(1280, 960))
            .unwrap();
        assert!((output.distortion.k1 + 0.15).abs() < 1e-3);
        assert!((output.distortion.k2 - 0.05).abs() < 1e-3);
        assert!((output.intrinsics.fx - 900.0).abs() < 0.1);
        assert!(output.rms < 1e-3);
    }

    #[test]
    fn test_stalled_refinement_is_an_error() {
        let intrinsics = Intrinsics::new(900.0, 900.0, 640.0, 480.0);
        let views = synthetic_views(&intrinsics, &Distortion::radial(-0.15, 0.05));
        let solver = RadTanSolver::new(SolverOptions {
            max_iterations: 0,
            ..SolverOptions::default()
        });
        assert!(matches!(
            solver.solve(&views, Resolution::new(1280, 960)),
            Err(CameraModelError::NumericalError(_))
        ));
    }

    #[test]
    fn test_mismatched_view_is_rejected() {
        let intrinsics = Intrinsics::new(900.0, 900.0, 640.0, 480.0);
        let mut views = synthetic_views(&intrinsics, &Distortion::zero());
        views[1].image_points = views[1].image_points.columns(0, 3).into_owned();
        assert!(matches!(
            RadTanSolver::default().solve(&views, Resolution::new(1280, 960)),
            Err(CameraModelError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_two_views_are_insufficient() {
        let intrinsics = Intrinsics::new(900.0, 900.0, 640.0, 480.0);
        let views = synthetic_views(&intrinsics, &Distortion::zero());
        assert!(matches!(
            RadTanSolver::default().solve(&views[..2], Resolution::new(1280, 960)),
            Err(CameraModelError::InsufficientData { .. })
        ));
    }
}
