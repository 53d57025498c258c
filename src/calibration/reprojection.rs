//! Reprojection error metrics.
//!
//! Per-view error is the RMS Euclidean pixel distance between the reprojected
//! object points and the observations. The aggregate over a calibration run
//! is the RMS over *all* corner residuals of all views, which differs from
//! the mean of the per-view RMS values whenever views have unequal errors.
//! Both are reported.

use crate::calibration::View;
use crate::camera::{
    projection, CameraModel, CameraModelError, DepthPolicy, Distortion, Intrinsics, Pose,
};
use nalgebra::{Matrix2xX, Matrix3xX};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reprojection error of one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewError {
    pub name: String,
    pub rms: f64,
    /// Pixel distance per corner, index-aligned with the view's points.
    pub residuals: Vec<f64>,
}

/// Reprojects `view` with the shared camera parameters and its own pose.
pub fn view_reprojection_error(
    view: &View,
    intrinsics: &Intrinsics,
    distortion: &Distortion,
    pose: &Pose,
) -> ViewError {
    let projected = projection::project_points(
        &view.object_points,
        intrinsics,
        pose,
        Some(distortion),
        DepthPolicy::default(),
    );
    let residuals: Vec<f64> = projected
        .points
        .column_iter()
        .zip(view.image_points.column_iter())
        .map(|(p, o)| (p - o).norm())
        .collect();
    let rms = rms(&residuals);
    ViewError {
        name: view.name.clone(),
        rms,
        residuals,
    }
}

fn rms(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    let sum_squared: f64 = residuals.iter().map(|r| r * r).sum();
    (sum_squared / residuals.len() as f64).sqrt()
}

/// RMS over every corner residual of every view.
pub fn aggregate_rms(views: &[ViewError]) -> f64 {
    let (sum_squared, count) = views.iter().fold((0.0, 0usize), |(sum, n), view| {
        (
            sum + view.residuals.iter().map(|r| r * r).sum::<f64>(),
            n + view.residuals.len(),
        )
    });
    if count == 0 {
        return 0.0;
    }
    (sum_squared / count as f64).sqrt()
}

/// Arithmetic mean of the per-view RMS values.
pub fn mean_view_rms(views: &[ViewError]) -> f64 {
    if views.is_empty() {
        return 0.0;
    }
    views.iter().map(|v| v.rms).sum::<f64>() / views.len() as f64
}

/// Rough verdict on a calibration from its RMS error in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationQuality {
    /// Below 0.5 px.
    Excellent,
    /// 0.5 px up to 1 px.
    Good,
    /// Above 1 px.
    NeedsImprovement,
}

impl CalibrationQuality {
    pub fn from_rms(rms: f64) -> Self {
        if rms < 0.5 {
            CalibrationQuality::Excellent
        } else if rms <= 1.0 {
            CalibrationQuality::Good
        } else {
            CalibrationQuality::NeedsImprovement
        }
    }
}

impl fmt::Display for CalibrationQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CalibrationQuality::Excellent => "excellent (< 0.5 px)",
            CalibrationQuality::Good => "good (0.5-1.0 px)",
            CalibrationQuality::NeedsImprovement => "needs improvement (> 1.0 px)",
        };
        f.write_str(label)
    }
}

/// Summary statistics over a set of pixel residuals.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

impl ProjectionError {
    /// Statistics of `errors`, or `None` when it is empty.
    pub fn from_residuals(errors: &[f64]) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;

        let variance: f64 = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();

        let rmse = rms(errors);

        let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        let mut sorted_errors = errors.to_vec();
        sorted_errors.sort_by(f64::total_cmp);
        let median = if sorted_errors.len() % 2 == 0 {
            let mid = sorted_errors.len() / 2;
            (sorted_errors[mid - 1] + sorted_errors[mid]) / 2.0
        } else {
            sorted_errors[sorted_errors.len() / 2]
        };

        Some(ProjectionError {
            rmse,
            min,
            max,
            mean,
            stddev,
            median,
        })
    }

    /// Statistics over every corner of every view.
    pub fn from_views(views: &[ViewError]) -> Option<Self> {
        let all: Vec<f64> = views
            .iter()
            .flat_map(|v| v.residuals.iter().copied())
            .collect();
        Self::from_residuals(&all)
    }
}

/// Reprojection statistics of camera-frame points through a [`CameraModel`].
///
/// Points the model cannot project (behind the camera or outside the image)
/// are skipped.
///
/// # Errors
///
/// * [`CameraModelError::InvalidParams`] for mismatched point counts or when
///   no point projects.
pub fn compute_reprojection_error<T>(
    camera_model: &T,
    points3d: &Matrix3xX<f64>,
    points2d: &Matrix2xX<f64>,
) -> Result<ProjectionError, CameraModelError>
where
    T: ?Sized + CameraModel,
{
    if points3d.ncols() != points2d.ncols() {
        return Err(CameraModelError::InvalidParams(
            "Number of 2D and 3D points must match".to_string(),
        ));
    }
    let mut errors = vec![];
    for (point3d, point2d) in points3d.column_iter().zip(points2d.column_iter()) {
        if let Ok(projected) = camera_model.project(&point3d.into_owned()) {
            errors.push((projected - point2d).norm());
        }
    }

    ProjectionError::from_residuals(&errors).ok_or_else(|| {
        CameraModelError::InvalidParams("Zero projection points".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::PatternConfig;
    use crate::camera::{PinholeModel, Resolution};
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};

    fn consistent_view(distortion: &Distortion) -> (View, Intrinsics, Pose) {
        let intrinsics = Intrinsics::new(900.0, 900.0, 640.0, 480.0);
        let pose = Pose::from_euler_degrees(&[8.0, 10.0, 0.0], &Vector3::new(30.0, 25.0, 430.0));
        let object_points = PatternConfig::default().object_points();
        let image_points = projection::project_points(
            &object_points,
            &intrinsics,
            &pose,
            Some(distortion),
            DepthPolicy::default(),
        )
        .points;
        (
            View::new("consistent", object_points, image_points).unwrap(),
            intrinsics,
            pose,
        )
    }

    #[test]
    fn test_consistent_view_has_zero_error() {
        let distortion = Distortion::new(-0.15, 0.05, 0.001, 0.0, 0.0);
        let (view, intrinsics, pose) = consistent_view(&distortion);
        let error = view_reprojection_error(&view, &intrinsics, &distortion, &pose);
        assert_eq!(error.residuals.len(), 54);
        assert!(error.rms < 1e-9);
    }

    #[test]
    fn test_shifted_observations() {
        let distortion = Distortion::zero();
        let (mut view, intrinsics, pose) = consistent_view(&distortion);
        for mut column in view.image_points.column_iter_mut() {
            column[0] += 3.0;
            column[1] -= 4.0;
        }
        let error = view_reprojection_error(&view, &intrinsics, &distortion, &pose);
        assert_relative_eq!(error.rms, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_aggregate_is_not_mean_of_views() {
        let views = vec![
            ViewError {
                name: "a".to_string(),
                rms: 1.0,
                residuals: vec![1.0; 4],
            },
            ViewError {
                name: "b".to_string(),
                rms: 3.0,
                residuals: vec![3.0; 1],
            },
        ];
        // sqrt((4·1 + 9) / 5)
        assert_relative_eq!(aggregate_rms(&views), (13.0f64 / 5.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(mean_view_rms(&views), 2.0, epsilon = 1e-12);
        assert_eq!(aggregate_rms(&[]), 0.0);
    }

    #[test]
    fn test_projection_error_statistics() {
        let stats = ProjectionError::from_residuals(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_relative_eq!(stats.mean, 2.5);
        assert_relative_eq!(stats.median, 2.5);
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 4.0);
        assert_relative_eq!(stats.rmse, (30.0f64 / 4.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(stats.stddev, 1.25f64.sqrt(), epsilon = 1e-12);
        assert!(ProjectionError::from_residuals(&[]).is_none());
    }

    #[test]
    fn test_compute_reprojection_error_through_model() {
        let model = PinholeModel::new(
            Intrinsics::new(500.0, 500.0, 320.0, 240.0),
            Resolution::new(640, 480),
        )
        .unwrap();
        let points3d = Matrix3xX::from_columns(&[
            Vector3::new(0.1, 0.2, 1.0),
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::new(0.0, 0.0, -1.0),
        ]);
        let points2d = Matrix2xX::from_columns(&[
            Vector2::new(371.0, 340.0),
            Vector2::new(320.0, 240.0),
            Vector2::new(0.0, 0.0),
        ]);
        let stats = compute_reprojection_error(&model, &points3d, &points2d).unwrap();
        assert_relative_eq!(stats.max, 1.0, epsilon = 1e-9);
        assert_relative_eq!(stats.min, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_quality_bands() {
        assert_eq!(CalibrationQuality::from_rms(0.2), CalibrationQuality::Excellent);
        assert_eq!(CalibrationQuality::from_rms(0.7), CalibrationQuality::Good);
        assert_eq!(
            CalibrationQuality::from_rms(1.7),
            CalibrationQuality::NeedsImprovement
        );
    }
}
