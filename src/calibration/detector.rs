//! Corner detection seam and view assembly from images.

use crate::calibration::{PatternConfig, View};
use crate::camera::CameraModelError;
use image::GrayImage;
use log::{info, warn};
use nalgebra::Matrix2xX;

/// Finds the interior corners of a chessboard in a grayscale image.
///
/// Implementations return `None` when the board is not found, otherwise the
/// `cols·rows` corners in the row-major order of
/// [`PatternConfig::object_points`], refined to sub-pixel precision.
pub trait CornerDetector {
    fn detect(&self, image: &GrayImage, pattern: &PatternConfig) -> Option<Matrix2xX<f64>>;
}

/// Runs the detector on one image and pairs the result with the pattern's
/// object points.
///
/// # Errors
///
/// * [`CameraModelError::DetectionFailure`] if the board is not found or the
///   corner count does not match the pattern.
pub fn detect_view<D>(
    detector: &D,
    name: &str,
    image: &GrayImage,
    pattern: &PatternConfig,
) -> Result<View, CameraModelError>
where
    D: ?Sized + CornerDetector,
{
    let corners = detector.detect(image, pattern).ok_or_else(|| {
        CameraModelError::DetectionFailure(format!("{name}: chessboard not found"))
    })?;
    if corners.ncols() != pattern.corner_count() {
        return Err(CameraModelError::DetectionFailure(format!(
            "{name}: expected {} corners, detector returned {}",
            pattern.corner_count(),
            corners.ncols()
        )));
    }
    View::new(name, pattern.object_points(), corners)
}

/// Detects the board in every image and keeps the views that succeed.
///
/// Detection failures are logged and skipped; the order of the surviving
/// views follows the input order.
pub fn collect_views<D>(
    images: &[(String, GrayImage)],
    detector: &D,
    pattern: &PatternConfig,
) -> Vec<View>
where
    D: ?Sized + CornerDetector,
{
    let mut views = Vec::with_capacity(images.len());
    for (name, image) in images {
        match detect_view(detector, name, image, pattern) {
            Ok(view) => views.push(view),
            Err(err) => warn!("Skipping view: {err}"),
        }
    }
    info!("Corners detected in {}/{} images", views.len(), images.len());
    views
}
