//! Undistortion seam.
//!
//! Removing lens distortion from an image needs an iterative inverse of the
//! distortion polynomial and a resampler. Both live behind [`Undistorter`].

use crate::camera::{validation, CameraModelError, Distortion, Intrinsics};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Pixel rectangle of the valid region in an undistorted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct Undistorted {
    pub image: GrayImage,
    /// Camera matrix of the corrected image.
    pub intrinsics: Intrinsics,
    pub roi: Roi,
}

impl Undistorted {
    /// The valid region copied out of the corrected image.
    pub fn cropped(&self) -> GrayImage {
        image::imageops::crop_imm(
            &self.image,
            self.roi.x,
            self.roi.y,
            self.roi.width,
            self.roi.height,
        )
        .to_image()
    }
}

/// Produces a distortion-free image.
///
/// `alpha = 0` crops to pixels that are valid after correction, `alpha = 1`
/// keeps every source pixel.
pub trait Undistorter {
    fn undistort(
        &self,
        image: &GrayImage,
        intrinsics: &Intrinsics,
        distortion: &Distortion,
        alpha: f64,
    ) -> Result<Undistorted, CameraModelError>;
}

/// Validates the request and hands it to `undistorter`.
///
/// # Errors
///
/// * [`CameraModelError::InvalidParams`] if `alpha` is outside `[0, 1]` or the
///   returned region does not fit the returned image.
/// * Errors from intrinsics validation and from the undistorter itself.
pub fn undistort_image<U>(
    undistorter: &U,
    image: &GrayImage,
    intrinsics: &Intrinsics,
    distortion: &Distortion,
    alpha: f64,
) -> Result<Undistorted, CameraModelError>
where
    U: ?Sized + Undistorter,
{
    if !(0.0..=1.0).contains(&alpha) {
        return Err(CameraModelError::InvalidParams(format!(
            "alpha must be within [0, 1], got {alpha}"
        )));
    }
    validation::validate_intrinsics(intrinsics)?;

    let result = undistorter.undistort(image, intrinsics, distortion, alpha)?;
    let roi = result.roi;
    if u64::from(roi.x) + u64::from(roi.width) > u64::from(result.image.width())
        || u64::from(roi.y) + u64::from(roi.height) > u64::from(result.image.height())
    {
        return Err(CameraModelError::InvalidParams(format!(
            "valid region {roi:?} exceeds the undistorted image"
        )));
    }
    Ok(result)
}
