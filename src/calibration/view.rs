//! One calibration view: the fixed object-point grid paired with its
//! observed image points.

use crate::camera::CameraModelError;
use nalgebra::{Matrix2xX, Matrix3xX};
use serde::{Deserialize, Serialize};

/// Index-aligned object and image points of a single board observation.
///
/// Column `i` of `object_points` and column `i` of `image_points` describe
/// the same physical corner.
///
/// The fields stay public, so code that edits them after construction should
/// call [`View::validate`] again. Deserialization always goes through
/// [`View::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ViewRecord")]
pub struct View {
    pub name: String,
    pub object_points: Matrix3xX<f64>,
    pub image_points: Matrix2xX<f64>,
}

#[derive(Deserialize)]
struct ViewRecord {
    name: String,
    object_points: Matrix3xX<f64>,
    image_points: Matrix2xX<f64>,
}

impl TryFrom<ViewRecord> for View {
    type Error = CameraModelError;

    fn try_from(record: ViewRecord) -> Result<Self, Self::Error> {
        View::new(record.name, record.object_points, record.image_points)
    }
}

impl View {
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] if the point sets differ in
    ///   length or are empty.
    pub fn new(
        name: impl Into<String>,
        object_points: Matrix3xX<f64>,
        image_points: Matrix2xX<f64>,
    ) -> Result<Self, CameraModelError> {
        let view = View {
            name: name.into(),
            object_points,
            image_points,
        };
        view.validate()?;
        Ok(view)
    }

    /// Checks that both point sets are non-empty and of equal length.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] naming the view otherwise.
    pub fn validate(&self) -> Result<(), CameraModelError> {
        if self.object_points.ncols() != self.image_points.ncols() {
            return Err(CameraModelError::InvalidParams(format!(
                "View {}: number of 2D and 3D points must match ({} vs {})",
                self.name,
                self.image_points.ncols(),
                self.object_points.ncols()
            )));
        }
        if self.object_points.ncols() == 0 {
            return Err(CameraModelError::InvalidParams(format!(
                "View {}: points arrays cannot be empty",
                self.name
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.object_points.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.object_points.ncols() == 0
    }
}
