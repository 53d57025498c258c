//! Persisted calibration state.
//!
//! The minimal artifact a downstream undistortion step needs: the camera
//! matrix as nine row-major values and the five distortion coefficients.
//! Stored as YAML; floats are written in shortest round-trip form so a
//! save/load cycle reproduces every value bit for bit.

use crate::camera::{CameraModelError, Distortion, Intrinsics, RadTanModel, Resolution};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    /// `K` in row-major order.
    pub camera_matrix: [f64; 9],
    /// `[k1, k2, p1, p2, k3]`.
    pub distortion: [f64; 5],
    pub resolution: Resolution,
    /// Aggregate RMS reprojection error in pixels.
    pub rms: f64,
}

impl CalibrationFile {
    pub fn new(
        intrinsics: &Intrinsics,
        distortion: &Distortion,
        resolution: Resolution,
        rms: f64,
    ) -> Self {
        let k = intrinsics.matrix();
        let mut camera_matrix = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                camera_matrix[row * 3 + col] = k[(row, col)];
            }
        }
        CalibrationFile {
            camera_matrix,
            distortion: distortion.as_array(),
            resolution,
            rms,
        }
    }

    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] if the stored matrix is not a
    ///   valid skew-free intrinsic matrix.
    pub fn intrinsics(&self) -> Result<Intrinsics, CameraModelError> {
        Intrinsics::from_matrix(&nalgebra::Matrix3::from_row_slice(&self.camera_matrix))
    }

    pub fn distortion(&self) -> Distortion {
        Distortion::from_array(self.distortion)
    }

    pub fn to_camera_model(&self) -> Result<RadTanModel, CameraModelError> {
        RadTanModel::from_parts(self.intrinsics()?, self.distortion(), self.resolution)
    }

    pub fn save(&self, path: &str) -> Result<(), CameraModelError> {
        let yaml_string = serde_yaml::to_string(self)?;
        fs::write(path, yaml_string)?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let file: CalibrationFile = serde_yaml::from_str(&contents)?;
        file.intrinsics()?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraModel;

    fn sample() -> CalibrationFile {
        CalibrationFile::new(
            &Intrinsics::new(901.2345678901234, 899.8765432109876, 641.1, 479.3),
            &Distortion::new(-0.1498765432, 0.0512345678, 1.2e-5, -3.4e-6, 0.0),
            Resolution::new(1280, 960),
            0.123456789012345,
        )
    }

    #[test]
    fn test_camera_matrix_row_major() {
        let file = sample();
        assert_eq!(file.camera_matrix[0], 901.2345678901234);
        assert_eq!(file.camera_matrix[2], 641.1);
        assert_eq!(file.camera_matrix[4], 899.8765432109876);
        assert_eq!(file.camera_matrix[5], 479.3);
        assert_eq!(&file.camera_matrix[6..], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_yaml_round_trip_is_exact() {
        fs::create_dir_all("output").expect("Failed to create output directory for test.");
        let path = "output/calibration_round_trip.yaml";

        let file = sample();
        file.save(path).unwrap();
        let loaded = CalibrationFile::load(path).unwrap();
        assert_eq!(loaded, file);
        for (a, b) in loaded.camera_matrix.iter().zip(file.camera_matrix.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        for (a, b) in loaded.distortion.iter().zip(file.distortion.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_to_camera_model() {
        let model = sample().to_camera_model().unwrap();
        assert_eq!(model.get_resolution(), Resolution::new(1280, 960));
        assert_eq!(model.distortion.k1, -0.1498765432);
        assert_eq!(model.intrinsics.cy, 479.3);
    }

    #[test]
    fn test_rejects_bad_camera_matrix() {
        let mut file = sample();
        file.camera_matrix[8] = 2.0;
        assert!(matches!(
            file.to_camera_model(),
            Err(CameraModelError::InvalidParams(_))
        ));
    }
}
