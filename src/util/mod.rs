use crate::calibration::CalibrationResult;
use crate::camera::CameraModelError;
use image::GrayImage;
use log::info;
use nalgebra::{Matrix2xX, Matrix3xX};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum UtilError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("I/O error: {0}")]
    IOError(String),
    #[error("Image error: {0}")]
    ImageError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error(transparent)]
    CameraModel(#[from] CameraModelError),
}

impl From<std::io::Error> for UtilError {
    fn from(err: std::io::Error) -> Self {
        UtilError::IOError(err.to_string())
    }
}

impl From<image::ImageError> for UtilError {
    fn from(err: image::ImageError) -> Self {
        UtilError::ImageError(err.to_string())
    }
}

impl From<csv::Error> for UtilError {
    fn from(err: csv::Error) -> Self {
        UtilError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for UtilError {
    fn from(err: serde_json::Error) -> Self {
        UtilError::SerializationError(err.to_string())
    }
}

/// Creates `dir` and its parents if missing.
pub fn ensure_output_dir(dir: &str) -> Result<(), UtilError> {
    let output_dir = Path::new(dir);
    if !output_dir.exists() {
        fs::create_dir_all(output_dir).map_err(|e| {
            UtilError::IOError(format!("Failed to create output directory {dir}: {e}"))
        })?;
    }
    Ok(())
}

/// Loads an image from disk as 8-bit greyscale.
pub fn load_gray_image(image_path: &str) -> Result<GrayImage, UtilError> {
    let img = image::open(image_path)
        .map_err(|e| UtilError::ImageError(format!("Failed to load {image_path}: {e}")))?;
    Ok(img.to_luma8())
}

/// Saves `image` under `dir/name`, creating `dir` first. Returns the path.
pub fn save_gray_image(image: &GrayImage, dir: &str, name: &str) -> Result<String, UtilError> {
    ensure_output_dir(dir)?;
    let filename = Path::new(dir).join(name).to_string_lossy().into_owned();
    image.save(&filename)?;
    info!("Saved image {filename}");
    Ok(filename)
}

/// Writes 3D-2D correspondences as `x3d,y3d,z3d,x2d,y2d` rows with a header.
///
/// # Errors
///
/// * [`UtilError::InvalidParams`] when the point counts differ.
pub fn export_point_correspondences(
    points_3d: &Matrix3xX<f64>,
    points_2d: &Matrix2xX<f64>,
    path: &str,
) -> Result<(), UtilError> {
    if points_3d.ncols() != points_2d.ncols() {
        return Err(UtilError::InvalidParams(
            "3D and 2D point counts must match".to_string(),
        ));
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["x3d", "y3d", "z3d", "x2d", "y2d"])?;
    for (p3d, p2d) in points_3d.column_iter().zip(points_2d.column_iter()) {
        writer.write_record(&[
            format!("{:.15}", p3d[0]),
            format!("{:.15}", p3d[1]),
            format!("{:.15}", p3d[2]),
            format!("{:.15}", p2d[0]),
            format!("{:.15}", p2d[1]),
        ])?;
    }
    writer.flush()?;

    info!(
        "Exported {} point correspondences to {path}",
        points_3d.ncols()
    );
    Ok(())
}

/// Pretty-prints `value` as JSON into `path`.
pub fn export_json<T: Serialize + ?Sized>(value: &T, path: &str) -> Result<(), UtilError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    info!("Wrote {path}");
    Ok(())
}

/// Writes a human readable calibration report.
pub fn export_calibration_report(result: &CalibrationResult, path: &str) -> Result<(), UtilError> {
    let mut report = File::create(path)?;
    let k = &result.intrinsics;
    let d = &result.distortion;

    writeln!(report, "CAMERA CALIBRATION REPORT")?;
    writeln!(report, "=========================")?;
    writeln!(report)?;
    writeln!(
        report,
        "Resolution: {}x{}",
        result.resolution.width, result.resolution.height
    )?;
    writeln!(report, "Views used: {}", result.view_errors.len())?;
    writeln!(report)?;
    writeln!(report, "Camera matrix:")?;
    writeln!(report, "  fx = {:.4}, fy = {:.4}", k.fx, k.fy)?;
    writeln!(report, "  cx = {:.4}, cy = {:.4}", k.cx, k.cy)?;
    writeln!(report, "Distortion [k1 k2 p1 p2 k3]:")?;
    writeln!(
        report,
        "  [{:.6} {:.6} {:.6} {:.6} {:.6}]",
        d.k1, d.k2, d.p1, d.p2, d.k3
    )?;
    writeln!(report)?;
    writeln!(report, "{:<16} | {:>12}", "View", "RMS (px)")?;
    writeln!(report, "{}", "-".repeat(31))?;
    for view in &result.view_errors {
        writeln!(report, "{:<16} | {:>12.4}", view.name, view.rms)?;
    }
    writeln!(report)?;
    writeln!(report, "RMS over all corners: {:.4} px", result.rms)?;
    writeln!(report, "Mean per-view RMS:    {:.4} px", result.mean_view_rms())?;
    if let Some(stats) = result.statistics() {
        writeln!(
            report,
            "Residuals: min {:.4}, median {:.4}, max {:.4} px",
            stats.min, stats.median, stats.max
        )?;
    }
    writeln!(report, "Quality: {}", result.quality())?;

    info!("Wrote calibration report {path}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::ViewError;
    use crate::camera::{Distortion, Intrinsics, Pose, Resolution};
    use nalgebra::{Vector2, Vector3};

    const TEST_DIR: &str = "output/util_tests";

    #[test]
    fn test_export_point_correspondences() {
        ensure_output_dir(TEST_DIR).unwrap();
        let path = format!("{TEST_DIR}/correspondences.csv");
        let points_3d = Matrix3xX::from_columns(&[
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(25.0, 0.0, 0.0),
        ]);
        let points_2d =
            Matrix2xX::from_columns(&[Vector2::new(640.0, 480.0), Vector2::new(696.25, 480.0)]);
        export_point_correspondences(&points_3d, &points_2d, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<Vec<f64>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(|v| v.parse().unwrap()).collect())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![25.0, 0.0, 0.0, 696.25, 480.0]);
    }

    #[test]
    fn test_mismatched_correspondences() {
        let points_3d = Matrix3xX::from_columns(&[Vector3::new(0.0, 0.0, 1.0)]);
        let points_2d = Matrix2xX::zeros(0);
        assert!(matches!(
            export_point_correspondences(&points_3d, &points_2d, "unused.csv"),
            Err(UtilError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_gray_image_round_trip() {
        let image = GrayImage::from_fn(8, 4, |x, y| image::Luma([(x * 10 + y) as u8]));
        let path = save_gray_image(&image, TEST_DIR, "round_trip.png").unwrap();
        assert_eq!(load_gray_image(&path).unwrap(), image);
    }

    #[test]
    fn test_report_and_json() {
        ensure_output_dir(TEST_DIR).unwrap();
        let result = CalibrationResult {
            intrinsics: Intrinsics::new(900.0, 900.0, 640.0, 480.0),
            distortion: Distortion::radial(-0.15, 0.05),
            poses: vec![Pose::identity()],
            view_errors: vec![ViewError {
                name: "calib_000".to_string(),
                rms: 0.25,
                residuals: vec![0.25; 4],
            }],
            rms: 0.25,
            solver_rms: 0.25,
            resolution: Resolution::new(1280, 960),
        };
        let report_path = format!("{TEST_DIR}/report.txt");
        export_calibration_report(&result, &report_path).unwrap();
        let report = fs::read_to_string(&report_path).unwrap();
        assert!(report.contains("calib_000"));
        assert!(report.contains("Quality: excellent"));

        let json_path = format!("{TEST_DIR}/result.json");
        export_json(&result, &json_path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value["intrinsics"]["fx"], 900.0);
    }
}
