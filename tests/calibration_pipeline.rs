use pinhole_calib::calibration::{CalibrationConfig, CalibrationFile, Calibrator, View};
use pinhole_calib::camera::{CameraModel, CameraModelError, Distortion};
use pinhole_calib::optimization::{RadTanSolver, SolverOptions};
use pinhole_calib::synthetic::{default_views, SyntheticConfig, SyntheticGenerator};
use pinhole_calib::util;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn noise_free_config(distortion: Distortion) -> SyntheticConfig {
    SyntheticConfig {
        distortion,
        noise_sigma: 0.0,
        ..SyntheticConfig::default()
    }
}

fn synthetic_views(config: &SyntheticConfig) -> Vec<View> {
    SyntheticGenerator::new(config.clone())
        .unwrap()
        .generate_views(&default_views())
        .unwrap()
        .into_iter()
        .map(|s| s.view)
        .collect()
}

fn calibrator(config: &SyntheticConfig, refine: bool) -> Calibrator<RadTanSolver> {
    Calibrator::new(
        CalibrationConfig {
            pattern: config.pattern.clone(),
            resolution: config.resolution,
            ..CalibrationConfig::default()
        },
        RadTanSolver::new(SolverOptions {
            refine,
            ..SolverOptions::default()
        }),
    )
}

#[test]
fn closed_form_recovers_distortion_free_camera() {
    init_logger();
    let config = noise_free_config(Distortion::zero());
    let views = synthetic_views(&config);
    assert!(views.len() >= 3);

    let result = calibrator(&config, false).calibrate(&views).unwrap();
    assert_eq!(result.poses.len(), views.len());
    assert!((result.intrinsics.fx - 900.0).abs() < 1e-3);
    assert!((result.intrinsics.fy - 900.0).abs() < 1e-3);
    assert!((result.intrinsics.cx - 640.0).abs() < 1e-3);
    assert!((result.intrinsics.cy - 480.0).abs() < 1e-3);
    assert!(result.rms < 1e-6);
}

#[test]
fn refinement_recovers_distorted_camera() {
    init_logger();
    let config = noise_free_config(Distortion::radial(-0.15, 0.05));
    let views = synthetic_views(&config);
    assert_eq!(views.len(), default_views().len());

    let result = calibrator(&config, true).calibrate(&views).unwrap();
    assert!((result.distortion.k1 + 0.15).abs() < 1e-3);
    assert!((result.distortion.k2 - 0.05).abs() < 1e-3);
    assert!((result.intrinsics.fx - 900.0).abs() < 0.1);
    assert!((result.intrinsics.fy - 900.0).abs() < 0.1);
    assert!((result.intrinsics.cx - 640.0).abs() < 0.1);
    assert!((result.intrinsics.cy - 480.0).abs() < 0.1);
    assert!(result.rms < 1e-3, "rms {}", result.rms);
}

#[test]
fn two_views_are_rejected_before_solving() {
    init_logger();
    let config = noise_free_config(Distortion::zero());
    let views = synthetic_views(&config);
    let result = calibrator(&config, true).calibrate(&views[..2]);
    assert!(matches!(
        result,
        Err(CameraModelError::InsufficientData {
            found: 2,
            required: 3
        })
    ));
}

#[test]
fn calibration_file_reloads_as_camera_model() {
    init_logger();
    let config = noise_free_config(Distortion::zero());
    let views = synthetic_views(&config);
    let result = calibrator(&config, false).calibrate(&views).unwrap();

    let dir = "output/pipeline_tests";
    util::ensure_output_dir(dir).unwrap();
    let path = format!("{dir}/calibration.yaml");
    result.to_file().save(&path).unwrap();

    let loaded = CalibrationFile::load(&path).unwrap();
    assert_eq!(loaded, result.to_file());
    let model = loaded.to_camera_model().unwrap();
    assert_eq!(model.get_intrinsics(), result.intrinsics);
    assert_eq!(model.get_resolution(), config.resolution);
    assert_eq!(model.get_distortion(), result.distortion.as_array().to_vec());
}
