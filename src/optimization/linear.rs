//! Closed-form initialisation for planar calibration.
//!
//! A planar target at `Z = 0` is related to its image by a homography
//! `H ~ K·[r1 r2 t]`. This module estimates `H` per view with a normalised
//! DLT, recovers `K` from three or more homographies, and decomposes each
//! homography back into a pose once `K` is known. Lens distortion is ignored
//! here and left to the nonlinear refinement.

use crate::camera::{CameraModelError, Intrinsics, Pose, Resolution};
use log::debug;
use nalgebra::{DMatrix, DVector, Matrix2xX, Matrix3, Matrix3xX, Vector2, Vector3};

/// Minimum number of homographies for the closed-form intrinsics.
pub const MIN_HOMOGRAPHIES: usize = 3;

/// Tolerance on `|Z|` for object points to count as planar.
const PLANAR_TOLERANCE: f64 = 1e-9;

/// Right singular vector belonging to the smallest singular value of `a`,
/// i.e. the least-squares solution of `a·x = 0` with `|x| = 1`.
fn null_vector(a: DMatrix<f64>) -> Result<DVector<f64>, CameraModelError> {
    let cols = a.ncols();
    // A thin SVD of a wide matrix drops the null space, pad to square.
    let a = if a.nrows() < cols {
        a.resize_vertically(cols, 0.0)
    } else {
        a
    };

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or_else(|| {
        CameraModelError::NumericalError("SVD did not produce right singular vectors".to_string())
    })?;
    let (min_index, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best_i, best), (i, s)| {
            if *s < best {
                (i, *s)
            } else {
                (best_i, best)
            }
        });
    Ok(v_t.row(min_index).transpose())
}

/// Similarity transform moving `points` to their centroid and scaling them to
/// a mean distance of `sqrt(2)` (Hartley normalisation).
fn normalization_transform(points: &[Vector2<f64>]) -> Result<Matrix3<f64>, CameraModelError> {
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n;
    let mean_distance = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if mean_distance < f64::EPSILON {
        return Err(CameraModelError::DegenerateGeometry(
            "all points coincide".to_string(),
        ));
    }
    let s = std::f64::consts::SQRT_2 / mean_distance;
    Ok(Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    ))
}

fn apply_homography(h: &Matrix3<f64>, point: &Vector2<f64>) -> Vector2<f64> {
    let p = h * Vector3::new(point.x, point.y, 1.0);
    Vector2::new(p.x / p.z, p.y / p.z)
}

/// Estimates the homography taking the `(X, Y)` plane coordinates of
/// `object_points` to `image_points`.
///
/// # Errors
///
/// * [`CameraModelError::InvalidParams`] for mismatched counts, fewer than 4
///   points, or object points off the `Z = 0` plane.
/// * [`CameraModelError::DegenerateGeometry`] when the points coincide.
pub fn estimate_homography(
    object_points: &Matrix3xX<f64>,
    image_points: &Matrix2xX<f64>,
) -> Result<Matrix3<f64>, CameraModelError> {
    let n = object_points.ncols();
    if n != image_points.ncols() {
        return Err(CameraModelError::InvalidParams(
            "Number of 2D and 3D points must match".to_string(),
        ));
    }
    if n < 4 {
        return Err(CameraModelError::InvalidParams(format!(
            "Homography needs at least 4 points, got {n}"
        )));
    }
    if object_points.row(2).iter().any(|z| z.abs() > PLANAR_TOLERANCE) {
        return Err(CameraModelError::InvalidParams(
            "Object points must lie on the Z = 0 plane".to_string(),
        ));
    }

    let world: Vec<Vector2<f64>> = object_points
        .column_iter()
        .map(|c| Vector2::new(c[0], c[1]))
        .collect();
    let image: Vec<Vector2<f64>> = image_points.column_iter().map(|c| c.into_owned()).collect();

    let t_world = normalization_transform(&world)?;
    let t_image = normalization_transform(&image)?;

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (pw, pi)) in world.iter().zip(image.iter()).enumerate() {
        let w = apply_homography(&t_world, pw);
        let m = apply_homography(&t_image, pi);
        let (x, y, u, v) = (w.x, w.y, m.x, m.y);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let h = null_vector(a)?;
    let h_normalized = Matrix3::from_row_slice(h.as_slice());

    let t_image_inv = t_image.try_inverse().ok_or_else(|| {
        CameraModelError::DegenerateGeometry("image normalisation is singular".to_string())
    })?;
    let mut h_mat = t_image_inv * h_normalized * t_world;

    let scale = h_mat[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h_mat /= scale;
    } else {
        h_mat /= h_mat.norm();
    }
    Ok(h_mat)
}

/// The 6-vector `v_ij(H)` of Zhang's constraint `v_ij·b = h_iᵀ·B·h_j`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 6] {
    let hi = h.column(i);
    let hj = h.column(j);
    [
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ]
}

/// Closed-form intrinsics from plane homographies (Zhang's method).
///
/// Homographies are first re-expressed in a pixel frame centred on the image
/// and scaled by its width, which keeps the 6x6 system well conditioned.
/// The skew estimate is discarded.
///
/// # Errors
///
/// * [`CameraModelError::InsufficientData`] with fewer than
///   [`MIN_HOMOGRAPHIES`] homographies.
/// * [`CameraModelError::DegenerateGeometry`] when the views do not constrain
///   `K` (for example all boards parallel to the image plane).
pub fn estimate_intrinsics(
    homographies: &[Matrix3<f64>],
    resolution: Resolution,
) -> Result<Intrinsics, CameraModelError> {
    if homographies.len() < MIN_HOMOGRAPHIES {
        return Err(CameraModelError::InsufficientData {
            found: homographies.len(),
            required: MIN_HOMOGRAPHIES,
        });
    }

    let s = f64::from(resolution.width.max(1));
    let half_w = f64::from(resolution.width) / 2.0;
    let half_h = f64::from(resolution.height) / 2.0;
    let pixel_frame = Matrix3::new(
        1.0 / s,
        0.0,
        -half_w / s,
        0.0,
        1.0 / s,
        -half_h / s,
        0.0,
        0.0,
        1.0,
    );

    let m = homographies.len();
    let mut v = DMatrix::<f64>::zeros(2 * m, 6);
    for (k, h) in homographies.iter().enumerate() {
        let h = pixel_frame * h;
        let h = h / h.norm();
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);
        for c in 0..6 {
            v[(2 * k, c)] = v12[c];
            v[(2 * k + 1, c)] = v11[c] - v22[c];
        }
    }

    let mut b = null_vector(v)?;
    if b[0] < 0.0 {
        b = -b;
    }
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_rel = denom / (b11 * b11 + b22 * b22).max(f64::MIN_POSITIVE);
    if !(denom_rel > 1e-9) {
        return Err(CameraModelError::DegenerateGeometry(
            "homographies do not constrain the intrinsics".to_string(),
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if !(lambda > 0.0) {
        return Err(CameraModelError::DegenerateGeometry(format!(
            "invalid scale in closed-form intrinsics (lambda = {lambda:e})"
        )));
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;
    debug!("closed-form skew {gamma:e} discarded");

    let intrinsics = Intrinsics::new(s * alpha, s * beta, s * u0 + half_w, s * v0 + half_h);
    if !intrinsics.fx.is_finite() || !intrinsics.fy.is_finite() {
        return Err(CameraModelError::DegenerateGeometry(
            "closed-form focal length is not finite".to_string(),
        ));
    }
    Ok(intrinsics)
}

/// Decomposes `H ~ K·[r1 r2 t]` into a pose, with the board in front of the
/// camera.
///
/// # Errors
///
/// * [`CameraModelError::DegenerateGeometry`] if `H` has a null first column
///   or the recovered rotation is not proper.
pub fn pose_from_homography(
    intrinsics: &Intrinsics,
    h: &Matrix3<f64>,
) -> Result<Pose, CameraModelError> {
    let k_inv = intrinsics.matrix().try_inverse().ok_or_else(|| {
        CameraModelError::DegenerateGeometry("intrinsic matrix is singular".to_string())
    })?;
    let a = k_inv * h;
    let a1 = a.column(0).into_owned();
    let a2 = a.column(1).into_owned();
    let a3 = a.column(2).into_owned();

    let norm = 0.5 * (a1.norm() + a2.norm());
    if norm < f64::EPSILON {
        return Err(CameraModelError::DegenerateGeometry(
            "homography has vanishing rotation columns".to_string(),
        ));
    }
    let mut lambda = 1.0 / norm;
    if lambda * a3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = a1 * lambda;
    let r2 = a2 * lambda;
    let r3 = r1.cross(&r2);
    let t = a3 * lambda;

    let q = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = q.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(CameraModelError::NumericalError(
                "SVD failed while orthogonalising rotation".to_string(),
            ))
        }
    };
    let rotation = u * v_t;

    Pose::new(&rotation, &t)
}
