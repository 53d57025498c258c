//! Rasterisation of chessboard images.
//!
//! The board is drawn straight from the projected interior corners, so lens
//! distortion shows up in the rendered edges. Cells on the rim of the board
//! need corners that are never projected; they come from
//! [`extrapolate_border`].

use crate::calibration::PatternConfig;
use crate::camera::{CameraModelError, Resolution};
use image::{GrayImage, Luma};
use nalgebra::{Matrix2xX, Vector2};
use rand::Rng;

/// Intensity of even `(r + c)` cells.
pub const DARK: u8 = 0;
/// Intensity of odd `(r + c)` cells and of the outline.
pub const LIGHT: u8 = 255;
/// Outline width around the full board, in pixels.
pub const OUTLINE_THICKNESS: i64 = 3;

/// Grows a row-major `rows × cols` corner grid by one point on every side.
///
/// Left and right border points continue the first and last step of each
/// interior row: `g[r,0] + (g[r,0] - g[r,1])` and
/// `g[r,cols-1] + (g[r,cols-1] - g[r,cols-2])`. The top and bottom border rows
/// are then extrapolated the same way down every column of the widened grid,
/// corners included. The result is row-major with `(rows + 2) × (cols + 2)`
/// points.
///
/// This is a first-order approximation. Under perspective the spacing of the
/// grid shrinks with depth, so the extrapolated rim is only close to the true
/// projection while corner spacing varies slowly across the board.
///
/// # Errors
///
/// * [`CameraModelError::InvalidParams`] if the grid is smaller than 2x2 or
///   does not hold `rows·cols` points.
pub fn extrapolate_border(
    grid: &Matrix2xX<f64>,
    rows: usize,
    cols: usize,
) -> Result<Matrix2xX<f64>, CameraModelError> {
    if rows < 2 || cols < 2 {
        return Err(CameraModelError::InvalidParams(format!(
            "Border extrapolation needs at least 2x2 corners, got {rows}x{cols}"
        )));
    }
    if grid.ncols() != rows * cols {
        return Err(CameraModelError::InvalidParams(format!(
            "Expected {} grid points, got {}",
            rows * cols,
            grid.ncols()
        )));
    }

    let full_cols = cols + 2;
    let at = |r: usize, c: usize| -> Vector2<f64> { grid.column(r * cols + c).into_owned() };
    let mut full = Matrix2xX::zeros((rows + 2) * full_cols);

    for r in 0..rows {
        for c in 0..cols {
            full.set_column((r + 1) * full_cols + c + 1, &at(r, c));
        }
        let left = at(r, 0) + (at(r, 0) - at(r, 1));
        let right = at(r, cols - 1) + (at(r, cols - 1) - at(r, cols - 2));
        full.set_column((r + 1) * full_cols, &left);
        full.set_column((r + 1) * full_cols + cols + 1, &right);
    }

    for c in 0..full_cols {
        let first = full.column(full_cols + c).into_owned();
        let second = full.column(2 * full_cols + c).into_owned();
        let last = full.column(rows * full_cols + c).into_owned();
        let before_last = full.column((rows - 1) * full_cols + c).into_owned();
        full.set_column(c, &(first + (first - second)));
        full.set_column((rows + 1) * full_cols + c, &(last + (last - before_last)));
    }

    Ok(full)
}

fn set_pixel(image: &mut GrayImage, x: i64, y: i64, value: u8) {
    if x >= 0 && x < image.width() as i64 && y >= 0 && y < image.height() as i64 {
        image.put_pixel(x as u32, y as u32, Luma([value]));
    }
}

/// Truncates toward zero, the way pixel vertices are snapped before filling.
fn snap(point: &Vector2<f64>) -> (i64, i64) {
    (point.x as i64, point.y as i64)
}

/// Fills a convex polygon, boundary included, by scanning each pixel row.
pub fn fill_convex_polygon(image: &mut GrayImage, vertices: &[Vector2<f64>], value: u8) {
    if vertices.is_empty() {
        return;
    }
    let snapped: Vec<(i64, i64)> = vertices.iter().map(snap).collect();
    let y_min = snapped.iter().map(|p| p.1).min().unwrap_or(0).max(0);
    let y_max = snapped
        .iter()
        .map(|p| p.1)
        .max()
        .unwrap_or(-1)
        .min(image.height() as i64 - 1);

    for y in y_min..=y_max {
        let mut x_min = f64::INFINITY;
        let mut x_max = f64::NEG_INFINITY;
        for i in 0..snapped.len() {
            let (x0, y0) = snapped[i];
            let (x1, y1) = snapped[(i + 1) % snapped.len()];
            if y < y0.min(y1) || y > y0.max(y1) {
                continue;
            }
            if y0 == y1 {
                x_min = x_min.min(x0.min(x1) as f64);
                x_max = x_max.max(x0.max(x1) as f64);
            } else {
                let x = x0 as f64 + (y - y0) as f64 * (x1 - x0) as f64 / (y1 - y0) as f64;
                x_min = x_min.min(x);
                x_max = x_max.max(x);
            }
        }
        if x_min > x_max {
            continue;
        }
        let start = (x_min.round() as i64).max(0);
        let end = (x_max.round() as i64).min(image.width() as i64 - 1);
        for x in start..=end {
            image.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
}

/// Bresenham line with a square brush of side `thickness`.
pub fn draw_line(image: &mut GrayImage, p0: (i64, i64), p1: (i64, i64), value: u8, thickness: i64) {
    let (mut x0, mut y0) = p0;
    let (x1, y1) = p1;

    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx - dy;
    let half = (thickness.max(1) - 1) / 2;

    loop {
        for i in -half..=half {
            for j in -half..=half {
                set_pixel(image, x0 + i, y0 + j, value);
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x0 += sx;
        }
        if e2 < dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Closed polyline through `vertices`.
pub fn draw_closed_polyline(
    image: &mut GrayImage,
    vertices: &[Vector2<f64>],
    value: u8,
    thickness: i64,
) {
    for i in 0..vertices.len() {
        let a = snap(&vertices[i]);
        let b = snap(&vertices[(i + 1) % vertices.len()]);
        draw_line(image, a, b, value, thickness);
    }
}

/// Renders a chessboard from its projected interior corners.
///
/// The canvas is filled with `background`. Each of the
/// `(rows + 1) × (cols + 1)` cells spanned by the extrapolated grid is a
/// quadrilateral `g[r,c], g[r,c+1], g[r+1,c+1], g[r+1,c]`, dark when `r + c`
/// is even and light otherwise. A light outline is drawn around the board.
///
/// # Errors
///
/// * [`CameraModelError::InvalidParams`] if `corners` does not match
///   `pattern`.
pub fn render_chessboard(
    corners: &Matrix2xX<f64>,
    resolution: Resolution,
    pattern: &PatternConfig,
    background: u8,
) -> Result<GrayImage, CameraModelError> {
    let full = extrapolate_border(corners, pattern.rows, pattern.cols)?;
    let full_cols = pattern.cols + 2;
    let at = |r: usize, c: usize| -> Vector2<f64> { full.column(r * full_cols + c).into_owned() };

    let mut image = GrayImage::from_pixel(resolution.width, resolution.height, Luma([background]));

    let cell_rows = pattern.rows + 1;
    let cell_cols = pattern.cols + 1;
    for r in 0..cell_rows {
        for c in 0..cell_cols {
            let value = if (r + c) % 2 == 0 { DARK } else { LIGHT };
            let quad = [at(r, c), at(r, c + 1), at(r + 1, c + 1), at(r + 1, c)];
            fill_convex_polygon(&mut image, &quad, value);
        }
    }

    let outline = [
        at(0, 0),
        at(0, cell_cols),
        at(cell_rows, cell_cols),
        at(cell_rows, 0),
    ];
    draw_closed_polyline(&mut image, &outline, LIGHT, OUTLINE_THICKNESS);

    Ok(image)
}

/// Standard normal sample (Box-Muller).
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // 1 - U keeps the argument of ln in (0, 1].
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Adds zero-mean Gaussian noise of standard deviation `sigma` to every
/// pixel. Noise values are truncated to integers and the result is clamped
/// to `0..=255`.
pub fn add_sensor_noise<R: Rng + ?Sized>(image: &mut GrayImage, sigma: f64, rng: &mut R) {
    if !(sigma > 0.0) {
        return;
    }
    for pixel in image.pixels_mut() {
        let noise = (sigma * standard_normal(rng)).trunc();
        pixel[0] = (f64::from(pixel[0]) + noise).clamp(0.0, 255.0) as u8;
    }
}

/// Printable flat chessboard of `cols × rows` *squares*, each `square_px`
/// pixels wide. Cells with even `r + c` are white.
pub fn generate_pattern_image(cols: u32, rows: u32, square_px: u32) -> GrayImage {
    GrayImage::from_fn(cols * square_px, rows * square_px, |x, y| {
        let (r, c) = (y / square_px, x / square_px);
        if (r + c) % 2 == 0 {
            Luma([LIGHT])
        } else {
            Luma([DARK])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn uniform_grid(rows: usize, cols: usize, origin: Vector2<f64>, d: f64) -> Matrix2xX<f64> {
        let mut grid = Matrix2xX::zeros(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                grid.set_column(
                    r * cols + c,
                    &(origin + Vector2::new(c as f64 * d, r as f64 * d)),
                );
            }
        }
        grid
    }

    #[test]
    fn test_border_of_uniform_grid() {
        let (rows, cols, d) = (6, 9, 40.0);
        let origin = Vector2::new(100.0, 80.0);
        let full = extrapolate_border(&uniform_grid(rows, cols, origin, d), rows, cols).unwrap();
        assert_eq!(full.ncols(), (rows + 2) * (cols + 2));

        // The widened grid is the same lattice shifted by one step.
        let expected = uniform_grid(rows + 2, cols + 2, origin - Vector2::new(d, d), d);
        assert!((&full - &expected).amax() < 1e-12);

        let full_cols = cols + 2;
        let p = |r: usize, c: usize| full.column(r * full_cols + c).into_owned();
        // Left border point: exactly d beyond, collinear with its interior pair.
        let border = p(3, 0);
        let a = p(3, 1);
        let b = p(3, 2);
        assert_relative_eq!((a - border).norm(), d, epsilon = 1e-12);
        let cross = (a - border).x * (b - a).y - (a - border).y * (b - a).x;
        assert_relative_eq!(cross, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_border_follows_each_row() {
        // Sheared grid: every row has its own direction.
        let (rows, cols) = (3, 3);
        let mut grid = Matrix2xX::zeros(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let step = 10.0 + r as f64;
                grid.set_column(r * cols + c, &Vector2::new(c as f64 * step, r as f64 * 10.0));
            }
        }
        let full = extrapolate_border(&grid, rows, cols).unwrap();
        let full_cols = cols + 2;
        // Right border of interior row 2 (full row 3) extends by that row's step.
        let right = full.column(3 * full_cols + cols + 1).into_owned();
        assert_relative_eq!(right.x, 3.0 * 12.0, epsilon = 1e-12);
        assert_relative_eq!(right.y, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_border_rejects_bad_shapes() {
        let grid = uniform_grid(1, 4, Vector2::zeros(), 1.0);
        assert!(extrapolate_border(&grid, 1, 4).is_err());
        let grid = uniform_grid(3, 3, Vector2::zeros(), 1.0);
        assert!(extrapolate_border(&grid, 3, 4).is_err());
    }

    #[test]
    fn test_render_cells_alternate() {
        let pattern = PatternConfig::new(3, 2, 25.0);
        let d = 40.0;
        let origin = Vector2::new(100.0, 100.0);
        let corners = uniform_grid(pattern.rows, pattern.cols, origin, d);
        let image = render_chessboard(&corners, Resolution::new(400, 300), &pattern, 200).unwrap();

        assert_eq!(image.dimensions(), (400, 300));
        // Far from the board: background.
        assert_eq!(image.get_pixel(390, 290)[0], 200);
        // Cell (0, 0) spans [60, 100] x [60, 100]: r + c even, dark.
        assert_eq!(image.get_pixel(80, 80)[0], DARK);
        // Cell (0, 1): light.
        assert_eq!(image.get_pixel(120, 80)[0], LIGHT);
        // Cell (1, 1): dark again.
        assert_eq!(image.get_pixel(120, 120)[0], DARK);
        // Outline runs along the outer rim at x = 60.
        assert_eq!(image.get_pixel(60, 110)[0], LIGHT);
    }

    #[test]
    fn test_noise_is_seeded_and_clamped() {
        let base = GrayImage::from_pixel(32, 32, Luma([250]));
        let mut a = base.clone();
        let mut b = base.clone();
        add_sensor_noise(&mut a, 3.0, &mut StdRng::seed_from_u64(7));
        add_sensor_noise(&mut b, 3.0, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert_ne!(a, base);

        let mut unchanged = base.clone();
        add_sensor_noise(&mut unchanged, 0.0, &mut StdRng::seed_from_u64(7));
        assert_eq!(unchanged, base);

        let mut dark = GrayImage::from_pixel(16, 16, Luma([0]));
        add_sensor_noise(&mut dark, 50.0, &mut StdRng::seed_from_u64(1));
        let mean = dark.pixels().map(|p| f64::from(p[0])).sum::<f64>() / 256.0;
        assert!(mean > 0.0);
    }

    #[test]
    fn test_pattern_image() {
        let image = generate_pattern_image(10, 7, 80);
        assert_eq!(image.dimensions(), (800, 560));
        assert_eq!(image.get_pixel(10, 10)[0], LIGHT);
        assert_eq!(image.get_pixel(90, 10)[0], DARK);
        assert_eq!(image.get_pixel(90, 90)[0], LIGHT);
    }
}
