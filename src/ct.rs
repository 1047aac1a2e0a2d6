// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Parallel-beam CT: phantom, Radon transform and unfiltered retroprojection.
//!
//! Sinograms are indexed `[detector position, angle]`. Angles are in degrees.
//! Both transforms rotate about pixel `(n/2, n/2)` and treat everything
//! outside the image as zero.

use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{Result, SimError};

/// Ellipses of the modified Shepp-Logan phantom:
/// intensity, semi-axis a, semi-axis b, centre x, centre y, rotation (degrees).
const SHEPP_LOGAN: [[f64; 6]; 10] = [
    [1.0, 0.69, 0.92, 0.0, 0.0, 0.0],
    [-0.8, 0.6624, 0.874, 0.0, -0.0184, 0.0],
    [-0.2, 0.11, 0.31, 0.22, 0.0, -18.0],
    [-0.2, 0.16, 0.41, -0.22, 0.0, 18.0],
    [0.1, 0.21, 0.25, 0.0, 0.35, 0.0],
    [0.1, 0.046, 0.046, 0.0, 0.1, 0.0],
    [0.1, 0.046, 0.046, 0.0, -0.1, 0.0],
    [0.1, 0.046, 0.023, -0.08, -0.605, 0.0],
    [0.1, 0.023, 0.023, 0.0, -0.606, 0.0],
    [0.1, 0.023, 0.046, 0.06, -0.605, 0.0],
];

/// Modified Shepp-Logan phantom on an `n × n` grid covering `[-1, 1]²`,
/// row 0 at the top.
pub fn shepp_logan_phantom(n: usize) -> Array2<f64> {
    let scale = 2.0 / n as f64;
    Array2::from_shape_fn((n, n), |(i, j)| {
        let x = (j as f64 + 0.5) * scale - 1.0;
        let y = 1.0 - (i as f64 + 0.5) * scale;
        SHEPP_LOGAN
            .iter()
            .filter(|e| {
                let [_, a, b, x0, y0, phi] = **e;
                let (s, c) = phi.to_radians().sin_cos();
                let u = (x - x0) * c + (y - y0) * s;
                let v = -(x - x0) * s + (y - y0) * c;
                (u / a).powi(2) + (v / b).powi(2) <= 1.0
            })
            .map(|e| e[0])
            .sum()
    })
}

fn check_square(image: &Array2<f64>) -> Result<usize> {
    let (rows, cols) = image.dim();
    if rows == 0 || cols == 0 {
        return Err(SimError::EmptyGrid);
    }
    if rows != cols {
        return Err(SimError::ShapeMismatch {
            expected: vec![rows, rows],
            got: vec![rows, cols],
        });
    }
    Ok(rows)
}

fn check_angles(angles: &[f64]) -> Result<()> {
    for &a in angles {
        if !a.is_finite() {
            return Err(SimError::InvalidParameter {
                name: "angles",
                value: a,
                reason: "angles must be finite",
            });
        }
    }
    Ok(())
}

/// Bilinear sample of `image` at fractional `(row, col)`, zero outside.
fn bilinear(image: &Array2<f64>, row: f64, col: f64) -> f64 {
    let (rows, cols) = image.dim();
    let r0 = row.floor();
    let c0 = col.floor();
    let fr = row - r0;
    let fc = col - c0;
    let mut acc = 0.0;
    for (dr, wr) in [(0, 1.0 - fr), (1, fr)] {
        for (dc, wc) in [(0, 1.0 - fc), (1, fc)] {
            let r = r0 as i64 + dr;
            let c = c0 as i64 + dc;
            if r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols {
                acc += wr * wc * image[[r as usize, c as usize]];
            }
        }
    }
    acc
}

/// Radon transform of a square image.
///
/// For each angle the image is rotated about its centre and summed along the
/// rows, giving one projection column of the `[n, angles.len()]` sinogram.
///
/// # Errors
/// Returns [`SimError::EmptyGrid`] or [`SimError::ShapeMismatch`] for a
/// non-square image, and [`SimError::InvalidParameter`] for non-finite angles.
pub fn forward_project(image: &Array2<f64>, angles: &[f64]) -> Result<Array2<f64>> {
    let n = check_square(image)?;
    check_angles(angles)?;
    let centre = (n / 2) as f64;

    let projections: Vec<Vec<f64>> = angles
        .par_iter()
        .map(|&deg| {
            let (s, c) = deg.to_radians().sin_cos();
            let mut column = vec![0.0; n];
            for (x, out) in column.iter_mut().enumerate() {
                let dx = x as f64 - centre;
                for y in 0..n {
                    let dy = y as f64 - centre;
                    let col = centre + c * dx + s * dy;
                    let row = centre - s * dx + c * dy;
                    *out += bilinear(image, row, col);
                }
            }
            column
        })
        .collect();

    Ok(Array2::from_shape_fn((n, angles.len()), |(p, a)| {
        projections[a][p]
    }))
}

/// Unfiltered retroprojection.
///
/// Column `a` of the sinogram is smeared back across the image along the
/// direction it was acquired at `angles[a]`, and the smears are summed. The
/// result is a blurred reconstruction of the original image.
///
/// # Errors
/// Returns [`SimError::LengthMismatch`] when `angles` does not have one entry
/// per sinogram column, [`SimError::EmptyGrid`] for an empty sinogram.
pub fn back_project(sinogram: &Array2<f64>, angles: &[f64]) -> Result<Array2<f64>> {
    let (n, num_angles) = sinogram.dim();
    if n == 0 || num_angles == 0 {
        return Err(SimError::EmptyGrid);
    }
    if angles.len() != num_angles {
        return Err(SimError::LengthMismatch {
            name: "angles",
            expected: num_angles,
            got: angles.len(),
        });
    }
    check_angles(angles)?;
    let centre = (n / 2) as f64;
    let trig: Vec<(f64, f64)> = angles.iter().map(|a| a.to_radians().sin_cos()).collect();

    let mut image = vec![0.0; n * n];
    image.par_chunks_mut(n).enumerate().for_each(|(row, out)| {
        let dy = row as f64 - centre;
        for (col, px) in out.iter_mut().enumerate() {
            let dx = col as f64 - centre;
            for (a, &(s, c)) in trig.iter().enumerate() {
                // detector coordinate this pixel projected onto
                let t = centre + c * dx - s * dy;
                let t0 = t.floor();
                let w = t - t0;
                let i0 = t0 as i64;
                if i0 >= 0 && (i0 as usize) < n {
                    *px += (1.0 - w) * sinogram[[i0 as usize, a]];
                }
                if i0 + 1 >= 0 && ((i0 + 1) as usize) < n {
                    *px += w * sinogram[[(i0 + 1) as usize, a]];
                }
            }
        }
    });

    Array2::from_shape_vec((n, n), image)
        .map_err(|e| SimError::Other(format!("shape error: {}", e)))
}

/// One-degree steps over `[0, 180)`.
pub fn default_angles() -> Vec<f64> {
    (0..180).map(|a| a as f64).collect()
}

/// Sinogram of the `n × n` Shepp-Logan phantom over [`default_angles`].
pub fn load_sinogram(n: usize) -> Result<Array2<f64>> {
    forward_project(&shepp_logan_phantom(n), &default_angles())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dot(n: usize, row: usize, col: usize) -> Array2<f64> {
        let mut img = Array2::zeros((n, n));
        img[[row, col]] = 1.0;
        img
    }

    #[test]
    fn phantom_intensities() {
        let p = shepp_logan_phantom(64);
        assert_eq!(p.dim(), (64, 64));
        // corners are outside the skull
        assert_eq!(p[[0, 0]], 0.0);
        // centre: skull + brain
        assert_relative_eq!(p[[32, 32]], 0.2, epsilon = 1e-12);
        assert!(p.iter().all(|&v| (-1e-12..=1.0 + 1e-12).contains(&v)));
    }

    #[test]
    fn projection_preserves_mass_at_zero_degrees() {
        let p = shepp_logan_phantom(32);
        let sino = forward_project(&p, &[0.0]).unwrap();
        assert_eq!(sino.dim(), (32, 1));
        // no rotation: each projection value is a column sum
        for col in 0..32 {
            assert_relative_eq!(sino[[col, 0]], p.column(col).sum(), epsilon = 1e-9);
        }
    }

    #[test]
    fn centred_dot_projects_to_centre_at_every_angle() {
        let n = 33;
        let img = dot(n, 16, 16);
        let sino = forward_project(&img, &[0.0, 30.0, 90.0, 135.0]).unwrap();
        for a in 0..4 {
            let col = sino.column(a);
            let peak = col
                .iter()
                .enumerate()
                .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0;
            assert_eq!(peak, 16, "angle index {}", a);
            assert_relative_eq!(col.sum(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn off_centre_dot_moves_with_angle() {
        let n = 41;
        // dot 10 pixels right of centre
        let img = dot(n, 20, 30);
        let sino = forward_project(&img, &[0.0, 90.0, 180.0]).unwrap();
        assert_relative_eq!(sino[[30, 0]], 1.0, epsilon = 1e-9);
        assert_relative_eq!(sino[[20, 1]], 1.0, epsilon = 1e-9);
        assert_relative_eq!(sino[[10, 2]], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn retroprojection_peaks_at_source() {
        let n = 41;
        let img = dot(n, 14, 25);
        let angles = default_angles();
        let sino = forward_project(&img, &angles).unwrap();
        let recon = back_project(&sino, &angles).unwrap();
        let (mut best, mut at) = (f64::MIN, (0, 0));
        for ((r, c), &v) in recon.indexed_iter() {
            if v > best {
                best = v;
                at = (r, c);
            }
        }
        assert_eq!(at, (14, 25));
    }

    #[test]
    fn shape_and_length_errors() {
        let rect = Array2::zeros((4, 5));
        assert!(matches!(
            forward_project(&rect, &[0.0]),
            Err(SimError::ShapeMismatch { .. })
        ));
        let sino = Array2::zeros((8, 3));
        assert!(matches!(
            back_project(&sino, &[0.0, 1.0]),
            Err(SimError::LengthMismatch {
                name: "angles",
                expected: 3,
                got: 2
            })
        ));
        assert!(matches!(
            forward_project(&Array2::zeros((0, 0)), &[0.0]),
            Err(SimError::EmptyGrid)
        ));
    }

    #[test]
    fn phantom_sinogram_shape() {
        let sino = load_sinogram(24).unwrap();
        assert_eq!(sino.dim(), (24, 180));
        assert!(sino.iter().all(|v| v.is_finite()));
    }
}
