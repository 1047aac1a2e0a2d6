// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use ndarray::Array2;
use num_traits::Float;

use crate::core::{Point3, Real};
use crate::error::{Result, SimError};
use crate::params::DerivedParameters;

/// Transducer element centres with their transmit delay and apodization.
///
/// Elements are stored elevation-row major: index `iy * num_columns + ix`.
#[derive(Debug, Clone)]
pub struct ElementArray<F> {
    positions: Vec<Point3<F>>,
    delays: Vec<F>,
    apodization: Vec<F>,
    num_columns: usize,
    num_rows: usize,
    aperture_x: F,
    aperture_y: F,
}

impl<F: Real> ElementArray<F> {
    /// Build the element grid for the derived parameters.
    ///
    /// `delays` and `apodization` hold one value per element column and are
    /// repeated on every elevation row.
    pub(crate) fn build(
        prm: &DerivedParameters<F>,
        delays: &[f64],
        apodization: &[f64],
    ) -> Result<Self> {
        let n = prm.num_elements;
        check_per_element("delays", delays, n)?;
        check_per_element("apodization", apodization, n)?;

        let aperture_x = prm.pitch * F::from_f64_lossy((n - 1) as f64);
        let half = aperture_x / F::from_f64_lossy(2.0);
        let xs: Vec<F> = (0..n)
            .map(|i| F::from_f64_lossy(i as f64) * prm.pitch - half)
            .collect();

        let (ys, aperture_y) = match prm.height {
            Some(height) => (elevation_offsets(height, prm.sub_elements), height),
            None => (vec![F::zero()], prm.width),
        };

        let focus = prm.elevation_focus;
        let mut positions = Vec::with_capacity(xs.len() * ys.len());
        for &y in &ys {
            let z = elevation_sag(y, focus)?;
            for &x in &xs {
                positions.push(Point3::new(x, y, z));
            }
        }

        let to_f = |v: &[f64]| -> Vec<F> {
            (0..ys.len())
                .flat_map(|_| v.iter().map(|&d| F::from_f64_lossy(d)))
                .collect()
        };

        Ok(ElementArray {
            positions,
            delays: to_f(delays),
            apodization: to_f(apodization),
            num_columns: n,
            num_rows: ys.len(),
            aperture_x,
            aperture_y,
        })
    }

    /// Element centres.
    pub fn positions(&self) -> &[Point3<F>] {
        &self.positions
    }

    /// Transmit delay of every element in seconds.
    pub fn delays(&self) -> &[F] {
        &self.delays
    }

    /// Transmit apodization of every element.
    pub fn apodization(&self) -> &[F] {
        &self.apodization
    }

    /// Total number of (sub-)elements.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of elements along the array.
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Number of elevation rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Lateral aperture (first to last element centre).
    pub fn aperture_x(&self) -> F {
        self.aperture_x
    }

    /// Elevation aperture: the height when modeled, otherwise the element width.
    pub fn aperture_y(&self) -> F {
        self.aperture_y
    }
}

fn check_per_element(name: &'static str, values: &[f64], n: usize) -> Result<()> {
    if values.len() != n {
        return Err(SimError::LengthMismatch {
            name,
            expected: n,
            got: values.len(),
        });
    }
    for &v in values {
        if !v.is_finite() {
            return Err(SimError::InvalidParameter {
                name,
                value: v,
                reason: "values must be finite",
            });
        }
    }
    Ok(())
}

fn elevation_offsets<F: Real>(height: F, count: usize) -> Vec<F> {
    if count <= 1 {
        return vec![F::zero()];
    }
    let step = height / F::from_f64_lossy((count - 1) as f64);
    let half = height / F::from_f64_lossy(2.0);
    (0..count)
        .map(|i| F::from_f64_lossy(i as f64) * step - half)
        .collect()
}

/// Depth offset of a point at elevation `y` on a lens focused at `focus`.
fn elevation_sag<F: Real>(y: F, focus: F) -> Result<F> {
    if focus.is_infinite() {
        return Ok(F::zero());
    }
    let y2 = y * y;
    let f2 = focus * focus;
    if y2 > f2 {
        return Err(SimError::ElevationBeyondFocus {
            offset: Float::abs(y).into_f64(),
            focus: focus.into_f64(),
        });
    }
    Ok(focus - (f2 - y2).sqrt())
}

/// Scatterer locations flattened from three equal-shaped coordinate grids.
#[derive(Debug, Clone)]
pub struct ScattererField<F> {
    points: Vec<Point3<F>>,
    shape: (usize, usize),
    max_depth: F,
}

impl<F: Real> ScattererField<F> {
    /// Flatten the x, y and z grids in row-major order.
    ///
    /// # Errors
    /// Returns an error if the grids differ in shape, are empty, or contain
    /// non-finite coordinates.
    pub fn from_grids(x: &Array2<f64>, y: &Array2<f64>, z: &Array2<f64>) -> Result<Self> {
        let shape = x.dim();
        for other in [y, z] {
            if other.dim() != shape {
                return Err(SimError::ShapeMismatch {
                    expected: vec![shape.0, shape.1],
                    got: other.shape().to_vec(),
                });
            }
        }
        if shape.0 == 0 || shape.1 == 0 {
            return Err(SimError::EmptyGrid);
        }

        let mut points = Vec::with_capacity(shape.0 * shape.1);
        let mut max_depth = F::neg_infinity();
        for ((&px, &py), &pz) in x.iter().zip(y.iter()).zip(z.iter()) {
            for (name, v) in [("x_grid", px), ("y_grid", py), ("z_grid", pz)] {
                if !v.is_finite() {
                    return Err(SimError::InvalidParameter {
                        name,
                        value: v,
                        reason: "coordinates must be finite",
                    });
                }
            }
            let p = Point3::new(
                F::from_f64_lossy(px),
                F::from_f64_lossy(py),
                F::from_f64_lossy(pz),
            );
            max_depth = max_depth.max(p.z);
            points.push(p);
        }

        Ok(ScattererField {
            points,
            shape,
            max_depth,
        })
    }

    /// Scatterer positions in row-major grid order.
    pub fn points(&self) -> &[Point3<F>] {
        &self.points
    }

    /// Shape of the grids the field was built from.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Number of scatterers.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the field has no scatterers.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Largest z coordinate.
    pub fn max_depth(&self) -> F {
        self.max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Elevation, SimulationParameters};
    use ndarray::array;

    fn derived(prm: &SimulationParameters) -> DerivedParameters<f64> {
        prm.derive().unwrap()
    }

    #[test]
    fn single_row_positions_centered() {
        let prm = SimulationParameters::linear_probe(4, 1e-3, 5e6);
        let n = prm.num_elements;
        let arr = ElementArray::build(&derived(&prm), &vec![0.0; n], &vec![1.0; n]).unwrap();
        let xs: Vec<f64> = arr.positions().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![-1.5e-3, -0.5e-3, 0.5e-3, 1.5e-3]);
        assert!(arr.positions().iter().all(|p| p.y == 0.0 && p.z == 0.0));
        assert_eq!(arr.num_rows(), 1);
        assert!((arr.aperture_x() - 3e-3).abs() < 1e-15);
        assert_eq!(arr.aperture_y(), prm.width);
    }

    #[test]
    fn elevation_rows_repeat_delays() {
        let prm = SimulationParameters::linear_probe(3, 1e-3, 5e6)
            .with_elevation(Elevation::Height(1e-3))
            .with_elevation_focus(10e-3);
        // lambda = 0.308 mm -> 2*floor(3.25)+1 = 7 rows
        let arr = ElementArray::build(&derived(&prm), &[1.0, 2.0, 3.0], &[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(arr.num_rows(), 7);
        assert_eq!(arr.len(), 21);
        assert_eq!(&arr.delays()[..6], &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        assert_eq!(arr.apodization()[20], 0.3);

        let first = arr.positions()[0];
        assert!((first.y + 0.5e-3).abs() < 1e-15);
        let expected_z = 10e-3 - (1e-4_f64 - 0.25e-6).sqrt();
        assert!((first.z - expected_z).abs() < 1e-15);
        // the middle row sits on the axis
        let middle = arr.positions()[3 * 3 + 1];
        assert!(middle.y.abs() < 1e-15 && middle.z.abs() < 1e-15);
    }

    #[test]
    fn elevation_beyond_focus_is_domain_error() {
        let prm = SimulationParameters::linear_probe(2, 1e-3, 5e6)
            .with_elevation(Elevation::Height(10e-3))
            .with_elevation_focus(2e-3);
        let result = ElementArray::build(&derived(&prm), &[0.0, 0.0], &[1.0, 1.0]);
        assert!(matches!(result, Err(SimError::ElevationBeyondFocus { .. })));
    }

    #[test]
    fn delay_length_mismatch() {
        let prm = SimulationParameters::linear_probe(4, 1e-3, 5e6);
        let result = ElementArray::build(&derived(&prm), &[0.0; 3], &[1.0; 4]);
        assert!(matches!(
            result,
            Err(SimError::LengthMismatch {
                name: "delays",
                expected: 4,
                got: 3
            })
        ));
    }

    #[test]
    fn scatterers_flatten_row_major() {
        let x = array![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]];
        let y = Array2::zeros((2, 3));
        let z = array![[1.0, 1.0, 1.0], [2.0, 2.0, 7.0]];
        let field = ScattererField::<f64>::from_grids(&x, &y, &z).unwrap();
        assert_eq!(field.shape(), (2, 3));
        assert_eq!(field.len(), 6);
        assert_eq!(field.points()[4].x, 4.0);
        assert_eq!(field.max_depth(), 7.0);
    }

    #[test]
    fn scatterer_shape_mismatch() {
        let x = Array2::<f64>::zeros((2, 3));
        let y = Array2::<f64>::zeros((3, 2));
        let z = Array2::<f64>::zeros((2, 3));
        let result = ScattererField::<f64>::from_grids(&x, &y, &z);
        assert!(matches!(result, Err(SimError::ShapeMismatch { .. })));
    }

    #[test]
    fn empty_grid_rejected() {
        let e = Array2::<f64>::zeros((0, 3));
        let result = ScattererField::<f64>::from_grids(&e, &e, &e);
        assert!(matches!(result, Err(SimError::EmptyGrid)));
    }
}
