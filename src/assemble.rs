// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use ndarray::{Array3, Axis};
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::FftPlanner;

use crate::core::{try_filled_vec, Real};
use crate::error::{Result, SimError};
use crate::field::FieldSpectrum;
use crate::params::OutputLayout;

/// Output shape and trimming of the time-domain volume.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AssemblyPlan {
    pub nt: usize,
    pub valid_len: usize,
    pub trailing_trim: usize,
    pub grid_shape: (usize, usize),
    pub layout: OutputLayout,
}

impl AssemblyPlan {
    /// Number of samples kept per trace.
    pub fn output_len(&self) -> Result<usize> {
        let len = self.valid_len.saturating_sub(self.trailing_trim);
        if len == 0 {
            return Err(SimError::InvalidParameter {
                name: "trailing_trim",
                value: self.trailing_trim as f64,
                reason: "trim leaves no samples in the valid time window",
            });
        }
        Ok(len)
    }
}

/// Inverse-transform a field spectrum into RF traces.
///
/// Each scatterer column is zero-padded to `nt`, inverse transformed with
/// `1/nt` normalization and its imaginary part kept. The trace is read
/// backwards, so sample `m` holds transform sample `nt - 1 - m`, and only the
/// first `valid_len - trailing_trim` samples are kept.
pub(crate) fn assemble<F: Real>(
    spectrum: &FieldSpectrum<F>,
    plan: &AssemblyPlan,
    pool: &rayon::ThreadPool,
) -> Result<Array3<F>> {
    let nt = plan.nt;
    let nf = spectrum.num_bins();
    let ns = spectrum.num_scatterers();
    let out_len = plan.output_len()?;
    let (rows, cols) = plan.grid_shape;
    if rows * cols != ns {
        return Err(SimError::ShapeMismatch {
            expected: vec![rows, cols],
            got: vec![ns],
        });
    }
    if nf > nt {
        return Err(SimError::SpectrumLengthMismatch {
            name: "field",
            expected: nt,
            got: nf,
        });
    }

    let mut planner = FftPlanner::<F>::new();
    let ifft = planner.plan_fft_inverse(nt);
    let scale = F::one() / F::from_f64_lossy(nt as f64);
    let data = spectrum.data();

    // one trace per scatterer, scatterer major
    let mut traces = try_filled_vec(ns * out_len, F::zero())?;
    pool.install(|| {
        traces
            .par_chunks_mut(out_len)
            .enumerate()
            .for_each_init(
                || {
                    (
                        vec![Complex::new(F::zero(), F::zero()); nt],
                        vec![Complex::new(F::zero(), F::zero()); ifft.get_inplace_scratch_len()],
                    )
                },
                |(buffer, scratch), (s, trace)| {
                    for (dst, src) in buffer.iter_mut().zip(data.column(s).iter()) {
                        *dst = *src;
                    }
                    for dst in buffer[nf..].iter_mut() {
                        *dst = Complex::new(F::zero(), F::zero());
                    }
                    ifft.process_with_scratch(buffer, scratch);
                    for (m, out) in trace.iter_mut().enumerate() {
                        *out = buffer[nt - 1 - m].im * scale;
                    }
                },
            );
    });

    let volume = Array3::from_shape_vec((rows, cols, out_len), traces)
        .map_err(|e| SimError::Other(format!("shape error: {}", e)))?;
    Ok(match plan.layout {
        OutputLayout::Grid => volume,
        OutputLayout::Transposed => {
            let mut v = volume;
            v.swap_axes(0, 1);
            v.as_standard_layout().to_owned()
        }
    })
}

/// Sample index of the largest absolute value along the time axis of trace `(i, j)`.
pub fn peak_sample<F: Real>(volume: &Array3<F>, i: usize, j: usize) -> Option<usize> {
    let trace = volume.index_axis(Axis(0), i);
    let trace = trace.index_axis(Axis(0), j);
    let mut best: Option<(usize, F)> = None;
    for (t, &v) in trace.iter().enumerate() {
        let a = num_traits::Float::abs(v);
        match best {
            Some((_, b)) if b >= a => {}
            _ => best = Some((t, a)),
        }
    }
    best.map(|(t, _)| t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap()
    }

    fn spectrum(data: Array2<Complex<f64>>) -> FieldSpectrum<f64> {
        FieldSpectrum::from_data(data)
    }

    #[test]
    fn delayed_phasor_lands_after_reversal() {
        // a flat spectrum advanced by d samples places the impulse at
        // transform sample nt - d, which reads back as output sample d - 1
        let nt = 64;
        let nf = nt / 2;
        let d = 10.0;
        let data = Array2::from_shape_fn((nf, 1), |(k, _)| {
            Complex::from_polar(1.0, 2.0 * std::f64::consts::PI * k as f64 * d / nt as f64)
        });
        let plan = AssemblyPlan {
            nt,
            valid_len: nt,
            trailing_trim: 0,
            grid_shape: (1, 1),
            layout: OutputLayout::Grid,
        };
        let rf = assemble(&spectrum(data), &plan, &pool()).unwrap();
        assert_eq!(rf.dim(), (1, 1, nt));
        let peak = peak_sample(&rf, 0, 0).unwrap();
        assert!(
            (peak as i64 - 9).abs() <= 1,
            "peak at {} (expected about 9)",
            peak
        );
    }

    #[test]
    fn trims_and_transposes() {
        let nt = 32;
        let data = Array2::from_elem((nt / 2, 6), Complex::new(1.0, 0.5));
        let plan = AssemblyPlan {
            nt,
            valid_len: 20,
            trailing_trim: 3,
            grid_shape: (2, 3),
            layout: OutputLayout::Transposed,
        };
        let rf = assemble(&spectrum(data.clone()), &plan, &pool()).unwrap();
        assert_eq!(rf.dim(), (3, 2, 17));

        let grid_plan = AssemblyPlan {
            layout: OutputLayout::Grid,
            ..plan
        };
        let rf_grid = assemble(&spectrum(data), &grid_plan, &pool()).unwrap();
        assert_eq!(rf_grid.dim(), (2, 3, 17));
        assert_eq!(rf[[2, 1, 5]], rf_grid[[1, 2, 5]]);
    }

    #[test]
    fn zero_spectrum_gives_zero_traces() {
        let nt = 16;
        let data = Array2::from_elem((nt / 2, 4), Complex::new(0.0, 0.0));
        let plan = AssemblyPlan {
            nt,
            valid_len: nt,
            trailing_trim: 0,
            grid_shape: (2, 2),
            layout: OutputLayout::Transposed,
        };
        let rf = assemble(&spectrum(data), &plan, &pool()).unwrap();
        assert!(rf.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn trim_beyond_window_rejected() {
        let plan = AssemblyPlan {
            nt: 16,
            valid_len: 4,
            trailing_trim: 4,
            grid_shape: (1, 1),
            layout: OutputLayout::Grid,
        };
        assert!(matches!(
            plan.output_len(),
            Err(SimError::InvalidParameter {
                name: "trailing_trim",
                ..
            })
        ));
    }
}
