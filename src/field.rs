// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::Array2;
use num_complex::Complex;
use rayon::prelude::*;

use crate::core::{sinc, try_filled_vec, Real};
use crate::error::{Result, SimError};
use crate::geometry::{ElementArray, ScattererField};
use crate::grid::FrequencyGrid;
use crate::params::{Baffle, DerivedParameters, Propagation, PulseAlignment};
use crate::spectrum::SpectralFilters;

/// Progress information passed to the optional callback.
#[derive(Debug, Clone, Copy)]
pub struct ProgressInfo {
    /// Number of frequency bins synthesized so far.
    pub bins_done: usize,
    /// Total number of frequency bins.
    pub total_bins: usize,
    /// Elapsed time since synthesis started.
    pub elapsed: Duration,
}

/// Shared flag for stopping a run between frequency bins.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Frequency-independent element/scatterer relations, scatterer major:
/// entry `s * num_elements + e`.
struct PairGeometry<F> {
    distance: Vec<F>,
    sin_x: Vec<F>,
    sin_y: Vec<F>,
    cos: Vec<F>,
    inv_spread: Vec<F>,
    num_elements: usize,
}

impl<F: Real> PairGeometry<F> {
    fn compute(
        elements: &ElementArray<F>,
        scatterers: &ScattererField<F>,
        spherical: bool,
    ) -> Result<Self> {
        let ne = elements.len();
        let len = ne * scatterers.len();
        let mut distance = try_filled_vec(len, F::zero())?;
        let mut sin_x = try_filled_vec(len, F::zero())?;
        let mut sin_y = try_filled_vec(len, F::zero())?;
        let mut cos = try_filled_vec(len, F::zero())?;
        let mut inv_spread = try_filled_vec(len, F::zero())?;

        for (s, &p) in scatterers.points().iter().enumerate() {
            for (e, &q) in elements.positions().iter().enumerate() {
                let d = p.sub(q);
                let r = d.norm();
                if r == F::zero() {
                    return Err(SimError::CoincidentScatterer {
                        scatterer: s,
                        element: e,
                    });
                }
                let i = s * ne + e;
                distance[i] = r;
                sin_x[i] = d.x / r;
                sin_y[i] = d.y / r;
                cos[i] = d.z / r;
                inv_spread[i] = if spherical { r.recip() } else { r.sqrt().recip() };
            }
        }

        Ok(PairGeometry {
            distance,
            sin_x,
            sin_y,
            cos,
            inv_spread,
            num_elements: ne,
        })
    }
}

/// Received field per frequency bin and scatterer, before the inverse transform.
#[derive(Debug, Clone)]
pub struct FieldSpectrum<F> {
    data: Array2<Complex<F>>,
}

impl<F: Real> FieldSpectrum<F> {
    pub(crate) fn from_data(data: Array2<Complex<F>>) -> Self {
        FieldSpectrum { data }
    }

    /// The `(frequency, scatterer)` array.
    pub fn data(&self) -> &Array2<Complex<F>> {
        &self.data
    }

    /// Number of frequency bins.
    pub fn num_bins(&self) -> usize {
        self.data.nrows()
    }

    /// Number of scatterers.
    pub fn num_scatterers(&self) -> usize {
        self.data.ncols()
    }
}

/// Synthesizes the field spectrum of a scatterer field for one element array.
///
/// Every frequency bin is independent, so bins run in parallel on the given
/// thread pool, each writing its own row. The result does not depend on the
/// number of threads.
pub struct FieldSynthesizer<'a, F> {
    prm: &'a DerivedParameters<F>,
    elements: &'a ElementArray<F>,
    scatterers: &'a ScattererField<F>,
    grid: &'a FrequencyGrid<F>,
    filters: &'a SpectralFilters<F>,
}

impl<'a, F: Real> FieldSynthesizer<'a, F> {
    pub(crate) fn new(
        prm: &'a DerivedParameters<F>,
        elements: &'a ElementArray<F>,
        scatterers: &'a ScattererField<F>,
        grid: &'a FrequencyGrid<F>,
        filters: &'a SpectralFilters<F>,
    ) -> Self {
        FieldSynthesizer {
            prm,
            elements,
            scatterers,
            grid,
            filters,
        }
    }

    /// Time offset applied to every transmit phasor so the band-limited
    /// waveform lands at the arrival time.
    fn alignment_offset(&self) -> F {
        let passes = F::from_f64_lossy(self.prm.propagation.passes() as f64);
        let span = self.filters.pulse_duration() + passes * self.filters.element_duration();
        match self.prm.alignment {
            PulseAlignment::Onset => span,
            PulseAlignment::Centered => span / F::from_f64_lossy(2.0),
        }
    }

    /// `apod_e * exp(i ω (delay_e + offset))`, frequency major.
    fn transmit_phasors(&self) -> Result<Vec<Complex<F>>> {
        let ne = self.elements.len();
        let nf = self.grid.num_bins();
        let offset = self.alignment_offset();
        let mut phasors = try_filled_vec(nf * ne, Complex::new(F::zero(), F::zero()))?;
        let delays = self.elements.delays();
        let apod = self.elements.apodization();
        for (row, &w) in phasors.chunks_mut(ne).zip(self.grid.omega()) {
            for e in 0..ne {
                row[e] = Complex::from_polar(apod[e], w * (delays[e] + offset));
            }
        }
        Ok(phasors)
    }

    /// Run the synthesis.
    ///
    /// # Errors
    /// Returns [`SimError::CoincidentScatterer`] if a scatterer sits on an
    /// element, [`SimError::Cancelled`] if `cancel` fires, or
    /// [`SimError::InsufficientMemory`] if a buffer cannot be allocated.
    pub(crate) fn run(
        &self,
        pool: &rayon::ThreadPool,
        cancel: Option<&CancelToken>,
        progress: Option<&(dyn Fn(ProgressInfo) + Sync)>,
    ) -> Result<FieldSpectrum<F>> {
        let spherical = self.prm.height.is_some();
        let geometry = PairGeometry::compute(self.elements, self.scatterers, spherical)?;
        let phasors = self.transmit_phasors()?;

        let nf = self.grid.num_bins();
        let ns = self.scatterers.len();
        let ne = geometry.num_elements;
        let mut data = try_filled_vec(nf * ns, Complex::new(F::zero(), F::zero()))?;

        let two_pi = F::from_f64_lossy(2.0 * std::f64::consts::PI);
        let width_scale = self.prm.width / two_pi;
        let height_scale = self.prm.wavelength / two_pi;
        let hard = self.prm.baffle == Baffle::Hard;
        let echo = self.prm.propagation == Propagation::PulseEcho;

        let bins_done = AtomicUsize::new(0);
        let start_time = Instant::now();
        let last_progress = AtomicU64::new(0);

        pool.install(|| {
            data.par_chunks_mut(ns)
                .enumerate()
                .try_for_each(|(ik, row)| -> Result<()> {
                    if let Some(token) = cancel {
                        if token.is_cancelled() {
                            return Err(SimError::Cancelled {
                                completed_bins: bins_done.load(Ordering::Acquire),
                                total_bins: nf,
                            });
                        }
                    }

                    let k = self.grid.wavenumbers()[ik];
                    let a1 = width_scale * k;
                    let a2 = height_scale * k;
                    let stx = &phasors[ik * ne..(ik + 1) * ne];
                    let mut filter = self.filters.pulse()[ik] * self.filters.element()[ik];
                    if echo {
                        filter = filter * self.filters.element()[ik];
                    }

                    for (s, out) in row.iter_mut().enumerate() {
                        let base = s * ne;
                        let mut tx = Complex::new(F::zero(), F::zero());
                        let mut rx = Complex::new(F::zero(), F::zero());
                        for e in 0..ne {
                            let i = base + e;
                            let mut directivity =
                                sinc(a1 * geometry.sin_x[i]) * sinc(a2 * geometry.sin_y[i]);
                            if hard {
                                directivity *= geometry.cos[i] * geometry.cos[i];
                            }
                            let g = Complex::from_polar(
                                directivity * geometry.inv_spread[i],
                                geometry.distance[i] * k,
                            );
                            tx += g * stx[e];
                            if echo {
                                rx += g;
                            }
                        }
                        *out = if echo {
                            filter * tx * rx
                        } else {
                            filter * tx
                        };
                    }

                    let done = bins_done.fetch_add(1, Ordering::AcqRel) + 1;
                    if let Some(cb) = progress {
                        let elapsed_ms = start_time.elapsed().as_millis() as u64;
                        let last = last_progress.load(Ordering::Relaxed);
                        let due = done == nf
                            || (elapsed_ms >= last + 500
                                && last_progress
                                    .compare_exchange(
                                        last,
                                        elapsed_ms,
                                        Ordering::Relaxed,
                                        Ordering::Relaxed,
                                    )
                                    .is_ok());
                        if due {
                            cb(ProgressInfo {
                                bins_done: done,
                                total_bins: nf,
                                elapsed: start_time.elapsed(),
                            });
                        }
                    }
                    Ok(())
                })
        })?;

        let data = Array2::from_shape_vec((nf, ns), data)
            .map_err(|e| SimError::Other(format!("shape error: {}", e)))?;
        Ok(FieldSpectrum::from_data(data))
    }
}
