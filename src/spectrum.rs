// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use num_complex::Complex;
use rustfft::FftPlanner;

use crate::core::{try_filled_vec, Real};
use crate::error::{Result, SimError};
use crate::grid::FrequencyGrid;
use crate::params::DerivedParameters;

/// Transmitted-pulse and element-response spectra on the simulation's
/// positive-frequency bins.
#[derive(Debug, Clone)]
pub struct SpectralFilters<F> {
    pulse: Vec<Complex<F>>,
    element: Vec<Complex<F>>,
    pulse_duration: F,
    element_duration: F,
}

impl<F: Real> SpectralFilters<F> {
    /// Transform the pulse and the element impulse response.
    ///
    /// Both are zero-padded to `ceil(nt * fs_pulse / fs)` samples so that one
    /// transform bin spans `fs / nt`, then truncated to the first `nt / 2` bins.
    ///
    /// # Errors
    /// Returns [`SimError::SpectrumLengthMismatch`] when the padded transform
    /// has fewer than `nt / 2` bins, and [`SimError::InsufficientMemory`] when
    /// the transform buffers cannot be allocated.
    pub(crate) fn build(prm: &DerivedParameters<F>, grid: &FrequencyGrid<F>) -> Result<Self> {
        let nf = grid.num_bins();
        let ratio = prm.fs_pulse.into_f64() / prm.fs.into_f64();
        let n_fft = (grid.nt() as f64 * ratio).ceil() as usize;

        if n_fft < nf {
            return Err(SimError::SpectrumLengthMismatch {
                name: "pulse",
                expected: nf,
                got: n_fft,
            });
        }
        let response = element_response(prm.fc, prm.bandwidth, prm.fs_pulse)?;

        let zero = Complex::new(F::zero(), F::zero());
        let mut buffer = try_filled_vec(n_fft, zero)?;
        let mut planner = FftPlanner::<F>::new();
        let fft = planner.plan_fft_forward(n_fft);
        let mut transform = |samples: &[F]| -> Result<Vec<Complex<F>>> {
            buffer.fill(zero);
            for (b, &s) in buffer.iter_mut().zip(samples) {
                b.re = s;
            }
            fft.process(&mut buffer);
            let mut bins = try_filled_vec(nf, zero)?;
            bins.copy_from_slice(&buffer[..nf]);
            Ok(bins)
        };

        let pulse = transform(&prm.pulse)?;
        let element = transform(&response)?;

        let pulse_duration = F::from_f64_lossy(prm.pulse.len() as f64) / prm.fs_pulse;
        let element_duration =
            F::from_f64_lossy(response.len().saturating_sub(1) as f64) / prm.fs_pulse;

        tracing::debug!(
            n_fft,
            bins = nf,
            response_len = response.len(),
            "built spectral filters"
        );

        Ok(SpectralFilters {
            pulse,
            element,
            pulse_duration,
            element_duration,
        })
    }

    /// Pulse spectrum, one value per frequency bin.
    pub fn pulse(&self) -> &[Complex<F>] {
        &self.pulse
    }

    /// Element impulse-response spectrum, one value per frequency bin.
    pub fn element(&self) -> &[Complex<F>] {
        &self.element
    }

    /// Duration of the transmitted pulse in seconds.
    pub fn pulse_duration(&self) -> F {
        self.pulse_duration
    }

    /// Time of the last element impulse-response sample in seconds.
    pub fn element_duration(&self) -> F {
        self.element_duration
    }
}

/// Hann-windowed sine burst at `fc` lasting `1 / (bandwidth * fc)` plus one
/// sample, sampled at `fs`.
///
/// # Errors
/// Returns [`SimError::InsufficientMemory`] if the response cannot be allocated.
pub fn element_response<F: Real>(fc: F, bandwidth: F, fs: F) -> Result<Vec<F>> {
    let span = (fs / (bandwidth * fc)).into_f64();
    if !span.is_finite() || span < 0.0 {
        return Err(SimError::InvalidParameter {
            name: "element_bandwidth",
            value: bandwidth.into_f64(),
            reason: "element response length is not finite",
        });
    }
    let n = (span.ceil() as usize).saturating_add(1);
    let two_pi_fc = F::from_f64_lossy(2.0 * std::f64::consts::PI) * fc;
    let mut response = try_filled_vec(n, F::zero())?;
    for (i, h) in response.iter_mut().enumerate() {
        let t = F::from_f64_lossy(i as f64) / fs;
        *h = (two_pi_fc * t).sin() * F::from_f64_lossy(hann(i, n));
    }
    Ok(response)
}

fn hann(i: usize, size: usize) -> f64 {
    if size == 1 {
        return 1.0;
    }
    0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64).cos()
}

/// Symmetric Hann window, `0.5 - 0.5 cos(2πn / (M - 1))`.
pub fn hann_window<F: Real>(size: usize) -> Vec<F> {
    (0..size).map(|i| F::from_f64_lossy(hann(i, size))).collect()
}

/// Hann-windowed tone burst of `cycles` periods at `fc`, sampled at `fs`.
///
/// # Errors
/// Returns [`SimError::InvalidParameter`] unless all three arguments are
/// positive and finite, and [`SimError::InsufficientMemory`] if the burst
/// cannot be allocated.
pub fn tone_burst(fc: f64, cycles: f64, fs: f64) -> Result<Vec<f64>> {
    let arguments = [
        ("center_frequency", fc),
        ("cycles", cycles),
        ("pulse_sample_rate", fs),
    ];
    for (name, value) in arguments {
        if !value.is_finite() || value <= 0.0 {
            return Err(SimError::InvalidParameter {
                name,
                value,
                reason: "must be positive and finite",
            });
        }
    }
    let count = ((cycles / fc) * fs).round().max(1.0);
    if !count.is_finite() {
        return Err(SimError::InvalidParameter {
            name: "cycles",
            value: cycles,
            reason: "burst length is not finite",
        });
    }
    let n = count as usize;
    let mut burst = try_filled_vec(n, 0.0)?;
    for (i, s) in burst.iter_mut().enumerate() {
        *s = (2.0 * std::f64::consts::PI * fc * i as f64 / fs).sin() * hann(i, n);
    }
    Ok(burst)
}
