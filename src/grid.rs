// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use num_traits::Float;

use crate::core::{try_filled_vec, try_linspace, Real};
use crate::error::{Result, SimError};
use crate::geometry::{ElementArray, ScattererField};
use crate::params::DerivedParameters;

/// Time window and positive half-spectrum of one simulation run.
#[derive(Debug, Clone)]
pub struct FrequencyGrid<F> {
    nt: usize,
    time_window: F,
    max_steering_delay: F,
    valid_len: usize,
    frequencies: Vec<F>,
    omega: Vec<F>,
    wavenumbers: Vec<F>,
}

impl<F: Real> FrequencyGrid<F> {
    /// Size the time window for the array aperture and the deepest scatterer.
    ///
    /// # Errors
    /// Returns an error if the window is empty or not finite, and
    /// [`SimError::InsufficientMemory`] if the bins cannot be allocated.
    pub(crate) fn plan(
        prm: &DerivedParameters<F>,
        elements: &ElementArray<F>,
        scatterers: &ScattererField<F>,
    ) -> Result<Self> {
        let c = prm.c;
        let fs = prm.fs;
        let sin45 = F::from_f64_lossy(std::f64::consts::FRAC_PI_4.sin());

        let max_steering_delay = elements
            .positions()
            .iter()
            .map(|p| p.x * sin45 / c)
            .fold(F::neg_infinity(), F::max);

        let ax = elements.aperture_x();
        let ay = elements.aperture_y();
        let depth = scatterers.max_depth();
        let dmax = (ax * ax + ay * ay + depth * depth).sqrt();
        let passes = F::from_f64_lossy(prm.propagation.passes() as f64);
        let two = F::from_f64_lossy(2.0);
        let time_window = passes * dmax / c + two * max_steering_delay;

        let samples = (time_window * fs).into_f64();
        if !samples.is_finite() || samples <= 0.0 {
            return Err(SimError::InvalidParameter {
                name: "time_window",
                value: time_window.into_f64(),
                reason: "aperture and scatterer depth give an empty time window",
            });
        }
        let nt = ((samples / 8.0).ceil() as usize)
            .checked_mul(8)
            .ok_or(SimError::InsufficientMemory {
                requested: usize::MAX,
                limit: None,
            })?;

        let valid = ((time_window - two * max_steering_delay) * fs)
            .into_f64()
            .ceil();
        let valid_len = if valid <= 0.0 {
            0
        } else {
            (valid as usize).min(nt)
        };

        let nf = nt / 2;
        let frequencies = try_linspace(F::zero(), fs / two, nf)?;
        let two_pi = F::from_f64_lossy(2.0 * std::f64::consts::PI);
        let mut omega = try_filled_vec(nf, F::zero())?;
        let mut wavenumbers = try_filled_vec(nf, F::zero())?;
        for ((w, k), &f) in omega.iter_mut().zip(wavenumbers.iter_mut()).zip(&frequencies) {
            *w = two_pi * f;
            *k = *w / c;
        }

        tracing::debug!(
            nt,
            nf,
            valid_len,
            time_window = time_window.into_f64(),
            max_steering_delay = max_steering_delay.into_f64(),
            "planned frequency grid"
        );

        Ok(FrequencyGrid {
            nt,
            time_window,
            max_steering_delay,
            valid_len,
            frequencies,
            omega,
            wavenumbers,
        })
    }

    /// Number of time samples of the full inverse transform (a multiple of 8).
    pub fn nt(&self) -> usize {
        self.nt
    }

    /// Number of positive-frequency bins, `nt / 2`.
    pub fn num_bins(&self) -> usize {
        self.frequencies.len()
    }

    /// Simulated time window in seconds.
    pub fn time_window(&self) -> F {
        self.time_window
    }

    /// Largest lateral steering delay the window accounts for.
    pub fn max_steering_delay(&self) -> F {
        self.max_steering_delay
    }

    /// Number of samples in the physically valid part of the window.
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// Bin frequencies in hertz, from 0 to `fs / 2` inclusive.
    pub fn frequencies(&self) -> &[F] {
        &self.frequencies
    }

    /// Angular frequencies `2πf`.
    pub fn omega(&self) -> &[F] {
        &self.omega
    }

    /// Wavenumbers `ω / c`.
    pub fn wavenumbers(&self) -> &[F] {
        &self.wavenumbers
    }
}
