// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Numerical simulations for biomedical imaging labs.
//!
//! The main component is a frequency-domain ultrasound forward simulator:
//! given a grid of point scatterers and a linear array firing with
//! per-element delays and apodization, it computes the RF signal at every
//! scatterer over time. For each frequency bin the element contributions
//! (sinc directivity, spreading, propagation phase, transmit phasor) are
//! summed over the aperture and filtered by the pulse and element spectra;
//! an inverse FFT per scatterer then yields the time traces. Frequency bins
//! are independent and run in parallel.
//!
//! A small parallel-beam CT toolbox (phantom, Radon transform and
//! retroprojection) and the array products used to animate an RF volume are
//! included for the companion labs.

#![warn(missing_docs)]

/// Inverse transform from field spectrum to RF volume.
pub mod assemble;
/// Precision selection and numeric helpers.
pub mod core;
/// Parallel-beam CT projections.
pub mod ct;
/// Error types for the library.
pub mod error;
/// Per-frequency field synthesis.
pub mod field;
/// Element array and scatterer field.
pub mod geometry;
/// Time window and frequency bins.
pub mod grid;
/// File I/O for grids, pulses and RF volumes.
pub mod io;
/// Simulation parameters.
pub mod params;
/// Ultrasound simulator driver.
pub mod simulator;
/// Pulse and element spectra.
pub mod spectrum;
/// Animation products of an RF volume.
pub mod viz;

pub use crate::core::Precision;
pub use crate::error::{ErrorKind, Result, SimError};
pub use crate::field::{CancelToken, ProgressInfo};
pub use crate::params::{
    Baffle, Elevation, OutputLayout, Propagation, PulseAlignment, SimulationParameters,
    SubElementRule,
};
pub use crate::simulator::{simulate, RfVolume, UsSimulator};
