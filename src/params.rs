// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::core::{Precision, Real};
use crate::error::{Result, SimError};

/// Elevation (y) extent of the elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Elevation {
    /// One row of point-like elements at y = 0 (cylindrical spreading).
    SingleRow,
    /// Elements of the given height in metres, split into sub-elements
    /// (spherical spreading).
    Height(f64),
}

/// How the number of elevation sub-elements is derived from the height.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SubElementRule {
    /// `2 * floor(height / wavelength) + 1` sub-elements.
    #[default]
    Wavelength,
    /// A fixed count, rounded up to the next odd number so one sub-element
    /// sits on the array axis.
    Fixed(usize),
}

/// Boundary model for the radiating face of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Baffle {
    /// Rigid baffle: directivity includes a `cos²θ` obliquity factor.
    Hard,
    /// Pressure-release baffle: no obliquity factor.
    #[default]
    Soft,
}

/// Which field the simulator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Transmitted pressure at every scatterer location over time.
    #[default]
    OneWay,
    /// Echo of every scatterer received by the whole (unsteered) aperture.
    PulseEcho,
}

impl Propagation {
    /// Number of times a wave crosses the medium.
    pub fn passes(self) -> usize {
        match self {
            Propagation::OneWay => 1,
            Propagation::PulseEcho => 2,
        }
    }
}

/// Where the band-limited waveform sits relative to the arrival time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PulseAlignment {
    /// The waveform starts at the arrival time.
    #[default]
    Onset,
    /// The waveform is centred on the arrival time.
    Centered,
}

/// Axis order of the output volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    /// `(grid columns, grid rows, time)`.
    #[default]
    Transposed,
    /// `(grid rows, grid columns, time)`.
    Grid,
}

/// Probe, medium and sampling description of an ultrasound simulation.
///
/// All lengths are in metres, times in seconds and frequencies in hertz.
/// The simulator never modifies a `SimulationParameters`; it derives its own
/// precision-converted copy for each run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParameters {
    /// Number of transmit elements.
    pub num_elements: usize,
    /// Centre-to-centre element spacing.
    pub pitch: f64,
    /// Element width along the array.
    pub width: f64,
    /// Elevation model.
    pub elevation: Elevation,
    /// Elevation lens focal depth. `f64::INFINITY` means an unfocused elevation.
    pub elevation_focus: f64,
    /// Speed of sound in the medium.
    pub speed_of_sound: f64,
    /// Probe centre frequency.
    pub center_frequency: f64,
    /// Fractional element bandwidth (e.g. 0.6 for 60 %).
    pub element_bandwidth: f64,
    /// Transmitted pulse samples.
    pub pulse: Vec<f64>,
    /// Sample rate of `pulse`.
    pub pulse_sample_rate: f64,
    /// Sample rate of the simulated RF signals.
    pub sample_rate: f64,
    /// Baffle model.
    pub baffle: Baffle,
    /// Numeric precision of the run.
    pub precision: Precision,
    /// Elevation sub-element derivation.
    pub sub_element_rule: SubElementRule,
    /// One-way field or pulse-echo.
    pub propagation: Propagation,
    /// Waveform alignment.
    pub alignment: PulseAlignment,
    /// Samples dropped from the end of every trace.
    pub trailing_trim: usize,
    /// Output axis order.
    pub layout: OutputLayout,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        SimulationParameters::linear_probe(128, 0.3e-3, 5e6)
    }
}

impl SimulationParameters {
    /// A linear array in soft tissue with course defaults: element width of
    /// 90 % of the pitch, 5 mm elevation height (not modeled until
    /// [`with_elevation`](Self::with_elevation) is called), 20 mm elevation
    /// focus, 60 % bandwidth, a 2-cycle tone burst sampled at 10× the centre
    /// frequency and simulated at 4× the centre frequency.
    ///
    /// A centre frequency that cannot produce a burst leaves the pulse empty;
    /// [`validate`](Self::validate) reports it.
    pub fn linear_probe(num_elements: usize, pitch: f64, center_frequency: f64) -> Self {
        let pulse_sample_rate = 10.0 * center_frequency;
        SimulationParameters {
            num_elements,
            pitch,
            width: 0.9 * pitch,
            elevation: Elevation::SingleRow,
            elevation_focus: 20e-3,
            speed_of_sound: 1540.0,
            center_frequency,
            element_bandwidth: 0.6,
            pulse: crate::spectrum::tone_burst(center_frequency, 2.0, pulse_sample_rate)
                .unwrap_or_default(),
            pulse_sample_rate,
            sample_rate: 4.0 * center_frequency,
            baffle: Baffle::Soft,
            precision: Precision::Single,
            sub_element_rule: SubElementRule::Wavelength,
            propagation: Propagation::OneWay,
            alignment: PulseAlignment::Onset,
            trailing_trim: 0,
            layout: OutputLayout::Transposed,
        }
    }

    /// Set the element width (builder method).
    pub fn with_width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }

    /// Set the elevation model (builder method).
    pub fn with_elevation(mut self, elevation: Elevation) -> Self {
        self.elevation = elevation;
        self
    }

    /// Set the elevation focal depth (builder method).
    pub fn with_elevation_focus(mut self, focus: f64) -> Self {
        self.elevation_focus = focus;
        self
    }

    /// Set the speed of sound (builder method).
    pub fn with_speed_of_sound(mut self, c: f64) -> Self {
        self.speed_of_sound = c;
        self
    }

    /// Set the fractional element bandwidth (builder method).
    pub fn with_element_bandwidth(mut self, bandwidth: f64) -> Self {
        self.element_bandwidth = bandwidth;
        self
    }

    /// Set the transmitted pulse and its sample rate (builder method).
    pub fn with_pulse(mut self, pulse: Vec<f64>, pulse_sample_rate: f64) -> Self {
        self.pulse = pulse;
        self.pulse_sample_rate = pulse_sample_rate;
        self
    }

    /// Set the simulation sample rate (builder method).
    pub fn with_sample_rate(mut self, fs: f64) -> Self {
        self.sample_rate = fs;
        self
    }

    /// Set the baffle model (builder method).
    pub fn with_baffle(mut self, baffle: Baffle) -> Self {
        self.baffle = baffle;
        self
    }

    /// Set the numeric precision (builder method).
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Set the sub-element rule (builder method).
    pub fn with_sub_element_rule(mut self, rule: SubElementRule) -> Self {
        self.sub_element_rule = rule;
        self
    }

    /// Set the propagation mode (builder method).
    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Set the pulse alignment (builder method).
    pub fn with_alignment(mut self, alignment: PulseAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Set the trailing trim in samples (builder method).
    pub fn with_trailing_trim(mut self, samples: usize) -> Self {
        self.trailing_trim = samples;
        self
    }

    /// Set the output layout (builder method).
    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Acoustic wavelength at the centre frequency.
    pub fn wavelength(&self) -> f64 {
        self.speed_of_sound / self.center_frequency
    }

    /// Check every scalar field and the pulse.
    ///
    /// # Errors
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.num_elements == 0 {
            return Err(SimError::InvalidParameter {
                name: "num_elements",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        positive("pitch", self.pitch)?;
        positive("width", self.width)?;
        positive("speed_of_sound", self.speed_of_sound)?;
        positive("center_frequency", self.center_frequency)?;
        positive("element_bandwidth", self.element_bandwidth)?;
        positive("pulse_sample_rate", self.pulse_sample_rate)?;
        positive("sample_rate", self.sample_rate)?;
        if let Elevation::Height(h) = self.elevation {
            positive("height", h)?;
        }
        if self.elevation_focus.is_nan() || self.elevation_focus <= 0.0 {
            return Err(SimError::InvalidParameter {
                name: "elevation_focus",
                value: self.elevation_focus,
                reason: "must be positive",
            });
        }
        if let SubElementRule::Fixed(0) = self.sub_element_rule {
            return Err(SimError::InvalidParameter {
                name: "sub_element_rule",
                value: 0.0,
                reason: "fixed sub-element count must be at least 1",
            });
        }
        if self.pulse.is_empty() {
            return Err(SimError::EmptyPulse);
        }
        for &v in &self.pulse {
            if !v.is_finite() {
                return Err(SimError::InvalidParameter {
                    name: "pulse",
                    value: v,
                    reason: "samples must be finite",
                });
            }
        }
        Ok(())
    }

    /// Derive the run-local copy in precision `F`.
    pub(crate) fn derive<F: Real>(&self) -> Result<DerivedParameters<F>> {
        self.validate()?;
        let lambda = self.wavelength();
        Ok(DerivedParameters {
            num_elements: self.num_elements,
            pitch: F::from_f64_lossy(self.pitch),
            width: F::from_f64_lossy(self.width),
            height: match self.elevation {
                Elevation::SingleRow => None,
                Elevation::Height(h) => Some(F::from_f64_lossy(h)),
            },
            elevation_focus: F::from_f64_lossy(self.elevation_focus),
            c: F::from_f64_lossy(self.speed_of_sound),
            fc: F::from_f64_lossy(self.center_frequency),
            wavelength: F::from_f64_lossy(lambda),
            sub_elements: self.sub_element_count(),
            bandwidth: F::from_f64_lossy(self.element_bandwidth),
            pulse: self
                .pulse
                .iter()
                .map(|&v| F::from_f64_lossy(v))
                .collect(),
            fs_pulse: F::from_f64_lossy(self.pulse_sample_rate),
            fs: F::from_f64_lossy(self.sample_rate),
            baffle: self.baffle,
            propagation: self.propagation,
            alignment: self.alignment,
            trailing_trim: self.trailing_trim,
            layout: self.layout,
        })
    }

    /// Number of elevation sub-elements per element column.
    pub fn sub_element_count(&self) -> usize {
        match self.elevation {
            Elevation::SingleRow => 1,
            Elevation::Height(h) => match self.sub_element_rule {
                SubElementRule::Wavelength => 2 * (h / self.wavelength()).floor() as usize + 1,
                SubElementRule::Fixed(n) => {
                    if n % 2 == 0 {
                        n + 1
                    } else {
                        n
                    }
                }
            },
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SimError::InvalidParameter {
            name,
            value,
            reason: "must be positive and finite",
        });
    }
    Ok(())
}

/// Validated, precision-converted parameters owned by one run.
#[derive(Debug, Clone)]
pub(crate) struct DerivedParameters<F> {
    pub num_elements: usize,
    pub pitch: F,
    pub width: F,
    pub height: Option<F>,
    pub elevation_focus: F,
    pub c: F,
    pub fc: F,
    pub wavelength: F,
    pub sub_elements: usize,
    pub bandwidth: F,
    pub pulse: Vec<F>,
    pub fs_pulse: F,
    pub fs: F,
    pub baffle: Baffle,
    pub propagation: Propagation,
    pub alignment: PulseAlignment,
    pub trailing_trim: usize,
    pub layout: OutputLayout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let prm = SimulationParameters::default();
        prm.validate().unwrap();
        assert_eq!(prm.num_elements, 128);
        assert!((prm.wavelength() - 1540.0 / 5e6).abs() < 1e-15);
    }

    #[test]
    fn rejects_non_positive_speed() {
        let prm = SimulationParameters::default().with_speed_of_sound(0.0);
        assert!(matches!(
            prm.validate(),
            Err(SimError::InvalidParameter {
                name: "speed_of_sound",
                ..
            })
        ));
    }

    #[test]
    fn zero_center_frequency_leaves_pulse_empty() {
        let prm = SimulationParameters::linear_probe(64, 0.3e-3, 0.0);
        assert!(prm.pulse.is_empty());
        assert!(matches!(
            prm.validate(),
            Err(SimError::InvalidParameter {
                name: "center_frequency",
                ..
            })
        ));
    }

    #[test]
    fn rejects_empty_pulse() {
        let prm = SimulationParameters::default().with_pulse(Vec::new(), 50e6);
        assert!(matches!(prm.validate(), Err(SimError::EmptyPulse)));
    }

    #[test]
    fn rejects_nan_sample_rate() {
        let prm = SimulationParameters::default().with_sample_rate(f64::NAN);
        assert!(matches!(
            prm.validate(),
            Err(SimError::InvalidParameter {
                name: "sample_rate",
                ..
            })
        ));
    }

    #[test]
    fn sub_element_count_per_wavelength() {
        // lambda = 0.308 mm, height 5 mm -> floor(16.23) = 16 -> 33
        let prm = SimulationParameters::default().with_elevation(Elevation::Height(5e-3));
        assert_eq!(prm.sub_element_count(), 33);
        let single = SimulationParameters::default();
        assert_eq!(single.sub_element_count(), 1);
    }

    #[test]
    fn sub_element_count_fixed_is_odd() {
        let prm = SimulationParameters::default()
            .with_elevation(Elevation::Height(5e-3))
            .with_sub_element_rule(SubElementRule::Fixed(4));
        assert_eq!(prm.sub_element_count(), 5);
        let prm = prm.with_sub_element_rule(SubElementRule::Fixed(7));
        assert_eq!(prm.sub_element_count(), 7);
    }

    #[test]
    fn derive_leaves_caller_untouched() {
        let prm = SimulationParameters::default();
        let before = prm.clone();
        let derived: DerivedParameters<f32> = prm.derive().unwrap();
        assert_eq!(prm, before);
        assert_eq!(derived.pulse.len(), prm.pulse.len());
        assert_eq!(derived.sub_elements, 1);
    }
}
