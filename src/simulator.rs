// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::time::Instant;

use ndarray::{Array2, Array3};

use crate::assemble::{assemble, AssemblyPlan};
use crate::core::{Precision, Real};
use crate::error::{Result, SimError};
use crate::field::{CancelToken, FieldSynthesizer, ProgressInfo};
use crate::geometry::{ElementArray, ScattererField};
use crate::grid::FrequencyGrid;
use crate::params::{DerivedParameters, SimulationParameters};
use crate::spectrum::SpectralFilters;

/// Simulated RF signal indexed `(grid axis, grid axis, time sample)`.
pub type RfVolume = Array3<f64>;

/// Everything derived from the inputs before the frequency loop starts.
#[derive(Debug)]
pub struct SimulationPlan<F> {
    prm: DerivedParameters<F>,
    elements: ElementArray<F>,
    scatterers: ScattererField<F>,
    grid: FrequencyGrid<F>,
    filters: SpectralFilters<F>,
}

impl<F: Real> SimulationPlan<F> {
    /// The transmit array.
    pub fn elements(&self) -> &ElementArray<F> {
        &self.elements
    }

    /// The flattened scatterer field.
    pub fn scatterers(&self) -> &ScattererField<F> {
        &self.scatterers
    }

    /// The time window and frequency bins.
    pub fn grid(&self) -> &FrequencyGrid<F> {
        &self.grid
    }

    /// The pulse and element spectra.
    pub fn filters(&self) -> &SpectralFilters<F> {
        &self.filters
    }

    /// Number of samples per output trace.
    pub fn output_len(&self) -> Result<usize> {
        self.assembly_plan().output_len()
    }

    /// Approximate peak working set of the run in bytes for `threads` workers.
    pub fn estimated_bytes(&self, threads: usize) -> usize {
        let real = std::mem::size_of::<F>();
        let complex = F::complex_bytes();
        let ns = self.scatterers.len();
        let ne = self.elements.len();
        let nf = self.grid.num_bins();
        let nt = self.grid.nt();
        let pairs = ns.saturating_mul(ne).saturating_mul(5 * real);
        let phasors = nf.saturating_mul(ne).saturating_mul(complex);
        let field = nf.saturating_mul(ns).saturating_mul(complex);
        let traces = ns.saturating_mul(self.grid.valid_len()).saturating_mul(real);
        let scratch = threads.saturating_mul(2 * nt).saturating_mul(complex);
        pairs
            .saturating_add(phasors)
            .saturating_add(field)
            .saturating_add(traces)
            .saturating_add(scratch)
    }

    fn assembly_plan(&self) -> AssemblyPlan {
        AssemblyPlan {
            nt: self.grid.nt(),
            valid_len: self.grid.valid_len(),
            trailing_trim: self.prm.trailing_trim,
            grid_shape: self.scatterers.shape(),
            layout: self.prm.layout,
        }
    }
}

/// Ultrasound forward simulator running in precision `F`.
///
/// Computes, for every scatterer of a grid, the RF signal produced by a
/// linear array transmitting with the given delays and apodization.
pub struct UsSimulator<F> {
    params: SimulationParameters,
    num_threads: Option<usize>,
    memory_limit: Option<usize>,
    progress_callback: Option<Box<dyn Fn(ProgressInfo) + Send + Sync>>,
    cancel: Option<CancelToken>,
    _precision: std::marker::PhantomData<F>,
}

impl<F: Real> UsSimulator<F> {
    /// Create a simulator for the given parameters.
    ///
    /// The parameters are copied; the caller's value is never modified.
    ///
    /// # Errors
    /// Returns an error if any parameter is invalid.
    pub fn new(params: &SimulationParameters) -> Result<Self> {
        params.validate()?;
        Ok(UsSimulator {
            params: params.clone(),
            num_threads: None,
            memory_limit: None,
            progress_callback: None,
            cancel: None,
            _precision: std::marker::PhantomData,
        })
    }

    /// Set the number of worker threads (builder method).
    /// If not specified, defaults to the number of available CPU cores.
    /// The output is identical for every thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Refuse runs whose estimated working set exceeds `bytes` (builder method).
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Set a progress callback invoked about every 500ms and once at the end
    /// of the frequency loop (builder method).
    pub fn with_progress(mut self, callback: Box<dyn Fn(ProgressInfo) + Send + Sync>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Attach a cancellation token checked between frequency bins (builder method).
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The parameters this simulator was created with.
    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    fn get_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Derive geometry, time grid and spectra without running the frequency loop.
    ///
    /// # Errors
    /// Returns the first configuration or domain error found.
    pub fn plan(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        z: &Array2<f64>,
        delays: &[f64],
        apodization: &[f64],
    ) -> Result<SimulationPlan<F>> {
        let prm = self.params.derive::<F>()?;
        let elements = ElementArray::build(&prm, delays, apodization)?;
        let scatterers = ScattererField::from_grids(x, y, z)?;
        let grid = FrequencyGrid::plan(&prm, &elements, &scatterers)?;
        let filters = SpectralFilters::build(&prm, &grid)?;
        let lengths = [
            ("pulse", filters.pulse().len()),
            ("element", filters.element().len()),
        ];
        for (name, len) in lengths {
            if len != grid.num_bins() {
                return Err(SimError::SpectrumLengthMismatch {
                    name,
                    expected: grid.num_bins(),
                    got: len,
                });
            }
        }

        if self.params.pitch > self.params.wavelength() / 2.0 {
            tracing::warn!(
                pitch = self.params.pitch,
                wavelength = self.params.wavelength(),
                "pitch exceeds half a wavelength; steered fields will show grating lobes"
            );
        }

        Ok(SimulationPlan {
            prm,
            elements,
            scatterers,
            grid,
            filters,
        })
    }

    /// Run the simulation.
    ///
    /// `x`, `y` and `z` are equal-shaped grids of scatterer coordinates;
    /// `delays` (seconds) and `apodization` hold one value per element.
    /// Returns the RF volume indexed `(grid axis, grid axis, time)` in the
    /// order selected by [`OutputLayout`](crate::params::OutputLayout).
    ///
    /// # Errors
    /// Configuration and domain errors are reported before the frequency
    /// loop; see [`SimError`].
    pub fn run(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        z: &Array2<f64>,
        delays: &[f64],
        apodization: &[f64],
    ) -> Result<Array3<F>> {
        let plan = self.plan(x, y, z, delays, apodization)?;
        self.execute(&plan)
    }

    /// Run the frequency loop and the inverse transform of a prepared plan.
    ///
    /// # Errors
    /// Returns [`SimError::InsufficientMemory`], [`SimError::CoincidentScatterer`]
    /// or [`SimError::Cancelled`].
    pub fn execute(&self, plan: &SimulationPlan<F>) -> Result<Array3<F>> {
        let num_threads = self.get_num_threads();
        let assembly = plan.assembly_plan();
        assembly.output_len()?;

        let requested = plan.estimated_bytes(num_threads);
        if let Some(limit) = self.memory_limit {
            if requested > limit {
                return Err(SimError::InsufficientMemory {
                    requested,
                    limit: Some(limit),
                });
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| SimError::Other(e.to_string()))?;

        tracing::info!(
            precision = ?F::PRECISION,
            scatterers = plan.scatterers.len(),
            elements = plan.elements.len(),
            bins = plan.grid.num_bins(),
            nt = plan.grid.nt(),
            threads = num_threads,
            estimated_bytes = requested,
            "starting ultrasound simulation"
        );
        let start = Instant::now();

        let progress = self
            .progress_callback
            .as_deref()
            .map(|cb| cb as &(dyn Fn(ProgressInfo) + Sync));
        let synthesizer = FieldSynthesizer::new(
            &plan.prm,
            &plan.elements,
            &plan.scatterers,
            &plan.grid,
            &plan.filters,
        );
        let spectrum = synthesizer.run(&pool, self.cancel.as_ref(), progress)?;
        let rf = assemble(&spectrum, &assembly, &pool)?;

        tracing::info!(
            shape = ?rf.dim(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ultrasound simulation finished"
        );
        Ok(rf)
    }
}

/// Simulate RF signals with the precision selected in `params`.
///
/// Convenience wrapper around [`UsSimulator`] using all cores; the result is
/// widened to `f64` whatever precision the run used.
///
/// # Errors
/// See [`UsSimulator::run`].
pub fn simulate(
    x: &Array2<f64>,
    y: &Array2<f64>,
    z: &Array2<f64>,
    delays: &[f64],
    apodization: &[f64],
    params: &SimulationParameters,
) -> Result<RfVolume> {
    match params.precision {
        Precision::Single => {
            let rf = UsSimulator::<f32>::new(params)?.run(x, y, z, delays, apodization)?;
            Ok(rf.mapv(|v| v as f64))
        }
        Precision::Double => UsSimulator::<f64>::new(params)?.run(x, y, z, delays, apodization),
    }
}

/// Per-element delays steering a plane wave by `angle` radians, the
/// earliest firing element at zero delay.
pub fn plane_wave_delays(params: &SimulationParameters, angle: f64) -> Vec<f64> {
    let n = params.num_elements;
    let half = (n as f64 - 1.0) * params.pitch / 2.0;
    let raw: Vec<f64> = (0..n)
        .map(|i| (i as f64 * params.pitch - half) * angle.sin() / params.speed_of_sound)
        .collect();
    let min = raw.iter().cloned().fold(f64::INFINITY, f64::min);
    raw.into_iter().map(|d| d - min).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Propagation;

    fn on_axis(depth: f64) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
        (
            Array2::zeros((1, 1)),
            Array2::zeros((1, 1)),
            Array2::from_elem((1, 1), depth),
        )
    }

    #[test]
    fn rejects_invalid_params_at_construction() {
        let prm = SimulationParameters::default().with_sample_rate(-1.0);
        assert!(matches!(
            UsSimulator::<f32>::new(&prm),
            Err(SimError::InvalidParameter {
                name: "sample_rate",
                ..
            })
        ));
    }

    #[test]
    fn memory_limit_fails_before_work() {
        let prm = SimulationParameters::linear_probe(16, 0.3e-3, 5e6);
        let (x, y, z) = on_axis(10e-3);
        let sim = UsSimulator::<f32>::new(&prm).unwrap().with_memory_limit(16);
        let result = sim.run(&x, &y, &z, &[0.0; 16], &[1.0; 16]);
        assert!(matches!(
            result,
            Err(SimError::InsufficientMemory {
                limit: Some(16),
                ..
            })
        ));
    }

    #[test]
    fn plan_sizes_agree() {
        let prm = SimulationParameters::linear_probe(16, 0.3e-3, 5e6);
        let (x, y, z) = on_axis(10e-3);
        let sim = UsSimulator::<f64>::new(&prm).unwrap();
        let plan = sim.plan(&x, &y, &z, &[0.0; 16], &[1.0; 16]).unwrap();
        assert_eq!(plan.grid().nt() % 8, 0);
        assert_eq!(plan.filters().pulse().len(), plan.grid().nt() / 2);
        assert_eq!(plan.filters().element().len(), plan.grid().nt() / 2);
        assert!(plan.estimated_bytes(1) > 0);
    }

    #[test]
    fn simulate_widens_single_precision() {
        let prm = SimulationParameters::linear_probe(8, 0.3e-3, 5e6)
            .with_propagation(Propagation::PulseEcho);
        let (x, y, z) = on_axis(8e-3);
        let rf = simulate(&x, &y, &z, &[0.0; 8], &[1.0; 8], &prm).unwrap();
        let direct = UsSimulator::<f32>::new(&prm)
            .unwrap()
            .run(&x, &y, &z, &[0.0; 8], &[1.0; 8])
            .unwrap();
        assert_eq!(rf.dim(), direct.dim());
        for (a, b) in rf.iter().zip(direct.iter()) {
            assert_eq!(*a, *b as f64);
        }
    }

    #[test]
    fn plane_wave_delays_are_non_negative() {
        let prm = SimulationParameters::linear_probe(5, 1e-3, 5e6);
        let d = plane_wave_delays(&prm, 10f64.to_radians());
        assert_eq!(d.len(), 5);
        assert_eq!(d[0], 0.0);
        assert!(d.windows(2).all(|w| w[1] > w[0]));
        let zero = plane_wave_delays(&prm, 0.0);
        assert!(zero.iter().all(|&v| v == 0.0));
    }
}
