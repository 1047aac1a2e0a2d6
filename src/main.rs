// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ndarray::Array2;
use tracing_subscriber::EnvFilter;

use imaging_sim::core::{linspace, Precision, Real};
use imaging_sim::params::{
    Baffle, Elevation, OutputLayout, Propagation, PulseAlignment, SimulationParameters,
    SubElementRule,
};
use imaging_sim::simulator::{plane_wave_delays, UsSimulator};
use imaging_sim::spectrum::tone_burst;
use imaging_sim::{ct, io, viz, ProgressInfo, RfVolume};

#[derive(Parser)]
#[command(
    name = "imaging-sim",
    about = "Ultrasound forward simulation and CT projections"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate the RF field of a linear array over a scatterer grid
    Us(UsArgs),
    /// Project and retroproject the Shepp-Logan phantom
    Ct(CtArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum BaffleArg {
    Hard,
    Soft,
}

#[derive(Clone, Copy, ValueEnum)]
enum PrecisionArg {
    Single,
    Double,
}

#[derive(Clone, Copy, ValueEnum)]
enum PropagationArg {
    OneWay,
    PulseEcho,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlignmentArg {
    Onset,
    Centered,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Transposed,
    Grid,
}

#[derive(Args)]
struct UsArgs {
    /// Number of elements
    #[arg(long, default_value = "128")]
    elements: usize,

    /// Element pitch (m)
    #[arg(long, default_value = "0.3e-3")]
    pitch: f64,

    /// Element width (m), default 90 % of the pitch
    #[arg(long)]
    width: Option<f64>,

    /// Model the elevation with this element height (m)
    #[arg(long)]
    height: Option<f64>,

    /// Fixed elevation sub-element count (rounded up to odd)
    #[arg(long, requires = "height")]
    sub_elements: Option<usize>,

    /// Elevation focal depth (m); "inf" for no elevation lens
    #[arg(long, default_value = "20e-3")]
    elevation_focus: f64,

    /// Speed of sound (m/s)
    #[arg(short = 'c', long, default_value = "1540")]
    speed_of_sound: f64,

    /// Center frequency (Hz)
    #[arg(long, default_value = "5e6")]
    fc: f64,

    /// Fractional element bandwidth
    #[arg(long, default_value = "0.6")]
    bandwidth: f64,

    /// Tone-burst cycles of the default pulse
    #[arg(long, default_value = "2")]
    cycles: f64,

    /// Transmit pulse file (.npy or .mat variable "pulse")
    #[arg(long)]
    pulse: Option<PathBuf>,

    /// Pulse sample rate (Hz), default 10 × fc
    #[arg(long)]
    pulse_rate: Option<f64>,

    /// Simulation sample rate (Hz), default 4 × fc
    #[arg(long)]
    fs: Option<f64>,

    /// Baffle model
    #[arg(long, value_enum, default_value = "soft")]
    baffle: BaffleArg,

    /// Numeric precision
    #[arg(long, value_enum, default_value = "single")]
    precision: PrecisionArg,

    /// Transmit field or pulse-echo
    #[arg(long, value_enum, default_value = "one-way")]
    propagation: PropagationArg,

    /// Waveform alignment
    #[arg(long, value_enum, default_value = "onset")]
    alignment: AlignmentArg,

    /// Samples dropped from the end of every trace
    #[arg(long, default_value = "0")]
    trim: usize,

    /// Output axis order
    #[arg(long, value_enum, default_value = "transposed")]
    layout: LayoutArg,

    /// Plane-wave steering angle (degrees)
    #[arg(long, default_value = "0")]
    angle: f64,

    /// Lateral field of view of the regular grid (m)
    #[arg(long, default_value = "20e-3")]
    fov_x: f64,

    /// Depth of the regular grid (m)
    #[arg(long, default_value = "40e-3")]
    fov_z: f64,

    /// Lateral grid points
    #[arg(long, default_value = "101")]
    nx: usize,

    /// Depth grid points
    #[arg(long, default_value = "201")]
    nz: usize,

    /// Scatterer grid files x, y, z (.npy, or .mat variables "x", "y", "z")
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"])]
    grid: Option<Vec<PathBuf>>,

    /// Output file path (.npy or .mat)
    #[arg(short = 'o', long, default_value = "rf.npy")]
    output: PathBuf,

    /// Directory for animation frames, still frame and energy map
    #[arg(long)]
    viz_dir: Option<PathBuf>,

    /// Number of Rayon worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Refuse runs needing more than this many MiB
    #[arg(long)]
    memory_limit_mb: Option<usize>,

    /// Print progress to stderr
    #[arg(long)]
    progress: bool,
}

#[derive(Args)]
struct CtArgs {
    /// Phantom size in pixels
    #[arg(long, default_value = "256")]
    size: usize,

    /// Number of projection angles over [0, 180)
    #[arg(long, default_value = "180")]
    angles: usize,

    /// Sinogram output (.npy or .mat)
    #[arg(short = 'o', long, default_value = "sinogram.npy")]
    output: PathBuf,

    /// Retroprojection output (.npy or .mat)
    #[arg(long)]
    reconstruction: Option<PathBuf>,
}

impl UsArgs {
    fn params(&self) -> Result<SimulationParameters> {
        let mut prm = SimulationParameters::linear_probe(self.elements, self.pitch, self.fc)
            .with_elevation_focus(self.elevation_focus)
            .with_speed_of_sound(self.speed_of_sound)
            .with_element_bandwidth(self.bandwidth)
            .with_trailing_trim(self.trim)
            .with_baffle(match self.baffle {
                BaffleArg::Hard => Baffle::Hard,
                BaffleArg::Soft => Baffle::Soft,
            })
            .with_precision(match self.precision {
                PrecisionArg::Single => Precision::Single,
                PrecisionArg::Double => Precision::Double,
            })
            .with_propagation(match self.propagation {
                PropagationArg::OneWay => Propagation::OneWay,
                PropagationArg::PulseEcho => Propagation::PulseEcho,
            })
            .with_alignment(match self.alignment {
                AlignmentArg::Onset => PulseAlignment::Onset,
                AlignmentArg::Centered => PulseAlignment::Centered,
            })
            .with_layout(match self.layout {
                LayoutArg::Transposed => OutputLayout::Transposed,
                LayoutArg::Grid => OutputLayout::Grid,
            });

        if let Some(width) = self.width {
            prm = prm.with_width(width);
        }
        if let Some(height) = self.height {
            prm = prm.with_elevation(Elevation::Height(height));
        }
        if let Some(n) = self.sub_elements {
            prm = prm.with_sub_element_rule(SubElementRule::Fixed(n));
        }
        if let Some(fs) = self.fs {
            prm = prm.with_sample_rate(fs);
        }

        let pulse_rate = self.pulse_rate.unwrap_or(10.0 * self.fc);
        let pulse = match &self.pulse {
            Some(path) => io::load_pulse(path, "pulse")
                .with_context(|| format!("reading pulse from {}", path.display()))?,
            None => tone_burst(self.fc, self.cycles, pulse_rate)
                .context("building the transmit tone burst")?,
        };
        Ok(prm.with_pulse(pulse, pulse_rate))
    }

    fn scatterer_grid(&self) -> Result<(Array2<f64>, Array2<f64>, Array2<f64>)> {
        if let Some(paths) = &self.grid {
            let load = |path: &Path, name: &str| {
                io::load_grid(path, name)
                    .with_context(|| format!("reading grid {} from {}", name, path.display()))
            };
            return Ok((
                load(&paths[0], "x")?,
                load(&paths[1], "y")?,
                load(&paths[2], "z")?,
            ));
        }

        if self.nx == 0 || self.nz == 0 {
            bail!("--nx and --nz must be at least 1");
        }
        // depth starts one step below the array face
        let xs = linspace(-self.fov_x / 2.0, self.fov_x / 2.0, self.nx);
        let zs = linspace(self.fov_z / self.nz as f64, self.fov_z, self.nz);
        let x = Array2::from_shape_fn((self.nx, self.nz), |(i, _)| xs[i]);
        let z = Array2::from_shape_fn((self.nx, self.nz), |(_, j)| zs[j]);
        Ok((x, Array2::zeros((self.nx, self.nz)), z))
    }
}

fn progress_printer() -> Box<dyn Fn(ProgressInfo) + Send + Sync> {
    Box::new(|info: ProgressInfo| {
        eprintln!(
            "[{:.1}s] frequency bins {}/{}",
            info.elapsed.as_secs_f64(),
            info.bins_done,
            info.total_bins,
        );
    })
}

fn run_simulator<F: Real>(
    args: &UsArgs,
    params: &SimulationParameters,
    grids: &(Array2<f64>, Array2<f64>, Array2<f64>),
    delays: &[f64],
    apodization: &[f64],
) -> Result<RfVolume> {
    let mut sim = UsSimulator::<F>::new(params)?;
    if let Some(threads) = args.threads {
        sim = sim.with_threads(threads);
    }
    if let Some(mb) = args.memory_limit_mb {
        sim = sim.with_memory_limit(mb.saturating_mul(1024 * 1024));
    }
    if args.progress {
        sim = sim.with_progress(progress_printer());
    }
    let (x, y, z) = grids;
    let rf = sim.run(x, y, z, delays, apodization)?;
    Ok(rf.mapv(|v| v.into_f64()))
}

fn run_us(args: &UsArgs) -> Result<()> {
    let params = args.params()?;
    let grids = args.scatterer_grid()?;
    let delays = plane_wave_delays(&params, args.angle.to_radians());
    let apodization = vec![1.0; params.num_elements];

    let rf = match params.precision {
        Precision::Single => run_simulator::<f32>(args, &params, &grids, &delays, &apodization)?,
        Precision::Double => run_simulator::<f64>(args, &params, &grids, &delays, &apodization)?,
    };

    io::save_array(rf.view().into_dyn(), &args.output, "rf")
        .with_context(|| format!("writing {}", args.output.display()))?;
    tracing::info!(path = %args.output.display(), shape = ?rf.dim(), "saved RF volume");

    if let Some(dir) = &args.viz_dir {
        let anim = viz::prepare_animation(&rf, args.fov_x, args.fov_z)?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        io::save_npy(anim.frames.view().into_dyn(), &dir.join("frames.npy"))?;
        io::save_npy(anim.still.view().into_dyn(), &dir.join("still.npy"))?;
        io::save_npy(anim.energy.view().into_dyn(), &dir.join("energy.npy"))?;
        tracing::info!(
            dir = %dir.display(),
            frames = anim.frame_indices.len(),
            amplitude_limit = anim.amplitude_limit,
            still_limit = anim.still_limit,
            extent_mm = ?anim.extent_mm,
            "saved animation products"
        );
    }
    Ok(())
}

fn run_ct(args: &CtArgs) -> Result<()> {
    if args.angles == 0 {
        bail!("--angles must be at least 1");
    }
    let step = 180.0 / args.angles as f64;
    let angles: Vec<f64> = (0..args.angles).map(|i| i as f64 * step).collect();
    let phantom = ct::shepp_logan_phantom(args.size);
    let sinogram = ct::forward_project(&phantom, &angles)?;
    io::save_array(sinogram.view().into_dyn(), &args.output, "sinogram")
        .with_context(|| format!("writing {}", args.output.display()))?;
    tracing::info!(path = %args.output.display(), shape = ?sinogram.dim(), "saved sinogram");

    if let Some(path) = &args.reconstruction {
        let image = ct::back_project(&sinogram, &angles)?;
        io::save_array(image.view().into_dyn(), path, "image")
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "saved retroprojection");
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Us(args) => run_us(args),
        Command::Ct(args) => run_ct(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us_args(extra: &[&str]) -> UsArgs {
        let mut argv = vec!["imaging-sim", "us"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Us(args) => args,
            Command::Ct(_) => unreachable!(),
        }
    }

    #[test]
    fn zero_center_frequency_is_an_error() {
        let args = us_args(&["--fc", "0", "--pulse-rate", "50e6"]);
        let err = args.params().unwrap_err();
        assert!(format!("{:#}", err).contains("center_frequency"), "{:#}", err);
    }

    #[test]
    fn default_pulse_is_a_tone_burst() {
        let prm = us_args(&[]).params().unwrap();
        // 2 cycles at 5 MHz sampled at 50 MHz
        assert_eq!(prm.pulse.len(), 20);
        prm.validate().unwrap();
    }
}
