// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Display-ready products of an RF volume.
//!
//! Nothing here renders; the arrays are meant for an external plotting tool.

use ndarray::{Array2, Array3, Axis};

use crate::error::{Result, SimError};

/// Default spacing, in time samples, between animation frames.
pub const DEFAULT_FRAME_STRIDE: usize = 20;

/// Frames, still image and energy map of one RF volume.
#[derive(Debug, Clone)]
pub struct Animation {
    /// Time sample of every frame.
    pub frame_indices: Vec<usize>,
    /// Spatial slices `rf[.., .., t]` for every `t` in `frame_indices`.
    pub frames: Array3<f64>,
    /// Largest `|rf|` of the whole volume; the frames share the colour range
    /// `[-amplitude_limit, amplitude_limit]`.
    pub amplitude_limit: f64,
    /// Time sample of the still frame (the middle of the sequence).
    pub still_index: usize,
    /// The still frame.
    pub still: Array2<f64>,
    /// Largest `|still|`.
    pub still_limit: f64,
    /// `Σ_t |rf|`, the time-integrated field.
    pub energy: Array2<f64>,
    /// `[left, right, bottom, top]` in millimetres.
    pub extent_mm: [f64; 4],
}

fn max_abs<'a>(values: impl IntoIterator<Item = &'a f64>) -> f64 {
    values.into_iter().fold(0.0, |m, v| m.max(v.abs()))
}

/// Prepare the animation products of `rf` with the default frame stride.
///
/// `fov_x` is the lateral field of view and `fov_z` the depth, both in metres.
pub fn prepare_animation(rf: &Array3<f64>, fov_x: f64, fov_z: f64) -> Result<Animation> {
    prepare_animation_with_stride(rf, fov_x, fov_z, DEFAULT_FRAME_STRIDE)
}

/// Prepare the animation products of `rf`, keeping every `stride`-th sample.
///
/// # Errors
/// [`SimError::EmptyGrid`] for a volume without samples,
/// [`SimError::InvalidParameter`] for a zero stride or a non-positive field
/// of view.
pub fn prepare_animation_with_stride(
    rf: &Array3<f64>,
    fov_x: f64,
    fov_z: f64,
    stride: usize,
) -> Result<Animation> {
    if rf.is_empty() {
        return Err(SimError::EmptyGrid);
    }
    if stride == 0 {
        return Err(SimError::InvalidParameter {
            name: "stride",
            value: 0.0,
            reason: "must be at least 1",
        });
    }
    for (name, value) in [("fov_x", fov_x), ("fov_z", fov_z)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(SimError::InvalidParameter {
                name,
                value,
                reason: "must be positive and finite",
            });
        }
    }

    let nt = rf.len_of(Axis(2));
    let frame_indices: Vec<usize> = (0..nt).step_by(stride).collect();
    let frames = rf.select(Axis(2), &frame_indices);
    let frames = frames.permuted_axes([2, 0, 1]).as_standard_layout().to_owned();

    let still_index = nt / 2;
    let still = rf.index_axis(Axis(2), still_index).to_owned();
    let energy = rf.mapv(f64::abs).sum_axis(Axis(2));

    tracing::debug!(
        frames = frame_indices.len(),
        still_index,
        "prepared RF animation"
    );

    Ok(Animation {
        amplitude_limit: max_abs(rf.iter()),
        still_limit: max_abs(still.iter()),
        frame_indices,
        frames,
        still_index,
        still,
        energy,
        extent_mm: [-fov_x * 500.0, fov_x * 500.0, fov_z * 1000.0, 0.0],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(nt: usize) -> Array3<f64> {
        Array3::from_shape_fn((2, 3, nt), |(i, j, t)| {
            let v = (i + j) as f64 + t as f64 / 10.0;
            if t % 2 == 0 {
                v
            } else {
                -v
            }
        })
    }

    #[test]
    fn frames_every_stride_samples() {
        let rf = ramp(45);
        let anim = prepare_animation(&rf, 20e-3, 40e-3).unwrap();
        assert_eq!(anim.frame_indices, vec![0, 20, 40]);
        assert_eq!(anim.frames.dim(), (3, 2, 3));
        assert_eq!(anim.frames[[1, 1, 2]], rf[[1, 2, 20]]);
    }

    #[test]
    fn limits_and_energy() {
        let rf = ramp(5);
        let anim = prepare_animation_with_stride(&rf, 10e-3, 30e-3, 1).unwrap();
        // largest magnitude: i + j = 3 at t = 4
        assert!((anim.amplitude_limit - 3.4).abs() < 1e-12);
        assert_eq!(anim.still_index, 2);
        assert!((anim.still_limit - 3.2).abs() < 1e-12);
        // (0, 0): 0 + 0.1 + 0.2 + 0.3 + 0.4
        assert!((anim.energy[[0, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(anim.energy.dim(), (2, 3));
    }

    #[test]
    fn extent_in_millimetres() {
        let anim = prepare_animation(&ramp(3), 20e-3, 40e-3).unwrap();
        let expected = [-10.0, 10.0, 40.0, 0.0];
        for (a, b) in anim.extent_mm.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_bad_inputs() {
        let rf = ramp(3);
        assert!(matches!(
            prepare_animation_with_stride(&rf, 1e-3, 1e-3, 0),
            Err(SimError::InvalidParameter { name: "stride", .. })
        ));
        assert!(matches!(
            prepare_animation(&rf, -1.0, 1e-3),
            Err(SimError::InvalidParameter { name: "fov_x", .. })
        ));
        assert!(matches!(
            prepare_animation(&Array3::zeros((2, 2, 0)), 1e-3, 1e-3),
            Err(SimError::EmptyGrid)
        ));
    }
}
