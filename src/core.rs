// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt::{Debug, Display};
use std::iter::Sum;

use num_complex::Complex;
use num_traits::{Float, NumAssign};
use rustfft::FftNum;

use crate::error::{Result, SimError};

/// Numeric precision of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// `f32` reals and `Complex<f32>` phasors.
    #[default]
    Single,
    /// `f64` reals and `Complex<f64>` phasors.
    Double,
}

/// Real scalar type a simulation runs in.
///
/// Every real quantity of one run uses the same `Real`, and every complex
/// quantity uses `Complex<Real>`.
pub trait Real: FftNum + Float + NumAssign + Sum + Display + Debug + Default {
    /// The precision tag of this type.
    const PRECISION: Precision;

    /// Convert from `f64`, rounding to the nearest representable value.
    fn from_f64_lossy(v: f64) -> Self;

    /// Widen to `f64`.
    fn into_f64(self) -> f64;

    /// Size of one complex sample in bytes.
    fn complex_bytes() -> usize {
        std::mem::size_of::<Complex<Self>>()
    }
}

impl Real for f32 {
    const PRECISION: Precision = Precision::Single;

    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    const PRECISION: Precision = Precision::Double;

    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        v
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self
    }
}

/// A point or displacement in 3D space: x along the array, y in elevation, z in depth.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3<F> {
    /// Lateral coordinate.
    pub x: F,
    /// Elevation coordinate.
    pub y: F,
    /// Depth coordinate.
    pub z: F,
}

impl<F: Real> Point3<F> {
    /// Build a point from its coordinates.
    pub fn new(x: F, y: F, z: F) -> Self {
        Point3 { x, y, z }
    }

    /// Component-wise difference `self - other`.
    #[inline]
    pub fn sub(self, other: Self) -> Self {
        Point3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    /// Euclidean length.
    #[inline]
    pub fn norm(self) -> F {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Normalized sinc, `sin(πx)/(πx)` with `sinc(0) = 1`.
#[inline]
pub fn sinc<F: Real>(x: F) -> F {
    if x == F::zero() {
        return F::one();
    }
    let px = F::from_f64_lossy(std::f64::consts::PI) * x;
    px.sin() / px
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace<F: Real>(start: F, stop: F, n: usize) -> Vec<F> {
    let mut v = vec![start; n];
    fill_linspace(&mut v, start, stop);
    v
}

/// [`linspace`] with allocator failure reported as
/// [`SimError::InsufficientMemory`].
pub(crate) fn try_linspace<F: Real>(start: F, stop: F, n: usize) -> Result<Vec<F>> {
    let mut v = try_filled_vec(n, start)?;
    fill_linspace(&mut v, start, stop);
    Ok(v)
}

fn fill_linspace<F: Real>(out: &mut [F], start: F, stop: F) {
    let n = out.len();
    if n < 2 {
        return;
    }
    let step = (stop - start) / F::from_f64_lossy((n - 1) as f64);
    for (i, v) in out.iter_mut().enumerate() {
        *v = start + step * F::from_f64_lossy(i as f64);
    }
}

/// Allocate a vector of `len` copies of `value`, reporting allocator failure
/// as [`SimError::InsufficientMemory`] instead of aborting.
pub(crate) fn try_filled_vec<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let requested = len.saturating_mul(std::mem::size_of::<T>());
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| SimError::InsufficientMemory {
        requested,
        limit: None,
    })?;
    v.resize(len, value);
    Ok(v)
}
