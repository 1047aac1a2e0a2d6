// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Broad classification of a [`SimError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or inconsistent simulation parameters or inputs.
    Configuration,
    /// A geometric precondition does not hold.
    Domain,
    /// The requested run does not fit in the configured memory budget.
    Resource,
    /// The run was stopped through its cancellation token.
    Cancelled,
    /// File access or file format problem.
    Io,
}

/// Errors that can occur during simulation setup, I/O, or execution.
#[derive(Debug)]
pub enum SimError {
    /// A scalar parameter is out of its valid range.
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// The value provided.
        value: f64,
        /// The constraint that was violated.
        reason: &'static str,
    },
    /// A per-element sequence does not have one entry per element.
    LengthMismatch {
        /// Name of the offending sequence.
        name: &'static str,
        /// The expected length.
        expected: usize,
        /// The length provided.
        got: usize,
    },
    /// Array shape does not match expected shape.
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// The transmitted pulse has no samples.
    EmptyPulse,
    /// The scatterer grid has no points.
    EmptyGrid,
    /// A spectral filter does not cover every frequency bin.
    SpectrumLengthMismatch {
        /// Which filter is short.
        name: &'static str,
        /// Number of frequency bins.
        expected: usize,
        /// Number of bins the filter provides.
        got: usize,
    },
    /// An elevation sub-element lies farther from the axis than the elevation focus.
    ElevationBeyondFocus {
        /// Largest elevation offset of the array.
        offset: f64,
        /// Elevation focal depth.
        focus: f64,
    },
    /// A scatterer coincides with an element centre (zero propagation distance).
    CoincidentScatterer {
        /// Flat scatterer index.
        scatterer: usize,
        /// Flat element index (elevation row major).
        element: usize,
    },
    /// The working set exceeds the memory limit or could not be allocated.
    InsufficientMemory {
        /// Bytes needed by the run or by the failed allocation.
        requested: usize,
        /// Configured limit in bytes, `None` when the allocator refused.
        limit: Option<usize>,
    },
    /// The run was cancelled between frequency bins.
    Cancelled {
        /// Bins finished before the cancellation was observed.
        completed_bins: usize,
        /// Total number of bins in the run.
        total_bins: usize,
    },
    /// Unsupported data type in file.
    UnsupportedDtype(String),
    /// Unsupported file format (unrecognized extension).
    UnsupportedFileFormat(String),
    /// Expected MAT variable not found in file.
    MatVariableNotFound {
        /// The variable name that was requested.
        expected: String,
        /// The variable names that are available.
        available: Vec<String>,
    },
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl SimError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::InvalidParameter { .. }
            | SimError::LengthMismatch { .. }
            | SimError::ShapeMismatch { .. }
            | SimError::EmptyPulse
            | SimError::EmptyGrid
            | SimError::SpectrumLengthMismatch { .. } => ErrorKind::Configuration,
            SimError::ElevationBeyondFocus { .. } | SimError::CoincidentScatterer { .. } => {
                ErrorKind::Domain
            }
            SimError::InsufficientMemory { .. } => ErrorKind::Resource,
            SimError::Cancelled { .. } => ErrorKind::Cancelled,
            SimError::UnsupportedDtype(_)
            | SimError::UnsupportedFileFormat(_)
            | SimError::MatVariableNotFound { .. }
            | SimError::IoError(_)
            | SimError::Other(_) => ErrorKind::Io,
        }
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::InvalidParameter {
                name,
                value,
                reason,
            } => {
                write!(f, "invalid parameter {}: {} ({})", name, value, reason)
            }
            SimError::LengthMismatch {
                name,
                expected,
                got,
            } => {
                write!(
                    f,
                    "length mismatch: {} has {} entries, expected {} (one per element)",
                    name, got, expected
                )
            }
            SimError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            SimError::EmptyPulse => write!(f, "transmitted pulse has no samples"),
            SimError::EmptyGrid => write!(f, "scatterer grid has no points"),
            SimError::SpectrumLengthMismatch {
                name,
                expected,
                got,
            } => {
                write!(
                    f,
                    "{} spectrum covers {} bins but the frequency grid has {} \
                     (pulse sample rate too low for the simulation sample rate)",
                    name, got, expected
                )
            }
            SimError::ElevationBeyondFocus { offset, focus } => {
                write!(
                    f,
                    "elevation offset {} exceeds elevation focus {} (need focus >= offset)",
                    offset, focus
                )
            }
            SimError::CoincidentScatterer { scatterer, element } => {
                write!(
                    f,
                    "scatterer {} coincides with element {} (zero propagation distance)",
                    scatterer, element
                )
            }
            SimError::InsufficientMemory {
                requested,
                limit: Some(limit),
            } => {
                write!(
                    f,
                    "insufficient memory: run needs about {} bytes, limit is {}",
                    requested, limit
                )
            }
            SimError::InsufficientMemory {
                requested,
                limit: None,
            } => {
                write!(f, "insufficient memory: failed to allocate {} bytes", requested)
            }
            SimError::Cancelled {
                completed_bins,
                total_bins,
            } => {
                write!(
                    f,
                    "simulation cancelled after {} of {} frequency bins",
                    completed_bins, total_bins
                )
            }
            SimError::UnsupportedDtype(dtype) => {
                write!(f, "unsupported dtype: {}", dtype)
            }
            SimError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            SimError::MatVariableNotFound {
                expected,
                available,
            } => {
                write!(
                    f,
                    "MAT variable '{}' not found; available variables: {:?}",
                    expected, available
                )
            }
            SimError::IoError(e) => write!(f, "I/O error: {}", e),
            SimError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SimError {
    fn from(e: std::io::Error) -> Self {
        SimError::IoError(e)
    }
}

/// Convenience type alias for Results with SimError.
pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_parameter() {
        let e = SimError::InvalidParameter {
            name: "speed_of_sound",
            value: -1.0,
            reason: "must be positive and finite",
        };
        assert_eq!(
            e.to_string(),
            "invalid parameter speed_of_sound: -1 (must be positive and finite)"
        );
    }

    #[test]
    fn display_length_mismatch() {
        let e = SimError::LengthMismatch {
            name: "delays",
            expected: 64,
            got: 32,
        };
        assert_eq!(
            e.to_string(),
            "length mismatch: delays has 32 entries, expected 64 (one per element)"
        );
    }

    #[test]
    fn display_elevation_beyond_focus() {
        let e = SimError::ElevationBeyondFocus {
            offset: 0.5,
            focus: 0.25,
        };
        assert_eq!(
            e.to_string(),
            "elevation offset 0.5 exceeds elevation focus 0.25 (need focus >= offset)"
        );
    }

    #[test]
    fn display_cancelled() {
        let e = SimError::Cancelled {
            completed_bins: 3,
            total_bins: 10,
        };
        assert_eq!(
            e.to_string(),
            "simulation cancelled after 3 of 10 frequency bins"
        );
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(SimError::EmptyPulse.kind(), ErrorKind::Configuration);
        assert_eq!(
            SimError::CoincidentScatterer {
                scatterer: 0,
                element: 0
            }
            .kind(),
            ErrorKind::Domain
        );
        assert_eq!(
            SimError::InsufficientMemory {
                requested: 10,
                limit: Some(1)
            }
            .kind(),
            ErrorKind::Resource
        );
        assert_eq!(
            SimError::Cancelled {
                completed_bins: 0,
                total_bins: 1
            }
            .kind(),
            ErrorKind::Cancelled
        );
    }

    #[test]
    fn display_insufficient_memory() {
        let e = SimError::InsufficientMemory {
            requested: 2048,
            limit: Some(1024),
        };
        assert_eq!(
            e.to_string(),
            "insufficient memory: run needs about 2048 bytes, limit is 1024"
        );
        let e = SimError::InsufficientMemory {
            requested: 64,
            limit: None,
        };
        assert_eq!(e.to_string(), "insufficient memory: failed to allocate 64 bytes");
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let e: SimError = io_err.into();
        assert!(matches!(e, SimError::IoError(_)));
        assert_eq!(e.kind(), ErrorKind::Io);
    }

    #[test]
    fn display_mat_variable_not_found() {
        let e = SimError::MatVariableNotFound {
            expected: "pulse".to_string(),
            available: vec!["rf".to_string()],
        };
        assert!(e.to_string().contains("pulse"));
        assert!(e.to_string().contains("rf"));
    }
}
