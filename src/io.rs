// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::io::Write;
use std::path::Path;

use ndarray::{Array2, ArrayD, ArrayViewD, Ix2, IxDyn, ShapeBuilder};

use crate::error::{Result, SimError};

/// Supported file formats for array I/O.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy .npy format.
    Npy,
    /// MATLAB .mat format (Level 5).
    Mat,
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("mat") => Ok(FileFormat::Mat),
        Some(ext) => Err(SimError::UnsupportedFileFormat(ext.to_string())),
        None => Err(SimError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

/// Read an array from a .npy file, promoting `f32` data to `f64`.
pub fn load_npy(path: &Path) -> Result<ArrayD<f64>> {
    match ndarray_npy::read_npy::<_, ArrayD<f64>>(path) {
        Ok(a) => Ok(a),
        Err(_) => {
            let arr32: ArrayD<f32> = ndarray_npy::read_npy(path)
                .map_err(|e| SimError::UnsupportedDtype(format!("{}", e)))?;
            Ok(arr32.mapv(|v| v as f64))
        }
    }
}

/// Write an array to a .npy file.
pub fn save_npy(array: ArrayViewD<'_, f64>, path: &Path) -> Result<()> {
    ndarray_npy::write_npy(path, &array)
        .map_err(|e| SimError::Other(format!("npy write error: {}", e)))
}

/// Read a numeric variable from a .mat file into row-major layout.
pub fn load_mat(path: &Path, variable_name: &str) -> Result<ArrayD<f64>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mat = matfile::MatFile::parse(&mut reader)
        .map_err(|e| SimError::Other(format!("MAT parse error: {}", e)))?;

    let array = mat.find_by_name(variable_name).ok_or_else(|| {
        SimError::MatVariableNotFound {
            expected: variable_name.to_string(),
            available: mat.arrays().iter().map(|a| a.name().to_string()).collect(),
        }
    })?;

    let data: Vec<f64> = match array.data() {
        matfile::NumericData::Double { real, .. } => real.clone(),
        matfile::NumericData::Single { real, .. } => real.iter().map(|&v| v as f64).collect(),
        _ => {
            return Err(SimError::UnsupportedDtype(
                "MAT file array is not f64 or f32".to_string(),
            ))
        }
    };

    // MAT data is column major
    let shape = array.size().to_vec();
    let len = data.len();
    let arr = ArrayD::from_shape_vec(IxDyn(&shape).f(), data).map_err(|_| {
        SimError::ShapeMismatch {
            expected: shape.clone(),
            got: vec![len],
        }
    })?;
    Ok(arr.as_standard_layout().to_owned())
}

/// Write an array to a .mat file (Level 5, uncompressed, one real double variable).
///
/// `matfile` only reads, so the writer is a minimal Level 5 encoder: a
/// 128-byte header followed by one `miMATRIX` element holding the array
/// flags, dimensions, name and column-major data sub-elements.
pub fn save_mat(array: ArrayViewD<'_, f64>, path: &Path, var_name: &str) -> Result<()> {
    let dims: Vec<usize> = if array.ndim() < 2 {
        // MATLAB arrays have at least two dimensions
        vec![1, array.len()]
    } else {
        array.shape().to_vec()
    };
    let column_major: Vec<f64> = array.t().iter().copied().collect();
    write_mat_level5(path, var_name, &dims, &column_major)
}

const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;

fn padded(len: usize) -> usize {
    len.div_ceil(8) * 8
}

fn tag_size(bytes: usize) -> Result<u32> {
    u32::try_from(bytes).map_err(|_| {
        SimError::Other(format!(
            "array of {} bytes is too large for a Level 5 MAT file",
            bytes
        ))
    })
}

fn write_element<W: Write>(w: &mut W, data_type: u32, payload: &[u8]) -> Result<()> {
    w.write_all(&data_type.to_le_bytes())?;
    w.write_all(&tag_size(payload.len())?.to_le_bytes())?;
    w.write_all(payload)?;
    let pad = padded(payload.len()) - payload.len();
    if pad > 0 {
        w.write_all(&[0u8; 8][..pad])?;
    }
    Ok(())
}

fn write_mat_level5(path: &Path, var_name: &str, dims: &[usize], data: &[f64]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);

    let mut header = [b' '; 116];
    let desc = b"MATLAB 5.0 MAT-file, created by imaging-sim";
    header[..desc.len()].copy_from_slice(desc);
    w.write_all(&header)?;
    w.write_all(&[0u8; 8])?;
    w.write_all(&0x0100u16.to_le_bytes())?;
    w.write_all(b"IM")?;

    let mut flags = Vec::with_capacity(8);
    flags.extend_from_slice(&MX_DOUBLE_CLASS.to_le_bytes());
    flags.extend_from_slice(&0u32.to_le_bytes());

    let mut dim_bytes = Vec::with_capacity(dims.len() * 4);
    for &d in dims {
        let d = i32::try_from(d)
            .map_err(|_| SimError::Other(format!("dimension {} exceeds MAT limits", d)))?;
        dim_bytes.extend_from_slice(&d.to_le_bytes());
    }

    let name = var_name.as_bytes();
    let real_bytes = data.len() * 8;

    let body = [flags.len(), dim_bytes.len(), name.len(), real_bytes]
        .iter()
        .map(|&n| 8 + padded(n))
        .sum::<usize>();
    w.write_all(&MI_MATRIX.to_le_bytes())?;
    w.write_all(&tag_size(body)?.to_le_bytes())?;

    write_element(&mut w, MI_UINT32, &flags)?;
    write_element(&mut w, MI_INT32, &dim_bytes)?;
    write_element(&mut w, MI_INT8, name)?;

    w.write_all(&MI_DOUBLE.to_le_bytes())?;
    w.write_all(&tag_size(real_bytes)?.to_le_bytes())?;
    for &v in data {
        w.write_all(&v.to_le_bytes())?;
    }

    w.flush()?;
    Ok(())
}

/// Save an array, inferring the format from the extension.
/// `.mat` files hold it as variable `var_name`.
pub fn save_array(array: ArrayViewD<'_, f64>, path: &Path, var_name: &str) -> Result<()> {
    match infer_format(path)? {
        FileFormat::Npy => save_npy(array, path),
        FileFormat::Mat => save_mat(array, path, var_name),
    }
}

/// Load an array, inferring the format from the extension.
pub fn load_array(path: &Path, var_name: &str) -> Result<ArrayD<f64>> {
    match infer_format(path)? {
        FileFormat::Npy => load_npy(path),
        FileFormat::Mat => load_mat(path, var_name),
    }
}

/// Load a 2D coordinate grid.
pub fn load_grid(path: &Path, var_name: &str) -> Result<Array2<f64>> {
    let arr = load_array(path, var_name)?;
    let got = arr.shape().to_vec();
    arr.into_dimensionality::<Ix2>()
        .map_err(|_| SimError::ShapeMismatch {
            expected: vec![0, 0],
            got,
        })
}

/// Load a pulse waveform stored as a vector (any shape with one non-unit axis).
pub fn load_pulse(path: &Path, var_name: &str) -> Result<Vec<f64>> {
    let arr = load_array(path, var_name)?;
    let long_axes = arr.shape().iter().filter(|&&n| n > 1).count();
    if long_axes > 1 {
        return Err(SimError::ShapeMismatch {
            expected: vec![arr.len()],
            got: arr.shape().to_vec(),
        });
    }
    Ok(arr.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array3};

    fn sample_volume() -> Array3<f64> {
        Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as f64)
    }

    #[test]
    fn npy_roundtrip() {
        let rf = sample_volume();
        let tmp = std::env::temp_dir().join("imaging_sim_test_roundtrip.npy");
        save_npy(rf.view().into_dyn(), &tmp).unwrap();
        let loaded = load_npy(&tmp).unwrap();
        assert_eq!(loaded.shape(), &[2, 3, 4]);
        assert_eq!(loaded, rf.into_dyn());
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn npy_promotes_single_precision() {
        let tmp = std::env::temp_dir().join("imaging_sim_test_f32.npy");
        let arr = Array2::from_shape_fn((2, 2), |(i, j)| (i + 2 * j) as f32 * 0.5);
        ndarray_npy::write_npy(&tmp, &arr).unwrap();
        let grid = load_grid(&tmp, "x").unwrap();
        assert_eq!(grid[[1, 1]], 1.5);
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn mat_roundtrip_keeps_layout() {
        let rf = sample_volume();
        let tmp = std::env::temp_dir().join("imaging_sim_test_roundtrip.mat");
        save_mat(rf.view().into_dyn(), &tmp, "rf").unwrap();

        let file = std::fs::File::open(&tmp).unwrap();
        let mut reader = std::io::BufReader::new(file);
        let mat = matfile::MatFile::parse(&mut reader).unwrap();
        let arr = mat.find_by_name("rf").unwrap();
        assert_eq!(arr.size(), &vec![2, 3, 4]);
        match arr.data() {
            // column major: second value steps the first axis
            matfile::NumericData::Double { real, .. } => {
                assert_eq!(real.len(), 24);
                assert_eq!(real[1], 100.0);
            }
            _ => panic!("Expected double data"),
        }

        let loaded = load_mat(&tmp, "rf").unwrap();
        assert_eq!(loaded, rf.into_dyn());
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn mat_missing_variable_lists_available() {
        let tmp = std::env::temp_dir().join("imaging_sim_test_missing.mat");
        let v = Array1::from(vec![1.0, 2.0, 3.0]);
        save_mat(v.view().into_dyn(), &tmp, "pulse").unwrap();
        let result = load_mat(&tmp, "rf");
        match result {
            Err(SimError::MatVariableNotFound { available, .. }) => {
                assert_eq!(available, vec!["pulse".to_string()]);
            }
            other => panic!("unexpected {:?}", other.map(|a| a.shape().to_vec())),
        }
        assert_eq!(load_pulse(&tmp, "pulse").unwrap(), vec![1.0, 2.0, 3.0]);
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn pulse_must_be_a_vector() {
        let tmp = std::env::temp_dir().join("imaging_sim_test_bad_pulse.npy");
        let arr = Array2::<f64>::zeros((3, 3));
        ndarray_npy::write_npy(&tmp, &arr).unwrap();
        assert!(matches!(
            load_pulse(&tmp, "pulse"),
            Err(SimError::ShapeMismatch { .. })
        ));
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn grid_must_be_two_dimensional() {
        let tmp = std::env::temp_dir().join("imaging_sim_test_bad_grid.npy");
        save_npy(sample_volume().view().into_dyn(), &tmp).unwrap();
        assert!(matches!(
            load_grid(&tmp, "x"),
            Err(SimError::ShapeMismatch { .. })
        ));
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn unsupported_format() {
        assert!(matches!(
            infer_format(Path::new("test.xyz")),
            Err(SimError::UnsupportedFileFormat(_))
        ));
        assert!(matches!(
            infer_format(Path::new("noext")),
            Err(SimError::UnsupportedFileFormat(_))
        ));
        assert_eq!(infer_format(Path::new("a.mat")).unwrap(), FileFormat::Mat);
    }
}
