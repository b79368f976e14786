//! Calibration data products shared across the loop.
//!
//! Two kinds of calibration artifacts exist: per-mirror bending-mode bases
//! ([`MirrorModes`]) and the wavefront sensitivity of the full train
//! ([`SensitivityData`]). Both are immutable once built and are shared
//! between consumers behind `Arc`.
//!
//! On disk, calibration arrays are flat little-endian f64 files with shapes
//! supplied by the caller; the calibration pipeline writes this format and
//! the readers here validate lengths hard. Baseline synthetic bases for the
//! two deformable mirrors live in [`models`].

use crate::prescription::{
    M1_OUTER_RADIUS, M2_INNER_RADIUS, M2_OUTER_RADIUS, M3_INNER_RADIUS,
};
use crate::surface::Annulus;
use crate::zernike;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or assembling calibration data.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration io: {0}")]
    Io(#[from] io::Error),
    #[error("calibration array length mismatch: expected {expected} values, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Read a flat little-endian f64 array, validating the value count.
pub fn read_f64_array(path: &Path, expected_len: usize) -> Result<Vec<f64>, CalibrationError> {
    let bytes = fs::read(path)?;
    if bytes.len() != expected_len * 8 {
        return Err(CalibrationError::DimensionMismatch {
            expected: expected_len,
            got: bytes.len() / 8,
        });
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect())
}

/// Write a flat little-endian f64 array.
pub fn write_f64_array(path: &Path, values: &[f64]) -> Result<(), CalibrationError> {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Bending-mode basis of one deformable mirror.
///
/// Holds the substrate grid coordinates and an `(n_modes, ny, nx)` tensor
/// of mode shapes, each normalized to unit RMS of surface height over the
/// substrate annulus. Grids are row-major with rows indexing y.
#[derive(Debug)]
pub struct MirrorModes {
    x: Array1<f64>,
    y: Array1<f64>,
    modes: Array3<f64>,
    aperture: Annulus,
}

impl MirrorModes {
    pub fn new(x: Array1<f64>, y: Array1<f64>, modes: Array3<f64>, aperture: Annulus) -> Self {
        assert_eq!(modes.shape()[1], y.len());
        assert_eq!(modes.shape()[2], x.len());
        Self {
            x,
            y,
            modes,
            aperture,
        }
    }

    pub fn n_modes(&self) -> usize {
        self.modes.shape()[0]
    }

    pub fn x(&self) -> &Array1<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn aperture(&self) -> Annulus {
        self.aperture
    }

    /// Shape of mode k over the substrate grid.
    pub fn mode(&self, k: usize) -> ArrayView2<'_, f64> {
        self.modes.index_axis(Axis(0), k)
    }

    /// Load a basis from a raw mode tensor of `n_modes * grid * grid`
    /// values. The grid spans the substrate square [-outer, outer] on both
    /// axes; mode values are taken as already normalized by the producer.
    pub fn from_raw_file(
        path: &Path,
        grid: usize,
        n_modes: usize,
        aperture: Annulus,
    ) -> Result<Self, CalibrationError> {
        let values = read_f64_array(path, n_modes * grid * grid)?;
        let modes = Array3::from_shape_vec((n_modes, grid, grid), values)
            .expect("length validated by read_f64_array");
        let (x, y) = substrate_grid(aperture.outer, grid);
        Ok(Self::new(x, y, modes, aperture))
    }

    /// Synthetic baseline basis: mode k is the Noll-(first_noll + k)
    /// Zernike shape over the substrate annulus, normalized to unit RMS.
    /// Stands in for a finite-element basis when no measured one is loaded.
    pub fn synthetic(aperture: Annulus, grid: usize, n_modes: usize, first_noll: usize) -> Self {
        let (x, y) = substrate_grid(aperture.outer, grid);
        let mut modes = Array3::zeros((n_modes, grid, grid));
        for k in 0..n_modes {
            let j = first_noll + k;
            let mut sum_sq = 0.0;
            let mut count = 0usize;
            for (iy, &yv) in y.iter().enumerate() {
                for (ix, &xv) in x.iter().enumerate() {
                    if aperture.contains(xv, yv) {
                        let z = zernike::zernike(j, xv / aperture.outer, yv / aperture.outer);
                        modes[(k, iy, ix)] = z;
                        sum_sq += z * z;
                        count += 1;
                    }
                }
            }
            let rms = (sum_sq / count as f64).sqrt();
            if rms > 0.0 {
                for v in modes.index_axis_mut(Axis(0), k) {
                    *v /= rms;
                }
            }
        }
        Self::new(x, y, modes, aperture)
    }
}

fn substrate_grid(outer: f64, grid: usize) -> (Array1<f64>, Array1<f64>) {
    let coords = Array1::linspace(-outer, outer, grid);
    (coords.clone(), coords)
}

/// Wavefront sensitivity of the optical train at the calibration field
/// point: the matrix A mapping state offsets to wavefront coefficients
/// (Noll j = 1..=n_coeffs, no dummy slot) and the nominal wavefront y0 in
/// the same layout.
#[derive(Debug)]
pub struct SensitivityData {
    matrix: DMatrix<f64>,
    nominal: DVector<f64>,
}

impl SensitivityData {
    pub fn new(matrix: DMatrix<f64>, nominal: DVector<f64>) -> Result<Self, CalibrationError> {
        if matrix.nrows() != nominal.len() {
            return Err(CalibrationError::DimensionMismatch {
                expected: matrix.nrows(),
                got: nominal.len(),
            });
        }
        Ok(Self { matrix, nominal })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn nominal(&self) -> &DVector<f64> {
        &self.nominal
    }

    /// Number of wavefront coefficients per column (matrix rows).
    pub fn n_coeffs(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of state degrees of freedom (matrix columns).
    pub fn n_dof(&self) -> usize {
        self.matrix.ncols()
    }

    /// Load the matrix (row-major) and nominal vector from raw files.
    pub fn from_raw_files(
        matrix_path: &Path,
        nominal_path: &Path,
        n_coeffs: usize,
        n_dof: usize,
    ) -> Result<Self, CalibrationError> {
        let matrix_values = read_f64_array(matrix_path, n_coeffs * n_dof)?;
        let nominal_values = read_f64_array(nominal_path, n_coeffs)?;
        Self::new(
            DMatrix::from_row_slice(n_coeffs, n_dof, &matrix_values),
            DVector::from_vec(nominal_values),
        )
    }

    /// Write the matrix (row-major) and nominal vector as raw files.
    pub fn save_raw(&self, matrix_path: &Path, nominal_path: &Path) -> Result<(), CalibrationError> {
        let mut row_major = Vec::with_capacity(self.matrix.nrows() * self.matrix.ncols());
        for row in 0..self.matrix.nrows() {
            for col in 0..self.matrix.ncols() {
                row_major.push(self.matrix[(row, col)]);
            }
        }
        write_f64_array(matrix_path, &row_major)?;
        write_f64_array(nominal_path, self.nominal.as_slice())
    }
}

/// Baseline calibration models.
pub mod models {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Arc;

    /// Grid sampling of the M1M3 substrate maps.
    pub const M1M3_GRID: usize = 96;
    /// Grid sampling of the M2 substrate maps.
    pub const M2_GRID: usize = 64;
    /// Modes carried by the baseline bases. Shapes start at the
    /// astigmatism pair since focus belongs to the hexapods.
    pub const BASELINE_MODES: usize = 5;
    const FIRST_NOLL: usize = 5;

    /// Baseline bending basis for the M1M3 monolith. One substrate covers
    /// both optical zones, so the annulus runs from the M3 hole to the M1
    /// outer edge.
    pub static M1M3_MODES: Lazy<Arc<MirrorModes>> = Lazy::new(|| {
        Arc::new(MirrorModes::synthetic(
            Annulus::new(M1_OUTER_RADIUS, M3_INNER_RADIUS),
            M1M3_GRID,
            BASELINE_MODES,
            FIRST_NOLL,
        ))
    });

    /// Baseline bending basis for the M2 secondary.
    pub static M2_MODES: Lazy<Arc<MirrorModes>> = Lazy::new(|| {
        Arc::new(MirrorModes::synthetic(
            Annulus::new(M2_OUTER_RADIUS, M2_INNER_RADIUS),
            M2_GRID,
            BASELINE_MODES,
            FIRST_NOLL,
        ))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_raw_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("array.f64");
        let values = [1.5, -2.25, 0.0, 3.0e-7];
        write_f64_array(&path, &values).unwrap();
        let back = read_f64_array(&path, values.len()).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn test_raw_length_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.f64");
        write_f64_array(&path, &[1.0, 2.0]).unwrap();
        assert!(matches!(
            read_f64_array(&path, 3),
            Err(CalibrationError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn test_synthetic_modes_unit_rms() {
        let aperture = Annulus::new(1.71, 0.9);
        let basis = MirrorModes::synthetic(aperture, 64, 5, 5);
        assert_eq!(basis.n_modes(), 5);
        for k in 0..5 {
            let mode = basis.mode(k);
            let mut sum_sq = 0.0;
            let mut count = 0usize;
            for (iy, &yv) in basis.y().iter().enumerate() {
                for (ix, &xv) in basis.x().iter().enumerate() {
                    if aperture.contains(xv, yv) {
                        sum_sq += mode[(iy, ix)] * mode[(iy, ix)];
                        count += 1;
                    } else {
                        assert_eq!(mode[(iy, ix)], 0.0);
                    }
                }
            }
            assert_relative_eq!((sum_sq / count as f64).sqrt(), 1.0, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_sensitivity_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let matrix_path = dir.path().join("sensitivity.f64");
        let nominal_path = dir.path().join("nominal.f64");
        let matrix = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let nominal = DVector::from_vec(vec![0.5, -0.5]);
        let data = SensitivityData::new(matrix.clone(), nominal.clone()).unwrap();
        data.save_raw(&matrix_path, &nominal_path).unwrap();
        let back = SensitivityData::from_raw_files(&matrix_path, &nominal_path, 2, 3).unwrap();
        assert_relative_eq!(back.matrix(), &matrix, max_relative = 1e-15);
        assert_relative_eq!(back.nominal(), &nominal, max_relative = 1e-15);
        assert_eq!(back.n_coeffs(), 2);
        assert_eq!(back.n_dof(), 3);
    }

    #[test]
    fn test_sensitivity_shape_checked() {
        let matrix = DMatrix::zeros(4, 2);
        let nominal = DVector::zeros(3);
        assert!(matches!(
            SensitivityData::new(matrix, nominal),
            Err(CalibrationError::DimensionMismatch { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn test_baseline_models() {
        assert_eq!(models::M1M3_MODES.n_modes(), models::BASELINE_MODES);
        assert_eq!(models::M2_MODES.n_modes(), models::BASELINE_MODES);
        assert_abs_diff_eq!(models::M1M3_MODES.aperture().outer, 4.18);
        assert_abs_diff_eq!(models::M2_MODES.aperture().inner, 0.9);
    }
}
