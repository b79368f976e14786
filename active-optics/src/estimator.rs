//! Wavefront coefficient estimation from sampled OPD maps.
//!
//! The estimator fits Noll-indexed Zernike polynomials to the valid samples
//! of an [`OpdMap`] by unweighted least squares and can render coefficient
//! vectors back onto a fresh grid. Fits are minimum-norm via SVD; no
//! clipping or regularization beyond the singular value epsilon.
//!
//! Two coefficient layouts meet here, and the distinction matters at every
//! call site:
//!
//! - [`WavefrontEstimator::estimate`] returns coefficients **without** the
//!   dummy slot: element 0 of the result is the Noll j = 1 (piston) term.
//! - [`WavefrontEstimator::evaluate`] consumes the dummy-slot layout where
//!   index j is the Noll-j coefficient and slot 0 is ignored.
//!
//! The loop reinserts a zero in front of an estimate before handing it to
//! the solver, which strips it again; keeping the slot explicit avoids
//! off-by-one ambiguity at the module boundaries.
//!
//! # Examples
//!
//! ```rust
//! use active_optics::estimator::WavefrontEstimator;
//!
//! let estimator = WavefrontEstimator::default();
//! // 50 nm of defocus in the dummy-slot layout.
//! let coeffs = [0.0, 0.0, 0.0, 0.0, 50.0e-9];
//! let opd = estimator.evaluate(&coeffs, 101);
//! let fit = estimator.estimate(&opd, 4).unwrap();
//! assert!((fit[3] - 50.0e-9).abs() < 1e-12);
//! ```

use crate::wavefront::OpdMap;
use crate::zernike;
use log::warn;
use nalgebra::DVector;
use ndarray::Array2;
use thiserror::Error;

/// Fractional central obscuration of the survey pupil, set by the M1 inner
/// and outer radii.
pub const DEFAULT_OBSCURATION: f64 = 0.61;

/// Wavefront coefficients carried through the standard loop (Noll j up to
/// 22, through sixth-order spherical).
pub const DEFAULT_N_COEFFS: usize = 22;

/// Singular values at or below this threshold are treated as zero in the
/// least-squares solve.
const SVD_EPSILON: f64 = 1e-10;

/// Errors raised by wavefront estimation.
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// Every sample of the OPD map was masked.
    #[error("no valid samples inside the aperture")]
    EmptyAperture,
    /// The SVD least-squares solve broke down.
    #[error("least-squares solve failed: {0}")]
    NumericalSolveFailure(String),
}

/// Least-squares Zernike wavefront estimator over an annular pupil.
#[derive(Debug, Clone)]
pub struct WavefrontEstimator {
    obscuration: f64,
}

impl Default for WavefrontEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_OBSCURATION)
    }
}

impl WavefrontEstimator {
    pub fn new(obscuration: f64) -> Self {
        assert!(
            (0.0..1.0).contains(&obscuration),
            "obscuration is a fraction of the pupil radius"
        );
        Self { obscuration }
    }

    pub fn obscuration(&self) -> f64 {
        self.obscuration
    }

    /// Fit Noll terms j = 1..=n_coeffs to the valid samples of an OPD map.
    ///
    /// The result has no dummy slot: element 0 is the Noll j = 1 (piston)
    /// coefficient. The fit is minimum-norm when the system is
    /// underdetermined.
    pub fn estimate(&self, opd: &OpdMap, n_coeffs: usize) -> Result<DVector<f64>, EstimatorError> {
        let mut points = Vec::new();
        let mut values = Vec::new();
        for (x, y, v) in opd.samples() {
            points.push((x, y));
            values.push(v);
        }
        if points.is_empty() {
            return Err(EstimatorError::EmptyAperture);
        }
        if points.len() < n_coeffs {
            warn!(
                "fitting {} Zernike terms to {} samples, solution is minimum-norm",
                n_coeffs,
                points.len()
            );
        }
        let design = zernike::design_matrix(n_coeffs, &points);
        let rhs = DVector::from_vec(values);
        let svd = design.svd(true, true);
        svd.solve(&rhs, SVD_EPSILON)
            .map_err(|e| EstimatorError::NumericalSolveFailure(e.to_string()))
    }

    /// Render a dummy-slot coefficient vector onto a fresh square grid.
    ///
    /// Index j of `coeffs` is the Noll-j coefficient in meters; slot 0 is
    /// ignored. Samples outside the annular aperture are NaN.
    pub fn evaluate(&self, coeffs: &[f64], grid_size: usize) -> OpdMap {
        assert!(grid_size >= 2);
        let obscuration = self.obscuration;
        let data = Array2::from_shape_fn((grid_size, grid_size), |(iy, ix)| {
            let x = -1.0 + 2.0 * ix as f64 / (grid_size - 1) as f64;
            let y = -1.0 + 2.0 * iy as f64 / (grid_size - 1) as f64;
            let rho = (x * x + y * y).sqrt();
            if !(obscuration..=1.0).contains(&rho) {
                return f64::NAN;
            }
            coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(j, c)| c * zernike::zernike(j, x, y))
                .sum()
        });
        OpdMap::new(data)
    }
}
