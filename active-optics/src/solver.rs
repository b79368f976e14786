//! State solution from wavefront coefficients via the sensitivity matrix.
//!
//! A [`SensitivitySolver`] inverts the calibrated linear map `y = y0 + A x`
//! from state offsets to wavefront coefficients. The pseudo-inverse is
//! precomputed at construction with small singular values truncated, so
//! rank-deficient directions (hexapod/bending degeneracies are physical)
//! resolve to the minimum-norm correction instead of blowing up. No
//! clipping or range limiting is applied to the solution.

use crate::calibration::SensitivityData;
use crate::state::{BendingState, BENDING_DOF};
use log::debug;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use thiserror::Error;

/// Relative singular value cutoff used when no override is given.
pub const DEFAULT_RCOND: f64 = 1e-4;

/// Errors raised by state solvers.
#[derive(Debug, Error)]
pub enum SolverError {
    /// Input or calibration dimensions are inconsistent.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// The requested solver configuration is not supported.
    #[error("unimplemented solver capability: {0}")]
    UnimplementedCapability(String),
    /// The SVD factorization broke down.
    #[error("numerical solve failure: {0}")]
    NumericalSolveFailure(String),
}

/// Abstract contract: recover the state offset explaining a measured
/// wavefront coefficient vector (dummy-slot layout).
pub trait Solver {
    fn solve(&self, wavefront: &DVector<f64>) -> Result<BendingState, SolverError>;
}

/// Pseudo-inverse solver over precomputed sensitivity data.
#[derive(Debug)]
pub struct SensitivitySolver {
    data: Arc<SensitivityData>,
    pinv: DMatrix<f64>,
    rcond: f64,
}

impl SensitivitySolver {
    /// Build a solver for the given field point with the default cutoff.
    /// Only the on-axis field is calibrated.
    pub fn new(data: Arc<SensitivityData>, field: (f64, f64)) -> Result<Self, SolverError> {
        Self::with_cutoff(data, field, DEFAULT_RCOND)
    }

    /// Build a solver with an explicit relative singular value cutoff.
    pub fn with_cutoff(
        data: Arc<SensitivityData>,
        field: (f64, f64),
        rcond: f64,
    ) -> Result<Self, SolverError> {
        if field != (0.0, 0.0) {
            return Err(SolverError::UnimplementedCapability(format!(
                "off-axis field point ({:?}, {:?})",
                field.0, field.1
            )));
        }
        if data.n_dof() != BENDING_DOF {
            return Err(SolverError::DimensionMismatch {
                expected: BENDING_DOF,
                got: data.n_dof(),
            });
        }
        let pinv = truncated_pinv(data.matrix(), rcond)?;
        debug!(
            "sensitivity pseudo-inverse ready: {} coeffs x {} dof, rcond {:e}",
            data.n_coeffs(),
            data.n_dof(),
            rcond
        );
        Ok(Self { data, pinv, rcond })
    }

    pub fn data(&self) -> &Arc<SensitivityData> {
        &self.data
    }

    pub fn rcond(&self) -> f64 {
        self.rcond
    }
}

impl Solver for SensitivitySolver {
    /// Solve `pinv(A) (y - y0)` after stripping the dummy piston slot from
    /// `y`, which must be one entry longer than the calibration vectors.
    fn solve(&self, wavefront: &DVector<f64>) -> Result<BendingState, SolverError> {
        let expected = self.data.n_coeffs() + 1;
        if wavefront.len() != expected {
            return Err(SolverError::DimensionMismatch {
                expected,
                got: wavefront.len(),
            });
        }
        let measured = wavefront.rows(1, self.data.n_coeffs()).clone_owned();
        let offset = measured - self.data.nominal();
        let solution = &self.pinv * offset;
        Ok(BendingState::from_vector(&solution).expect("pinv rows validated at construction"))
    }
}

/// Moore-Penrose pseudo-inverse with singular values below
/// `rcond * sigma_max` discarded.
fn truncated_pinv(matrix: &DMatrix<f64>, rcond: f64) -> Result<DMatrix<f64>, SolverError> {
    let svd = matrix.clone().svd(true, true);
    let sigma_max = svd.singular_values.iter().cloned().fold(0.0f64, f64::max);
    svd.pseudo_inverse(rcond * sigma_max)
        .map_err(|e| SolverError::NumericalSolveFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const N_COEFFS: usize = 22;

    fn random_sensitivity(seed: u64) -> Arc<SensitivityData> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        // Diagonally dominant so the conditioning stays mild for any seed
        // and the default cutoff never truncates.
        let mut matrix =
            DMatrix::from_fn(N_COEFFS, BENDING_DOF, |_, _| rng.gen_range(-0.01..0.01));
        for i in 0..BENDING_DOF {
            matrix[(i, i)] += rng.gen_range(1.0..2.0);
        }
        let nominal = DVector::from_fn(N_COEFFS, |_, _| rng.gen_range(-0.1..0.1));
        Arc::new(SensitivityData::new(matrix, nominal).unwrap())
    }

    #[test]
    fn test_off_axis_rejected() {
        let data = random_sensitivity(1);
        assert!(matches!(
            SensitivitySolver::new(data, (0.01, 0.0)),
            Err(SolverError::UnimplementedCapability(_))
        ));
    }

    #[test]
    fn test_dof_count_checked() {
        let matrix = DMatrix::zeros(N_COEFFS, BENDING_DOF - 1);
        let data = Arc::new(SensitivityData::new(matrix, DVector::zeros(N_COEFFS)).unwrap());
        assert!(matches!(
            SensitivitySolver::new(data, (0.0, 0.0)),
            Err(SolverError::DimensionMismatch {
                expected: BENDING_DOF,
                got: 19
            })
        ));
    }

    #[test]
    fn test_input_length_checked() {
        let solver = SensitivitySolver::new(random_sensitivity(2), (0.0, 0.0)).unwrap();
        // Missing the dummy slot.
        let bare = DVector::zeros(N_COEFFS);
        assert!(matches!(
            solver.solve(&bare),
            Err(SolverError::DimensionMismatch {
                expected: 23,
                got: 22
            })
        ));
    }

    #[test]
    fn test_recovers_injected_state() {
        let data = random_sensitivity(3);
        let solver = SensitivitySolver::new(data.clone(), (0.0, 0.0)).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let injected = DVector::from_fn(BENDING_DOF, |_, _| rng.gen_range(-1.0..1.0));
        let measured = data.nominal() + data.matrix() * &injected;

        // Rebuild the loop-facing layout: dummy slot in front.
        let mut with_slot = DVector::zeros(N_COEFFS + 1);
        with_slot.rows_mut(1, N_COEFFS).copy_from(&measured);

        let solved = solver.solve(&with_slot).unwrap();
        for (got, want) in solved.as_slice().iter().zip(injected.iter()) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_nominal_wavefront_solves_to_zero() {
        let data = random_sensitivity(4);
        let solver = SensitivitySolver::new(data.clone(), (0.0, 0.0)).unwrap();
        let mut with_slot = DVector::zeros(N_COEFFS + 1);
        // Any dummy-slot value is ignored.
        with_slot[0] = 123.0;
        with_slot.rows_mut(1, N_COEFFS).copy_from(data.nominal());
        let solved = solver.solve(&with_slot).unwrap();
        assert!(solved.as_slice().iter().all(|v| v.abs() < 1e-10));
    }

    #[test]
    fn test_truncation_cutoff_honored() {
        // Sensitivity with one weak direction: column 19 responds at 1e-6
        // while the rest respond at order one.
        let mut matrix = DMatrix::zeros(N_COEFFS, BENDING_DOF);
        for i in 0..BENDING_DOF {
            matrix[(i, i)] = if i == 19 { 1.0e-6 } else { 1.0 };
        }
        let data = Arc::new(SensitivityData::new(matrix.clone(), DVector::zeros(N_COEFFS)).unwrap());

        let mut injected = DVector::zeros(BENDING_DOF);
        injected[19] = 2.0;
        let measured = &matrix * &injected;
        let mut with_slot = DVector::zeros(N_COEFFS + 1);
        with_slot.rows_mut(1, N_COEFFS).copy_from(&measured);

        // Default cutoff removes the weak direction entirely.
        let truncating = SensitivitySolver::new(data.clone(), (0.0, 0.0)).unwrap();
        let solved = truncating.solve(&with_slot).unwrap();
        assert_abs_diff_eq!(solved.as_slice()[19], 0.0, epsilon = 1e-12);

        // A tighter cutoff keeps it.
        let keeping = SensitivitySolver::with_cutoff(data, (0.0, 0.0), 1e-8).unwrap();
        let solved = keeping.solve(&with_slot).unwrap();
        assert_abs_diff_eq!(solved.as_slice()[19], 2.0, epsilon = 1e-9);
    }
}
