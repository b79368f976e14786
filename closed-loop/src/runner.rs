//! Sequential closed-loop runner.
//!
//! One [`ClosedLoop`] owns one telescope and drives the full iteration:
//! simulate the current prescription, fit wavefront coefficients, solve for
//! the state offset, take a gain-damped controller step toward zero, and
//! apply the resulting delta back to the telescope. Each iteration depends
//! on the previous one's applied correction, so a loop instance is strictly
//! sequential; independent instances (different trials, different field
//! points) share nothing mutable and can run side by side.
//!
//! A failed step propagates immediately and leaves the telescope as it was
//! before the step; the caller decides whether to retry with a different
//! gain or cutoff.

use active_optics::control::{ControlError, Controller, GainController};
use active_optics::estimator::{EstimatorError, WavefrontEstimator};
use active_optics::metric::{Metric, SumOfSquares};
use active_optics::mirror::MirrorError;
use active_optics::solver::{SensitivitySolver, Solver, SolverError};
use active_optics::state::{BendingState, StateError};
use active_optics::telescope::BendingTelescope;
use active_optics::wavefront::{OpticalSimulator, SimulationError};
use log::info;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by a loop iteration, each naming the failed stage.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Estimator(#[from] EstimatorError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

/// Record of one loop iteration, serializable for study output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationReport {
    pub iteration: usize,
    /// RMS of the measured OPD over the pupil, meters.
    pub wavefront_rms: f64,
    /// Sum of squared entries of the solved state, before correction.
    pub metric: f64,
    /// RMS of the solved state entries.
    pub state_rms: f64,
    /// Euclidean norm of the applied correction.
    pub delta_norm: f64,
}

/// Measure-solve-correct loop around one telescope.
#[derive(Debug)]
pub struct ClosedLoop<S> {
    telescope: BendingTelescope,
    simulator: S,
    estimator: WavefrontEstimator,
    solver: SensitivitySolver,
    controller: GainController<SumOfSquares>,
    iteration: usize,
}

impl<S: OpticalSimulator> ClosedLoop<S> {
    pub fn new(
        telescope: BendingTelescope,
        simulator: S,
        solver: SensitivitySolver,
        gain: f64,
    ) -> Self {
        Self {
            telescope,
            simulator,
            estimator: WavefrontEstimator::default(),
            solver,
            controller: GainController::new(SumOfSquares).with_gain(gain),
            iteration: 0,
        }
    }

    pub fn telescope(&self) -> &BendingTelescope {
        &self.telescope
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    fn measure(&self) -> Result<(f64, BendingState), LoopError> {
        let opd = self
            .simulator
            .simulate(self.telescope.prescription(), 0.0, 0.0)?;
        let wavefront_rms = opd.rms().unwrap_or(0.0);
        let n_coeffs = self.solver.data().n_coeffs();
        let fit = self.estimator.estimate(&opd, n_coeffs)?;
        let mut measured = DVector::zeros(n_coeffs + 1);
        measured.rows_mut(1, n_coeffs).copy_from(&fit);
        let state = self.solver.solve(&measured)?;
        Ok((wavefront_rms, state))
    }

    /// Solve the current state without applying anything.
    pub fn estimate_state(&self) -> Result<BendingState, LoopError> {
        Ok(self.measure()?.1)
    }

    /// Run one measure-solve-correct iteration.
    pub fn step(&mut self) -> Result<IterationReport, LoopError> {
        let (wavefront_rms, estimated) = self.measure()?;
        let metric = SumOfSquares.evaluate(estimated.as_slice());
        let (_, delta) = self.controller.next_state(&estimated.to_vector())?;
        let delta_state = BendingState::from_vector(&delta)?;
        self.telescope.update(&delta_state)?;
        self.iteration += 1;
        let report = IterationReport {
            iteration: self.iteration,
            wavefront_rms,
            metric,
            state_rms: estimated.rms(),
            delta_norm: delta.norm(),
        };
        info!(
            "iteration {}: wavefront rms {:.3e} m, metric {:.3e}, |delta| {:.3e}",
            report.iteration, report.wavefront_rms, report.metric, report.delta_norm
        );
        Ok(report)
    }

    /// Run a fixed number of iterations, collecting the per-step reports.
    pub fn run(&mut self, iterations: usize) -> Result<Vec<IterationReport>, LoopError> {
        let mut reports = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            reports.push(self.step()?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use active_optics::calibration::SensitivityData;
    use active_optics::prescription::{Band, Prescription};
    use active_optics::wavefront::OpdMap;
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;
    use std::sync::Arc;

    const N_COEFFS: usize = 22;
    const N_DOF: usize = 20;

    /// Simulator that ignores the prescription and renders fixed
    /// coefficients (dummy-slot layout).
    struct StaticWavefront {
        coeffs: Vec<f64>,
    }

    impl OpticalSimulator for StaticWavefront {
        fn simulate(
            &self,
            _prescription: &Prescription,
            _field_x: f64,
            _field_y: f64,
        ) -> Result<OpdMap, SimulationError> {
            Ok(WavefrontEstimator::default().evaluate(&self.coeffs, 101))
        }
    }

    /// Sensitivity where wavefront coefficient k responds one-to-one to
    /// state entry k, with a zero nominal.
    fn identity_solver() -> SensitivitySolver {
        let mut matrix = DMatrix::zeros(N_COEFFS, N_DOF);
        for i in 0..N_DOF {
            matrix[(i, i)] = 1.0;
        }
        let data = SensitivityData::new(matrix, nalgebra::DVector::zeros(N_COEFFS)).unwrap();
        SensitivitySolver::new(Arc::new(data), (0.0, 0.0)).unwrap()
    }

    #[test]
    fn test_flat_wavefront_means_no_correction() {
        let simulator = StaticWavefront {
            coeffs: vec![0.0; N_COEFFS + 1],
        };
        let mut state_loop = ClosedLoop::new(
            BendingTelescope::nominal(Band::R),
            simulator,
            identity_solver(),
            0.5,
        );
        let report = state_loop.step().unwrap();
        assert_eq!(report.iteration, 1);
        assert_abs_diff_eq!(report.metric, 0.0, epsilon = 1e-24);
        assert_abs_diff_eq!(report.delta_norm, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_step_reports_damped_delta() {
        // 1e-6 of Noll 5 maps to state entry 4 through the identity
        // sensitivity.
        let mut coeffs = vec![0.0; N_COEFFS + 1];
        coeffs[5] = 1.0e-6;
        let simulator = StaticWavefront { coeffs };
        let mut state_loop = ClosedLoop::new(
            BendingTelescope::nominal(Band::R),
            simulator,
            identity_solver(),
            0.5,
        );
        let estimated = state_loop.estimate_state().unwrap();
        assert_abs_diff_eq!(estimated.get("camry").unwrap(), 1.0e-6, epsilon = 1e-12);

        let report = state_loop.step().unwrap();
        assert_abs_diff_eq!(report.metric, 1.0e-12, epsilon = 1e-18);
        assert_abs_diff_eq!(report.delta_norm, 0.5e-6, epsilon = 1e-12);
        assert!(report.wavefront_rms > 0.0);
    }

    #[test]
    fn test_run_counts_iterations() {
        let simulator = StaticWavefront {
            coeffs: vec![0.0; N_COEFFS + 1],
        };
        let mut state_loop = ClosedLoop::new(
            BendingTelescope::nominal(Band::R),
            simulator,
            identity_solver(),
            1.0,
        );
        let reports = state_loop.run(3).unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports.last().unwrap().iteration, 3);
        assert_eq!(state_loop.iteration(), 3);
    }
}
