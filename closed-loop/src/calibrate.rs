//! Finite-difference calibration of the wavefront sensitivity.
//!
//! The sensitivity matrix the solver inverts is measured, not assumed:
//! each state degree of freedom is probed one at a time on a fresh nominal
//! telescope, the perturbed wavefront is simulated and fit, and the
//! coefficient change per unit of offset becomes one matrix column. The
//! unperturbed fit becomes the nominal wavefront vector. Probing the
//! bundled linear simulator reproduces its response tables exactly; probing
//! a ray tracer yields its local linearization about the design.

use active_optics::calibration::{CalibrationError, SensitivityData};
use active_optics::estimator::{EstimatorError, WavefrontEstimator};
use active_optics::mirror::MirrorError;
use active_optics::prescription::Band;
use active_optics::state::{BendingState, StateError, BENDING_DOF};
use active_optics::telescope::BendingTelescope;
use active_optics::wavefront::{OpticalSimulator, SimulationError};
use log::{debug, info};
use nalgebra::DMatrix;
use std::path::Path;
use thiserror::Error;

/// Errors raised while measuring or persisting a sensitivity matrix.
#[derive(Debug, Error)]
pub enum CalibrateError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Estimator(#[from] EstimatorError),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Probe amplitude for a degree of freedom: large enough to rise above fit
/// noise, small enough to stay in the small-angle regime.
fn probe_amplitude(index: usize) -> f64 {
    match index {
        0..=2 | 5..=7 => 1.0e-5, // hexapod translations, meters
        3..=4 | 8..=9 => 1.0e-6, // hexapod tilts, radians
        _ => 1.0e-7,             // bending amplitudes, meters RMS
    }
}

/// Measure the on-axis sensitivity of a simulator by single-DOF probes.
pub fn calibrate_sensitivity<S: OpticalSimulator>(
    simulator: &S,
    estimator: &WavefrontEstimator,
    band: Band,
    n_coeffs: usize,
) -> Result<SensitivityData, CalibrateError> {
    let nominal_telescope = BendingTelescope::nominal(band);
    let opd = simulator.simulate(nominal_telescope.prescription(), 0.0, 0.0)?;
    let nominal = estimator.estimate(&opd, n_coeffs)?;
    info!(
        "calibrating sensitivity: {} coeffs x {} dof, band {}",
        n_coeffs, BENDING_DOF, band
    );

    let mut matrix = DMatrix::zeros(n_coeffs, BENDING_DOF);
    for dof in 0..BENDING_DOF {
        let amplitude = probe_amplitude(dof);
        let mut values = [0.0; BENDING_DOF];
        values[dof] = amplitude;
        let delta = BendingState::from_slice(&values)?;

        let mut telescope = BendingTelescope::nominal(band);
        telescope.update(&delta)?;
        let opd = simulator.simulate(telescope.prescription(), 0.0, 0.0)?;
        let perturbed = estimator.estimate(&opd, n_coeffs)?;

        let column = (perturbed - &nominal) / amplitude;
        debug!(
            "probed {} at {:e}: response norm {:.3e}",
            BendingState::names()[dof],
            amplitude,
            column.norm()
        );
        matrix.set_column(dof, &column);
    }
    Ok(SensitivityData::new(matrix, nominal)?)
}

/// Persist a calibration as the raw flat files the loaders read back.
pub fn write_calibration(
    data: &SensitivityData,
    matrix_path: &Path,
    nominal_path: &Path,
) -> Result<(), CalibrateError> {
    data.save_raw(matrix_path, nominal_path)?;
    info!(
        "wrote calibration: {} and {}",
        matrix_path.display(),
        nominal_path.display()
    );
    Ok(())
}
