//! Deformable mirror figure residuals.
//!
//! A [`MirrorResidual`] accumulates surface deformation as a linear
//! combination of calibrated bending modes. The basis is shared, immutable
//! calibration data; the accumulated height map is owned by the telescope
//! that applies corrections. Force, thermal, and gravity responses are not
//! modeled; the operations exist so that callers hit a hard error instead
//! of a silent no-op.

use crate::calibration::MirrorModes;
use crate::surface::GridSurface;
use log::debug;
use ndarray::Array2;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by mirror residual operations.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// A mode amplitude vector or mode-count selection did not match the
    /// basis.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// The requested physical response is not modeled.
    #[error("unimplemented mirror capability: {0}")]
    UnimplementedCapability(&'static str),
}

/// Accumulated figure residual of one deformable mirror.
#[derive(Debug)]
pub struct MirrorResidual {
    basis: Arc<MirrorModes>,
    n_modes: usize,
    residual: Array2<f64>,
}

impl MirrorResidual {
    /// Build a flat residual over the first `n_modes` modes of a basis.
    pub fn new(basis: Arc<MirrorModes>, n_modes: usize) -> Result<Self, MirrorError> {
        if n_modes > basis.n_modes() {
            return Err(MirrorError::DimensionMismatch {
                expected: basis.n_modes(),
                got: n_modes,
            });
        }
        let residual = Array2::zeros((basis.y().len(), basis.x().len()));
        Ok(Self {
            basis,
            n_modes,
            residual,
        })
    }

    /// Build a residual and immediately apply an initial bending vector.
    pub fn with_initial_bending(
        basis: Arc<MirrorModes>,
        n_modes: usize,
        amplitudes: &[f64],
    ) -> Result<Self, MirrorError> {
        let mut mirror = Self::new(basis, n_modes)?;
        mirror.apply_bending(amplitudes)?;
        Ok(mirror)
    }

    /// Number of controllable modes.
    pub fn n_modes(&self) -> usize {
        self.n_modes
    }

    pub fn basis(&self) -> &Arc<MirrorModes> {
        &self.basis
    }

    /// The accumulated height map over the substrate grid, meters.
    pub fn residual(&self) -> &Array2<f64> {
        &self.residual
    }

    /// Add a bending increment: `residual += sum_k delta[k] * mode_k`.
    /// Linear in the amplitudes and independent of application order.
    pub fn apply_bending(&mut self, delta: &[f64]) -> Result<(), MirrorError> {
        if delta.len() != self.n_modes {
            return Err(MirrorError::DimensionMismatch {
                expected: self.n_modes,
                got: delta.len(),
            });
        }
        for (k, &amplitude) in delta.iter().enumerate() {
            if amplitude != 0.0 {
                self.residual.scaled_add(amplitude, &self.basis.mode(k));
            }
        }
        debug!(
            "applied bending increment, residual peak {:.3e} m",
            self.residual.iter().fold(0.0f64, |m, v| m.max(v.abs()))
        );
        Ok(())
    }

    /// Actuator force response. Not modeled.
    pub fn apply_forces(&mut self, _forces: &[f64]) -> Result<(), MirrorError> {
        Err(MirrorError::UnimplementedCapability(
            "actuator force response",
        ))
    }

    /// Thermal gradient response. Not modeled.
    pub fn apply_thermal(&mut self, _gradients: &[f64]) -> Result<(), MirrorError> {
        Err(MirrorError::UnimplementedCapability(
            "thermal gradient response",
        ))
    }

    /// Gravity-vector (elevation) response. Not modeled.
    pub fn apply_gravity(&mut self, _zenith_angle: f64) -> Result<(), MirrorError> {
        Err(MirrorError::UnimplementedCapability(
            "gravity sag response",
        ))
    }

    /// Snapshot the accumulated residual as an interpolable surface.
    pub fn to_surface(&self) -> GridSurface {
        GridSurface::new(
            self.basis.x().as_slice().expect("standard layout grid"),
            self.basis.y().as_slice().expect("standard layout grid"),
            self.residual.clone(),
        )
    }
}
