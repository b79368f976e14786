//! Active optics core for a three-mirror survey telescope
//!
//! This crate provides the building blocks of the active optics control
//! loop: optical state vectors, deformable mirror residuals, the telescope
//! prescription and its update rules, Zernike wavefront estimation, the
//! sensitivity-matrix solver, and the gain-damped controller. The loop
//! glue and the bundled wavefront simulator live in the companion
//! `closed-loop` crate.

pub mod calibration;
pub mod control;
pub mod estimator;
pub mod metric;
pub mod mirror;
pub mod prescription;
pub mod solver;
pub mod state;
pub mod surface;
pub mod telescope;
pub mod wavefront;
pub mod zernike;

// Re-exports for easier access
pub use calibration::{MirrorModes, SensitivityData};
pub use control::{ControlError, Controller, GainController};
pub use estimator::{EstimatorError, WavefrontEstimator};
pub use metric::{Metric, SumOfSquares, WeightedSumOfSquares};
pub use mirror::{MirrorError, MirrorResidual};
pub use prescription::{AssemblyId, Band, MirrorId, Prescription, RigidFrame};
pub use solver::{SensitivitySolver, Solver, SolverError};
pub use state::{BendingState, StateError, ZernikeState, BENDING_DOF, ZERNIKE_DOF};
pub use surface::{Annulus, ConicSurface, GridSurface, Surface, ZernikeSurface};
pub use telescope::{BendingTelescope, ZernikeTelescope};
pub use wavefront::{OpdMap, OpticalSimulator, SimulationError};
