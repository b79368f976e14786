//! Closed-loop harness for the active optics core
//!
//! This crate closes the loop around the `active-optics` building blocks:
//! a linear perturbation-to-wavefront simulator standing in for a full ray
//! tracer, a finite-difference calibration pipeline that produces the
//! sensitivity matrix the solver inverts, and a sequential loop runner
//! that measures, solves, and applies damped corrections.

pub mod calibrate;
pub mod linear_optics;
pub mod runner;

pub use calibrate::{calibrate_sensitivity, write_calibration, CalibrateError};
pub use linear_optics::LinearOpticalModel;
pub use runner::{ClosedLoop, IterationReport, LoopError};
