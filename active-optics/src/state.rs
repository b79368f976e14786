//! Optical state vectors for the active optics control loop.
//!
//! Two fixed-layout state parameterizations are supported:
//!
//! - [`BendingState`]: ten rigid-body degrees of freedom (camera and M2
//!   hexapods) plus five bending-mode amplitudes each for the M1M3 monolith
//!   and the M2 secondary, 20 entries total. This is the basis the
//!   sensitivity solver and controller work in.
//! - [`ZernikeState`]: the same ten rigid degrees of freedom plus 21 Zernike
//!   figure coefficients for the M2 surface (`m2z0..m2z20`, Noll-indexed
//!   with the `m2z0` slot unused since Noll counting starts at j = 1).
//!
//! Degree-of-freedom names and ordering are fixed; lookups by unknown name
//! fail with [`StateError::UnknownDof`] rather than silently extending the
//! vector.
//!
//! # Examples
//!
//! ```rust
//! use active_optics::state::BendingState;
//!
//! let mut state = BendingState::zeros();
//! state.set("m2b3", 1e-6).unwrap();
//! assert_eq!(state.get("m2b3").unwrap(), 1e-6);
//! assert_eq!(state.m2_modes()[2], 1e-6);
//! ```

use nalgebra::DVector;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use thiserror::Error;

/// Errors raised by state vector construction and lookups.
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    /// The requested degree-of-freedom name is not part of the state layout.
    #[error("unknown degree of freedom '{0}'")]
    UnknownDof(String),
    /// A dense vector had the wrong length for this state layout.
    #[error("state vector length mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Number of degrees of freedom in the bending-mode parameterization.
pub const BENDING_DOF: usize = 20;
/// Number of degrees of freedom in the M2 Zernike parameterization.
pub const ZERNIKE_DOF: usize = 31;

/// Canonical ordering of the bending-mode state.
///
/// Hexapod translations are in meters, tilts in radians, mode amplitudes in
/// meters RMS of surface deformation.
const BENDING_NAMES: [&str; BENDING_DOF] = [
    "camx", "camy", "camz", "camrx", "camry", // camera hexapod
    "m2x", "m2y", "m2z", "m2rx", "m2ry", // M2 hexapod
    "m1m3b1", "m1m3b2", "m1m3b3", "m1m3b4", "m1m3b5", // M1M3 bending modes
    "m2b1", "m2b2", "m2b3", "m2b4", "m2b5", // M2 bending modes
];

/// Canonical ordering of the M2 Zernike state. `m2z0` is a placeholder slot
/// kept so that `m2zJ` carries the Noll-j coefficient directly.
const ZERNIKE_NAMES: [&str; ZERNIKE_DOF] = [
    "camx", "camy", "camz", "camrx", "camry", "m2x", "m2y", "m2z", "m2rx", "m2ry", "m2z0", "m2z1",
    "m2z2", "m2z3", "m2z4", "m2z5", "m2z6", "m2z7", "m2z8", "m2z9", "m2z10", "m2z11", "m2z12",
    "m2z13", "m2z14", "m2z15", "m2z16", "m2z17", "m2z18", "m2z19", "m2z20",
];

fn index_in(names: &'static [&'static str], name: &str) -> Result<usize, StateError> {
    names
        .iter()
        .position(|&n| n == name)
        .ok_or_else(|| StateError::UnknownDof(name.to_string()))
}

fn fmt_nonzero(f: &mut fmt::Formatter<'_>, names: &[&str], values: &[f64]) -> fmt::Result {
    let mut first = true;
    for (name, value) in names.iter().zip(values) {
        if *value != 0.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={:e}", name, value)?;
            first = false;
        }
    }
    if first {
        write!(f, "(all zero)")?;
    }
    Ok(())
}

/// Telescope state in the bending-mode basis: camera hexapod, M2 hexapod,
/// M1M3 bending modes, M2 bending modes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BendingState {
    values: [f64; BENDING_DOF],
}

impl BendingState {
    /// The unperturbed state.
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Canonical degree-of-freedom names in vector order.
    pub fn names() -> &'static [&'static str] {
        &BENDING_NAMES
    }

    /// Index of a named degree of freedom in the dense vector layout.
    pub fn index_of(name: &str) -> Result<usize, StateError> {
        index_in(&BENDING_NAMES, name)
    }

    /// Build from a dense slice in canonical order.
    pub fn from_slice(values: &[f64]) -> Result<Self, StateError> {
        if values.len() != BENDING_DOF {
            return Err(StateError::DimensionMismatch {
                expected: BENDING_DOF,
                got: values.len(),
            });
        }
        let mut state = Self::zeros();
        state.values.copy_from_slice(values);
        Ok(state)
    }

    /// Build from a dense column vector in canonical order.
    pub fn from_vector(v: &DVector<f64>) -> Result<Self, StateError> {
        Self::from_slice(v.as_slice())
    }

    /// Read a degree of freedom by name.
    pub fn get(&self, name: &str) -> Result<f64, StateError> {
        Ok(self.values[Self::index_of(name)?])
    }

    /// Write a degree of freedom by name.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), StateError> {
        self.values[Self::index_of(name)?] = value;
        Ok(())
    }

    /// The full state in canonical order.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Camera hexapod group: `camx, camy, camz, camrx, camry`.
    pub fn cam_hexapod(&self) -> &[f64] {
        &self.values[0..5]
    }

    /// M2 hexapod group: `m2x, m2y, m2z, m2rx, m2ry`.
    pub fn m2_hexapod(&self) -> &[f64] {
        &self.values[5..10]
    }

    /// M1M3 bending-mode amplitudes.
    pub fn m1m3_modes(&self) -> &[f64] {
        &self.values[10..15]
    }

    /// M2 bending-mode amplitudes.
    pub fn m2_modes(&self) -> &[f64] {
        &self.values[15..20]
    }

    /// Dense column vector in canonical order.
    pub fn to_vector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.values)
    }

    /// Root-mean-square of the state entries.
    pub fn rms(&self) -> f64 {
        let sum_sq: f64 = self.values.iter().map(|v| v * v).sum();
        (sum_sq / BENDING_DOF as f64).sqrt()
    }

    /// The state scaled by a factor, entry by entry.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut out = self.clone();
        for v in &mut out.values {
            *v *= factor;
        }
        out
    }
}

impl Add for BendingState {
    type Output = BendingState;

    fn add(mut self, rhs: BendingState) -> BendingState {
        self += rhs;
        self
    }
}

impl AddAssign for BendingState {
    fn add_assign(&mut self, rhs: BendingState) {
        for (a, b) in self.values.iter_mut().zip(rhs.values) {
            *a += b;
        }
    }
}

impl Sub for BendingState {
    type Output = BendingState;

    fn sub(mut self, rhs: BendingState) -> BendingState {
        for (a, b) in self.values.iter_mut().zip(rhs.values) {
            *a -= b;
        }
        self
    }
}

impl fmt::Display for BendingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_nonzero(f, &BENDING_NAMES, &self.values)
    }
}

/// Telescope state with the M2 figure expressed as Zernike coefficients
/// instead of bending modes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZernikeState {
    values: [f64; ZERNIKE_DOF],
}

impl ZernikeState {
    /// The unperturbed state.
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Canonical degree-of-freedom names in vector order.
    pub fn names() -> &'static [&'static str] {
        &ZERNIKE_NAMES
    }

    /// Index of a named degree of freedom in the dense vector layout.
    pub fn index_of(name: &str) -> Result<usize, StateError> {
        index_in(&ZERNIKE_NAMES, name)
    }

    /// Build from a dense slice in canonical order.
    pub fn from_slice(values: &[f64]) -> Result<Self, StateError> {
        if values.len() != ZERNIKE_DOF {
            return Err(StateError::DimensionMismatch {
                expected: ZERNIKE_DOF,
                got: values.len(),
            });
        }
        let mut state = Self::zeros();
        state.values.copy_from_slice(values);
        Ok(state)
    }

    /// Read a degree of freedom by name.
    pub fn get(&self, name: &str) -> Result<f64, StateError> {
        Ok(self.values[Self::index_of(name)?])
    }

    /// Write a degree of freedom by name.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), StateError> {
        self.values[Self::index_of(name)?] = value;
        Ok(())
    }

    /// The full state in canonical order.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Camera hexapod group: `camx, camy, camz, camrx, camry`.
    pub fn cam_hexapod(&self) -> &[f64] {
        &self.values[0..5]
    }

    /// M2 hexapod group: `m2x, m2y, m2z, m2rx, m2ry`.
    pub fn m2_hexapod(&self) -> &[f64] {
        &self.values[5..10]
    }

    /// M2 figure coefficients `m2z0..m2z20` in the Noll dummy-slot layout
    /// (`m2z0` is unused).
    pub fn m2_figure(&self) -> &[f64] {
        &self.values[10..31]
    }

    /// Dense column vector in canonical order.
    pub fn to_vector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.values)
    }
}

impl Add for ZernikeState {
    type Output = ZernikeState;

    fn add(mut self, rhs: ZernikeState) -> ZernikeState {
        for (a, b) in self.values.iter_mut().zip(rhs.values) {
            *a += b;
        }
        self
    }
}

impl fmt::Display for ZernikeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_nonzero(f, &ZERNIKE_NAMES, &self.values)
    }
}
