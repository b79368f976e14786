//! Telescope prescription: named optical elements and their rigid frames.
//!
//! The prescription is the mutable description of the optical train that
//! simulators consume. It carries two rigid frames (the camera and the M2
//! assembly, each on a hexapod) and three mirror elements (`m1`, `m2`,
//! `m3`), every one queryable and replaceable by name. The M1 and M3
//! surfaces are zones of one monolithic substrate, so perturbed figure
//! residuals are attached to both as the same shared object.
//!
//! Rigid updates follow the hexapod convention used throughout the loop:
//! translations add to the element origin in global axes, and tilts compose
//! a rotation about the element's local x axis followed by one about its
//! local y axis, in that fixed order. The loop operates in the small-angle
//! regime where the residual order dependence is negligible.

use crate::surface::{Annulus, ConicSurface, Surface};
use nalgebra::{Matrix3, Rotation3, Vector3};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Outer radius of the M1 zone of the primary substrate, meters.
pub const M1_OUTER_RADIUS: f64 = 4.18;
/// Inner radius of the M1 zone, meters. Sets the pupil obscuration.
pub const M1_INNER_RADIUS: f64 = 2.558;
/// Outer radius of the M2 secondary, meters.
pub const M2_OUTER_RADIUS: f64 = 1.71;
/// Inner radius of the M2 secondary, meters.
pub const M2_INNER_RADIUS: f64 = 0.9;
/// Outer radius of the M3 zone of the primary substrate, meters.
pub const M3_OUTER_RADIUS: f64 = 2.508;
/// Inner radius of the M3 zone, meters.
pub const M3_INNER_RADIUS: f64 = 0.55;

/// Photometric bands of the survey filter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    U,
    G,
    R,
    I,
    Z,
    Y,
}

impl Band {
    pub const ALL: [Band; 6] = [Band::U, Band::G, Band::R, Band::I, Band::Z, Band::Y];

    /// Effective wavelength of the band in nanometers.
    pub fn effective_wavelength_nm(&self) -> f64 {
        match self {
            Band::U => 367.0,
            Band::G => 482.0,
            Band::R => 622.0,
            Band::I => 754.0,
            Band::Z => 869.0,
            Band::Y => 971.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Band::U => "u",
            Band::G => "g",
            Band::R => "r",
            Band::I => "i",
            Band::Z => "z",
            Band::Y => "y",
        }
    }

    pub fn from_name(name: &str) -> Option<Band> {
        Band::ALL.iter().copied().find(|b| b.name() == name)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifier of a rigid (hexapod-mounted) assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssemblyId {
    Camera,
    M2Assembly,
}

impl AssemblyId {
    pub fn name(&self) -> &'static str {
        match self {
            AssemblyId::Camera => "camera",
            AssemblyId::M2Assembly => "m2",
        }
    }
}

/// Identifier of a mirror element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MirrorId {
    M1,
    M2,
    M3,
}

impl MirrorId {
    pub const ALL: [MirrorId; 3] = [MirrorId::M1, MirrorId::M2, MirrorId::M3];

    pub fn name(&self) -> &'static str {
        match self {
            MirrorId::M1 => "m1",
            MirrorId::M2 => "m2",
            MirrorId::M3 => "m3",
        }
    }

    pub fn from_name(name: &str) -> Option<MirrorId> {
        MirrorId::ALL.iter().copied().find(|m| m.name() == name)
    }
}

/// Position and orientation of an element in the global telescope frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidFrame {
    origin: Vector3<f64>,
    orientation: Matrix3<f64>,
}

impl RigidFrame {
    pub fn at(origin: Vector3<f64>) -> Self {
        Self {
            origin,
            orientation: Matrix3::identity(),
        }
    }

    pub fn origin(&self) -> Vector3<f64> {
        self.origin
    }

    pub fn orientation(&self) -> &Matrix3<f64> {
        &self.orientation
    }

    /// Shift the element along the global axes.
    pub fn translate(&mut self, delta: Vector3<f64>) {
        self.origin += delta;
    }

    /// Tilt the element about its local axes, x first then y.
    pub fn tilt(&mut self, rx: f64, ry: f64) {
        let rot_x = Rotation3::from_axis_angle(&Vector3::x_axis(), rx);
        let rot_y = Rotation3::from_axis_angle(&Vector3::y_axis(), ry);
        self.orientation = self.orientation * rot_x.into_inner() * rot_y.into_inner();
    }

    /// Net rigid offset of this frame relative to a reference frame:
    /// (dx, dy, dz, rx, ry), recovering the tilt angles from the relative
    /// rotation in the small-angle regime.
    pub fn offset_from(&self, reference: &RigidFrame) -> [f64; 5] {
        let d = self.origin - reference.origin;
        let rel = reference.orientation.transpose() * self.orientation;
        // For R = RotX(rx) RotY(ry): R[(1,2)] = -sin(rx) cos(ry),
        // R[(2,2)] = cos(rx) cos(ry), R[(0,2)] = sin(ry).
        let rx = (-rel[(1, 2)]).atan2(rel[(2, 2)]);
        let ry = rel[(0, 2)].asin();
        [d.x, d.y, d.z, rx, ry]
    }
}

/// One mirror of the optical train: nominal figure, optional perturbation
/// residual, and clear aperture.
#[derive(Debug, Clone)]
pub struct MirrorElement {
    nominal: Arc<dyn Surface>,
    residual: Option<Arc<dyn Surface>>,
    aperture: Annulus,
}

impl MirrorElement {
    pub fn new(nominal: Arc<dyn Surface>, aperture: Annulus) -> Self {
        Self {
            nominal,
            residual: None,
            aperture,
        }
    }

    pub fn nominal(&self) -> &Arc<dyn Surface> {
        &self.nominal
    }

    pub fn residual(&self) -> Option<&Arc<dyn Surface>> {
        self.residual.as_ref()
    }

    pub fn aperture(&self) -> Annulus {
        self.aperture
    }

    /// Replace the perturbation residual wholesale. The active figure is
    /// always nominal plus the current residual; residuals are never
    /// stacked on one another.
    pub fn set_residual(&mut self, residual: Arc<dyn Surface>) {
        self.residual = Some(residual);
    }

    pub fn clear_residual(&mut self) {
        self.residual = None;
    }

    /// Sag of the active (perturbed) figure at local coordinates.
    pub fn active_sag(&self, x: f64, y: f64) -> f64 {
        let base = self.nominal.sag(x, y);
        match &self.residual {
            Some(residual) => base + residual.sag(x, y),
            None => base,
        }
    }
}

/// The full optical train description for one band.
#[derive(Debug, Clone)]
pub struct Prescription {
    band: Band,
    camera: RigidFrame,
    m2_assembly: RigidFrame,
    mirrors: BTreeMap<MirrorId, MirrorElement>,
}

impl Prescription {
    /// The unperturbed design prescription for a band.
    pub fn nominal(band: Band) -> Self {
        let mut mirrors = BTreeMap::new();
        mirrors.insert(
            MirrorId::M1,
            MirrorElement::new(
                Arc::new(ConicSurface::new(19.835, -1.215)),
                Annulus::new(M1_OUTER_RADIUS, M1_INNER_RADIUS),
            ),
        );
        mirrors.insert(
            MirrorId::M2,
            MirrorElement::new(
                Arc::new(ConicSurface::new(-6.788, -0.222)),
                Annulus::new(M2_OUTER_RADIUS, M2_INNER_RADIUS),
            ),
        );
        mirrors.insert(
            MirrorId::M3,
            MirrorElement::new(
                Arc::new(ConicSurface::new(-8.344, 0.155)),
                Annulus::new(M3_OUTER_RADIUS, M3_INNER_RADIUS),
            ),
        );
        Self {
            band,
            camera: RigidFrame::at(Vector3::new(0.0, 0.0, 3.397)),
            m2_assembly: RigidFrame::at(Vector3::new(0.0, 0.0, 6.156)),
            mirrors,
        }
    }

    pub fn band(&self) -> Band {
        self.band
    }

    pub fn frame(&self, id: AssemblyId) -> &RigidFrame {
        match id {
            AssemblyId::Camera => &self.camera,
            AssemblyId::M2Assembly => &self.m2_assembly,
        }
    }

    pub fn frame_mut(&mut self, id: AssemblyId) -> &mut RigidFrame {
        match id {
            AssemblyId::Camera => &mut self.camera,
            AssemblyId::M2Assembly => &mut self.m2_assembly,
        }
    }

    pub fn mirror(&self, id: MirrorId) -> &MirrorElement {
        &self.mirrors[&id]
    }

    pub fn mirror_mut(&mut self, id: MirrorId) -> &mut MirrorElement {
        self.mirrors.get_mut(&id).expect("all mirrors present by construction")
    }

    /// Look up any named element's rigid frame ("camera" or "m2").
    pub fn frame_by_name(&self, name: &str) -> Option<&RigidFrame> {
        match name {
            "camera" => Some(&self.camera),
            "m2" => Some(&self.m2_assembly),
            _ => None,
        }
    }

    /// Look up a mirror element by name ("m1", "m2", "m3").
    pub fn mirror_by_name(&self, name: &str) -> Option<&MirrorElement> {
        MirrorId::from_name(name).map(|id| self.mirror(id))
    }

    /// Apply hexapod offsets to the camera and M2 assembly frames. Each
    /// group is (dx, dy, dz, rx, ry): a global translation followed by
    /// local tilts in the fixed x-then-y order.
    pub fn apply_rigid(&mut self, cam_hexapod: &[f64], m2_hexapod: &[f64]) {
        debug_assert_eq!(cam_hexapod.len(), 5);
        debug_assert_eq!(m2_hexapod.len(), 5);
        self.camera
            .translate(Vector3::new(cam_hexapod[0], cam_hexapod[1], cam_hexapod[2]));
        self.camera.tilt(cam_hexapod[3], cam_hexapod[4]);
        self.m2_assembly
            .translate(Vector3::new(m2_hexapod[0], m2_hexapod[1], m2_hexapod[2]));
        self.m2_assembly.tilt(m2_hexapod[3], m2_hexapod[4]);
    }
}
