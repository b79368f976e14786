//! Telescope models that apply optical state deltas to a prescription.
//!
//! A telescope owns a [`Prescription`] plus the perturbation bookkeeping
//! for its deformable mirrors, and exposes one operation: `update` with a
//! state *delta*. Rigid groups move the camera and M2 assembly frames;
//! figure groups accumulate into the owned residuals. After every update
//! the perturbed mirror surfaces are recomposed from nominal plus the
//! cumulative residual, never by stacking a new residual onto a previously
//! perturbed surface.
//!
//! The M1 and M3 zones share one substrate, so both elements receive the
//! same residual surface object on every recompose.
//!
//! Accumulators are injected through [`BendingTelescope::new`] or built
//! flat by [`BendingTelescope::nominal`]; there is no shared default state
//! between instances.

use crate::calibration::models;
use crate::mirror::{MirrorError, MirrorResidual};
use crate::prescription::{Band, MirrorId, Prescription};
use crate::state::{BendingState, ZernikeState};
use crate::surface::{Surface, ZernikeSurface};
use log::debug;
use std::sync::Arc;

/// Telescope with bending-mode deformable mirrors, the configuration the
/// standard control loop drives.
#[derive(Debug)]
pub struct BendingTelescope {
    prescription: Prescription,
    m1m3: MirrorResidual,
    m2: MirrorResidual,
}

impl BendingTelescope {
    /// The unperturbed design telescope with the baseline bending bases.
    pub fn nominal(band: Band) -> Self {
        let m1m3 = MirrorResidual::new(models::M1M3_MODES.clone(), models::BASELINE_MODES)
            .expect("baseline basis carries the default mode count");
        let m2 = MirrorResidual::new(models::M2_MODES.clone(), models::BASELINE_MODES)
            .expect("baseline basis carries the default mode count");
        Self::new(Prescription::nominal(band), m1m3, m2)
    }

    /// Resume from injected accumulators, e.g. mid-campaign state.
    pub fn new(prescription: Prescription, m1m3: MirrorResidual, m2: MirrorResidual) -> Self {
        let mut telescope = Self {
            prescription,
            m1m3,
            m2,
        };
        telescope.recompose();
        telescope
    }

    pub fn prescription(&self) -> &Prescription {
        &self.prescription
    }

    pub fn m1m3(&self) -> &MirrorResidual {
        &self.m1m3
    }

    pub fn m2(&self) -> &MirrorResidual {
        &self.m2
    }

    /// Apply a state delta: hexapod groups move the rigid frames, mode
    /// groups bend the mirrors, and the perturbed surfaces are recomposed.
    /// Nothing is mutated when the delta does not match the mirror bases.
    pub fn update(&mut self, delta: &BendingState) -> Result<(), MirrorError> {
        let checks = [
            (delta.m1m3_modes().len(), self.m1m3.n_modes()),
            (delta.m2_modes().len(), self.m2.n_modes()),
        ];
        for (got, expected) in checks {
            if got != expected {
                return Err(MirrorError::DimensionMismatch { expected, got });
            }
        }
        self.prescription
            .apply_rigid(delta.cam_hexapod(), delta.m2_hexapod());
        self.m1m3.apply_bending(delta.m1m3_modes())?;
        self.m2.apply_bending(delta.m2_modes())?;
        self.recompose();
        debug!("telescope update applied: {}", delta);
        Ok(())
    }

    /// Push fresh residual surfaces into the prescription. M1 and M3 get
    /// the identical surface object for the shared substrate.
    fn recompose(&mut self) {
        let m1m3_surface: Arc<dyn Surface> = Arc::new(self.m1m3.to_surface());
        self.prescription
            .mirror_mut(MirrorId::M1)
            .set_residual(m1m3_surface.clone());
        self.prescription
            .mirror_mut(MirrorId::M3)
            .set_residual(m1m3_surface);
        let m2_surface: Arc<dyn Surface> = Arc::new(self.m2.to_surface());
        self.prescription
            .mirror_mut(MirrorId::M2)
            .set_residual(m2_surface);
    }
}

/// Telescope with the M2 figure tracked as cumulative Zernike coefficients
/// rather than bending modes.
#[derive(Debug)]
pub struct ZernikeTelescope {
    prescription: Prescription,
    m2_figure: Vec<f64>,
}

impl ZernikeTelescope {
    /// Number of M2 figure coefficients in the dummy-slot layout.
    pub const M2_FIGURE_TERMS: usize = 21;

    /// The unperturbed design telescope.
    pub fn nominal(band: Band) -> Self {
        Self {
            prescription: Prescription::nominal(band),
            m2_figure: vec![0.0; Self::M2_FIGURE_TERMS],
        }
    }

    pub fn prescription(&self) -> &Prescription {
        &self.prescription
    }

    /// Cumulative M2 figure coefficients (dummy-slot layout).
    pub fn m2_figure(&self) -> &[f64] {
        &self.m2_figure
    }

    /// Apply a state delta. Coefficient deltas add into the cumulative
    /// figure and the M2 surface is rebuilt from the totals.
    pub fn update(&mut self, delta: &ZernikeState) {
        self.prescription
            .apply_rigid(delta.cam_hexapod(), delta.m2_hexapod());
        for (total, d) in self.m2_figure.iter_mut().zip(delta.m2_figure()) {
            *total += d;
        }
        let aperture = self.prescription.mirror(MirrorId::M2).aperture();
        self.prescription
            .mirror_mut(MirrorId::M2)
            .set_residual(Arc::new(ZernikeSurface::new(self.m2_figure.clone(), aperture)));
        debug!("telescope update applied: {}", delta);
    }
}
