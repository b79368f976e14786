//! Linear perturbation-to-wavefront model.
//!
//! [`LinearOpticalModel`] implements the [`OpticalSimulator`] seam without
//! ray tracing: each rigid degree of freedom maps to a fixed set of
//! low-order Zernike responses, and perturbed mirror figures are pulled
//! back onto the pupil through a radial remap of the annulus with a factor
//! of -2 per reflection at normal incidence. The model is linear in every
//! state degree of freedom, which makes it its own ground truth: the
//! finite-difference calibration in [`crate::calibrate`] probes this same
//! model, so the solved sensitivity matrix is exact.
//!
//! Swapping in a real ray tracer only requires another [`OpticalSimulator`]
//! implementation and a matching calibration run.

use active_optics::estimator::{DEFAULT_N_COEFFS, DEFAULT_OBSCURATION};
use active_optics::prescription::{AssemblyId, MirrorId, Prescription, M1_OUTER_RADIUS};
use active_optics::surface::{Annulus, Surface};
use active_optics::wavefront::{OpdMap, OpticalSimulator, SimulationError};
use active_optics::zernike;
use ndarray::Array2;
use std::sync::Arc;

/// OPD sign convention for a reflective surface at normal incidence: a
/// bump of height h advances the wavefront by 2h.
const REFLECTION: f64 = -2.0;

/// Wavefront responses of the ten rigid degrees of freedom, as
/// (Noll index, OPD coefficient per meter or radian of offset). Values are
/// representative of a fast three-mirror anastigmat: decenters couple tilt
/// and coma, piston couples defocus and spherical, tilts mix in
/// astigmatism. The pairs are chosen so the twenty state columns stay
/// linearly independent through the solver's truncated pseudo-inverse.
const RIGID_RESPONSES: [&[(usize, f64)]; 10] = [
    &[(2, 0.8), (8, 0.12)],             // camx
    &[(3, 0.8), (7, 0.12)],             // camy
    &[(4, 1.2)],                        // camz
    &[(3, -3.0), (7, 0.5), (5, 0.3)],   // camrx
    &[(2, 3.0), (8, 0.5), (6, 0.3)],    // camry
    &[(2, 0.5), (8, -0.25)],            // m2x
    &[(3, 0.5), (7, -0.25)],            // m2y
    &[(4, 2.0), (11, 0.15)],            // m2z
    &[(3, -1.5), (7, 0.3), (13, 0.1)],  // m2rx
    &[(2, 1.5), (8, -0.3), (14, 0.1)],  // m2ry
];

/// Residual aberrations of the unperturbed design at the on-axis field,
/// (Noll index, meters of OPD). The solver's nominal wavefront absorbs
/// these rather than correcting them away.
const DESIGN_WAVEFRONT: [(usize, f64); 2] = [(4, 2.0e-8), (11, -8.0e-9)];

/// Field curvature: meters of defocus per squared radian of field angle.
const FIELD_CURVATURE: f64 = 50.0;
/// Linear astigmatism: meters of astigmatism per squared radian of field.
const FIELD_ASTIGMATISM: f64 = 30.0;

/// Linear wavefront simulator over the survey pupil.
#[derive(Debug, Clone)]
pub struct LinearOpticalModel {
    grid_size: usize,
}

impl Default for LinearOpticalModel {
    fn default() -> Self {
        Self::new(101)
    }
}

impl LinearOpticalModel {
    /// Build a model sampling the pupil on an odd `grid_size` so the grid
    /// carries a center row and column.
    pub fn new(grid_size: usize) -> Self {
        assert!(grid_size >= 3 && grid_size % 2 == 1, "grid size must be odd");
        Self { grid_size }
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Rigid-body and field contributions as a dummy-slot coefficient
    /// vector over the pupil.
    fn rigid_coefficients(
        &self,
        prescription: &Prescription,
        field_x: f64,
        field_y: f64,
    ) -> Vec<f64> {
        let reference = Prescription::nominal(prescription.band());
        let mut coeffs = vec![0.0; DEFAULT_N_COEFFS + 1];
        for (group, id) in [AssemblyId::Camera, AssemblyId::M2Assembly]
            .iter()
            .enumerate()
        {
            let offset = prescription.frame(*id).offset_from(reference.frame(*id));
            for (axis, &value) in offset.iter().enumerate() {
                if value == 0.0 {
                    continue;
                }
                for &(j, response) in RIGID_RESPONSES[group * 5 + axis] {
                    coeffs[j] += response * value;
                }
            }
        }
        for (j, value) in DESIGN_WAVEFRONT {
            coeffs[j] += value;
        }
        // A field angle theta tips the wavefront by theta * R across the
        // pupil; Z2/Z3 carry half of that with the Noll normalization.
        coeffs[2] += field_x * M1_OUTER_RADIUS / 2.0;
        coeffs[3] += field_y * M1_OUTER_RADIUS / 2.0;
        // Field curvature and linear astigmatism, quadratic in the field
        // angle and vanishing on-axis.
        coeffs[4] += FIELD_CURVATURE * (field_x * field_x + field_y * field_y);
        coeffs[6] += FIELD_ASTIGMATISM * (field_x * field_x - field_y * field_y);
        coeffs[5] += FIELD_ASTIGMATISM * 2.0 * field_x * field_y;
        coeffs
    }
}

/// Map a normalized pupil radius onto a mirror's annular zone, preserving
/// azimuth.
fn remap_radius(rho: f64, zone: Annulus) -> f64 {
    zone.inner + (rho - DEFAULT_OBSCURATION) / (1.0 - DEFAULT_OBSCURATION) * (zone.outer - zone.inner)
}

impl OpticalSimulator for LinearOpticalModel {
    fn simulate(
        &self,
        prescription: &Prescription,
        field_x: f64,
        field_y: f64,
    ) -> Result<OpdMap, SimulationError> {
        let coeffs = self.rigid_coefficients(prescription, field_x, field_y);

        let mut residuals: Vec<(Arc<dyn Surface>, Annulus)> = Vec::new();
        for id in MirrorId::ALL {
            let mirror = prescription.mirror(id);
            if let Some(surface) = mirror.residual() {
                residuals.push((surface.clone(), mirror.aperture()));
            }
        }

        let n = self.grid_size;
        let data = Array2::from_shape_fn((n, n), |(iy, ix)| {
            let x = -1.0 + 2.0 * ix as f64 / (n - 1) as f64;
            let y = -1.0 + 2.0 * iy as f64 / (n - 1) as f64;
            let rho = (x * x + y * y).sqrt();
            if !(DEFAULT_OBSCURATION..=1.0).contains(&rho) {
                return f64::NAN;
            }
            let mut opd: f64 = coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(j, c)| c * zernike::zernike(j, x, y))
                .sum();
            for (surface, zone) in &residuals {
                let r = remap_radius(rho, *zone);
                let scale = r / rho;
                opd += REFLECTION * surface.sag(x * scale, y * scale);
            }
            opd
        });
        Ok(OpdMap::new(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use active_optics::estimator::WavefrontEstimator;
    use active_optics::prescription::Band;
    use active_optics::state::BendingState;
    use active_optics::telescope::BendingTelescope;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn simulate_state(delta: &BendingState) -> OpdMap {
        let mut telescope = BendingTelescope::nominal(Band::R);
        telescope.update(delta).unwrap();
        LinearOpticalModel::default()
            .simulate(telescope.prescription(), 0.0, 0.0)
            .unwrap()
    }

    fn nominal_opd() -> OpdMap {
        LinearOpticalModel::default()
            .simulate(&Prescription::nominal(Band::R), 0.0, 0.0)
            .unwrap()
    }

    #[test]
    fn test_mask_matches_pupil_annulus() {
        let opd = nominal_opd();
        let n = opd.size();
        assert!(opd.data()[(n / 2, n / 2)].is_nan());
        assert!(opd.data()[(0, 0)].is_nan());
        assert!(opd.data()[(n / 2, n - 1)].is_finite());
        let frac = opd.valid_count() as f64 / (n * n) as f64;
        let expected =
            std::f64::consts::PI * (1.0 - DEFAULT_OBSCURATION.powi(2)) / 4.0;
        assert!((frac - expected).abs() < 0.02);
    }

    #[test]
    fn test_design_wavefront_present_at_nominal() {
        let fit = WavefrontEstimator::default()
            .estimate(&nominal_opd(), DEFAULT_N_COEFFS)
            .unwrap();
        // Defocus and spherical from the design table, nothing else.
        assert_abs_diff_eq!(fit[3], 2.0e-8, epsilon = 1e-12);
        assert_abs_diff_eq!(fit[10], -8.0e-9, epsilon = 1e-12);
        assert_abs_diff_eq!(fit[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit[5], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_opd_linear_in_rigid_offsets() {
        let nominal = nominal_opd();
        let mut single = BendingState::zeros();
        single.set("camx", 1.0e-5).unwrap();
        let mut double = BendingState::zeros();
        double.set("camx", 2.0e-5).unwrap();

        let opd1 = simulate_state(&single);
        let opd2 = simulate_state(&double);
        for (((_, _, v1), (_, _, v2)), (_, _, v0)) in
            opd1.samples().zip(opd2.samples()).zip(nominal.samples())
        {
            assert_abs_diff_eq!(v2 - v0, 2.0 * (v1 - v0), epsilon = 1e-15);
        }
    }

    #[test]
    fn test_bending_pullback_is_linear() {
        let nominal = nominal_opd();
        let mut single = BendingState::zeros();
        single.set("m2b1", 1.0e-6).unwrap();
        let mut triple = BendingState::zeros();
        triple.set("m2b1", 3.0e-6).unwrap();

        let opd1 = simulate_state(&single);
        let opd3 = simulate_state(&triple);
        let mut peak = 0.0f64;
        for (((_, _, v1), (_, _, v3)), (_, _, v0)) in
            opd1.samples().zip(opd3.samples()).zip(nominal.samples())
        {
            assert_abs_diff_eq!(v3 - v0, 3.0 * (v1 - v0), epsilon = 1e-15);
            peak = peak.max((v1 - v0).abs());
        }
        // A unit-RMS mode at 1e-6 m shows up at roughly twice that in OPD.
        assert!(peak > 1.0e-6, "bending left no OPD imprint: peak {peak:e}");
    }

    #[test]
    fn test_field_angle_tips_wavefront() {
        let model = LinearOpticalModel::default();
        let field = 1.0e-4;
        let opd = model
            .simulate(&Prescription::nominal(Band::R), field, 0.0)
            .unwrap();
        let fit = WavefrontEstimator::default()
            .estimate(&opd, DEFAULT_N_COEFFS)
            .unwrap();
        assert_relative_eq!(
            fit[1],
            field * M1_OUTER_RADIUS / 2.0,
            max_relative = 1e-9
        );
        assert_abs_diff_eq!(fit[2], 0.0, epsilon = 1e-12);
        // Field curvature and astigmatism ride on top of the design terms.
        assert_abs_diff_eq!(
            fit[3],
            2.0e-8 + FIELD_CURVATURE * field * field,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            fit[5],
            FIELD_ASTIGMATISM * field * field,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_radial_remap_spans_zone() {
        let zone = Annulus::new(1.71, 0.9);
        assert_relative_eq!(
            remap_radius(DEFAULT_OBSCURATION, zone),
            0.9,
            max_relative = 1e-12
        );
        assert_relative_eq!(remap_radius(1.0, zone), 1.71, max_relative = 1e-12);
    }
}
