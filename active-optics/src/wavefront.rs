//! Wavefront sampling containers and the optical simulator seam.
//!
//! An [`OpdMap`] is a square grid of optical path difference samples in
//! meters over the pupil, with the pupil square mapped to [-1, 1] on both
//! axes. Samples outside the clear aperture are NaN and every consumer
//! treats non-finite entries as masked.
//!
//! [`OpticalSimulator`] is the seam between the control loop and whatever
//! produces wavefronts: the bundled linear perturbation model, or a full
//! ray tracer in its place.

use crate::prescription::Prescription;
use ndarray::Array2;
use thiserror::Error;

/// Failure of a wavefront simulation backend.
#[derive(Debug, Error)]
#[error("wavefront simulation failed: {0}")]
pub struct SimulationError(pub String);

/// Square optical path difference map with NaN-masked invalid samples.
#[derive(Debug, Clone)]
pub struct OpdMap {
    data: Array2<f64>,
}

impl OpdMap {
    pub fn new(data: Array2<f64>) -> Self {
        assert_eq!(data.nrows(), data.ncols(), "OPD grids are square");
        assert!(data.nrows() >= 2);
        Self { data }
    }

    /// Samples per axis.
    pub fn size(&self) -> usize {
        self.data.nrows()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Normalized pupil coordinate of a row or column index.
    pub fn coord(&self, index: usize) -> f64 {
        -1.0 + 2.0 * index as f64 / (self.size() - 1) as f64
    }

    /// Number of valid (finite) samples.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }

    /// RMS over valid samples, or None when everything is masked.
    pub fn rms(&self) -> Option<f64> {
        let mut sum_sq = 0.0;
        let mut count = 0usize;
        for v in self.data.iter().filter(|v| v.is_finite()) {
            sum_sq += v * v;
            count += 1;
        }
        if count == 0 {
            None
        } else {
            Some((sum_sq / count as f64).sqrt())
        }
    }

    /// Iterate valid samples as (x, y, opd) with normalized coordinates.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        let n = self.size();
        self.data.indexed_iter().filter_map(move |((iy, ix), &v)| {
            if v.is_finite() {
                let x = -1.0 + 2.0 * ix as f64 / (n - 1) as f64;
                let y = -1.0 + 2.0 * iy as f64 / (n - 1) as f64;
                Some((x, y, v))
            } else {
                None
            }
        })
    }
}

/// Produces the OPD map of a prescription at a field angle (radians).
pub trait OpticalSimulator {
    fn simulate(
        &self,
        prescription: &Prescription,
        field_x: f64,
        field_y: f64,
    ) -> Result<OpdMap, SimulationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_coords_span_unit_square() {
        let map = OpdMap::new(Array2::zeros((5, 5)));
        assert_eq!(map.coord(0), -1.0);
        assert_eq!(map.coord(4), 1.0);
        assert_eq!(map.coord(2), 0.0);
    }

    #[test]
    fn test_masking_and_rms() {
        let mut data = Array2::from_elem((3, 3), f64::NAN);
        data[(0, 0)] = 3.0;
        data[(1, 1)] = -4.0;
        let map = OpdMap::new(data);
        assert_eq!(map.valid_count(), 2);
        // RMS of {3, -4} is sqrt(25 / 2).
        assert_relative_eq!(map.rms().unwrap(), (12.5f64).sqrt(), max_relative = 1e-12);
        assert_eq!(map.samples().count(), 2);
    }

    #[test]
    fn test_fully_masked_map() {
        let map = OpdMap::new(Array2::from_elem((4, 4), f64::NAN));
        assert_eq!(map.valid_count(), 0);
        assert!(map.rms().is_none());
    }

    #[test]
    fn test_sample_coordinates() {
        let mut data = Array2::from_elem((3, 3), f64::NAN);
        data[(2, 0)] = 1.5;
        let map = OpdMap::new(data);
        let samples: Vec<_> = map.samples().collect();
        assert_eq!(samples, vec![(-1.0, 1.0, 1.5)]);
    }
}
