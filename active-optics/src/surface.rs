//! Mirror surface descriptions used by the telescope prescription.
//!
//! A surface is anything that can report a sag (height along the local
//! optical axis) at a point in the element's local x/y plane. Nominal
//! figures are conics of revolution; perturbations are either gridded
//! height maps (bending-mode residuals) or Zernike expansions.

use crate::zernike;
use ndarray::Array2;
use std::fmt::Debug;

/// Annular clear aperture of a mirror or pupil, radii in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Annulus {
    pub outer: f64,
    pub inner: f64,
}

impl Annulus {
    pub fn new(outer: f64, inner: f64) -> Self {
        assert!(
            outer > inner && inner >= 0.0,
            "annulus radii must satisfy 0 <= inner < outer"
        );
        Self { outer, inner }
    }

    /// Whether a point in local coordinates falls on the clear aperture.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let r = (x * x + y * y).sqrt();
        r >= self.inner && r <= self.outer
    }

    /// Fractional central obscuration (inner radius over outer radius).
    pub fn obscuration(&self) -> f64 {
        self.inner / self.outer
    }
}

/// Height profile of an optical element in its local frame.
pub trait Surface: Debug + Send + Sync {
    /// Sag in meters at local coordinates (x, y), also in meters.
    fn sag(&self, x: f64, y: f64) -> f64;
}

/// Conic of revolution, the standard nominal mirror figure.
#[derive(Debug, Clone, Copy)]
pub struct ConicSurface {
    radius_of_curvature: f64,
    conic: f64,
}

impl ConicSurface {
    pub fn new(radius_of_curvature: f64, conic: f64) -> Self {
        assert!(radius_of_curvature != 0.0);
        Self {
            radius_of_curvature,
            conic,
        }
    }

    pub fn radius_of_curvature(&self) -> f64 {
        self.radius_of_curvature
    }

    pub fn conic(&self) -> f64 {
        self.conic
    }
}

impl Surface for ConicSurface {
    fn sag(&self, x: f64, y: f64) -> f64 {
        // z(r) = r^2 / (R (1 + sqrt(1 - (1 + k) r^2 / R^2)))
        let r2 = x * x + y * y;
        let r_curv = self.radius_of_curvature;
        let root = 1.0 - (1.0 + self.conic) * r2 / (r_curv * r_curv);
        r2 / (r_curv * (1.0 + root.max(0.0).sqrt()))
    }
}

/// Height map sampled on a uniform grid, bilinearly interpolated.
///
/// Rows index y and columns index x. Points outside the gridded footprint
/// report zero sag, so residual maps vanish off the mirror substrate.
#[derive(Debug, Clone)]
pub struct GridSurface {
    x0: f64,
    y0: f64,
    dx: f64,
    dy: f64,
    data: Array2<f64>,
}

impl GridSurface {
    /// Build from monotonically increasing, uniformly spaced coordinate
    /// vectors and a matching (ny, nx) height array.
    pub fn new(x: &[f64], y: &[f64], data: Array2<f64>) -> Self {
        assert!(x.len() >= 2 && y.len() >= 2, "grid needs at least 2x2 samples");
        assert_eq!(data.nrows(), y.len());
        assert_eq!(data.ncols(), x.len());
        Self {
            x0: x[0],
            y0: y[0],
            dx: (x[x.len() - 1] - x[0]) / (x.len() - 1) as f64,
            dy: (y[y.len() - 1] - y[0]) / (y.len() - 1) as f64,
            data,
        }
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }
}

impl Surface for GridSurface {
    fn sag(&self, x: f64, y: f64) -> f64 {
        let fx = (x - self.x0) / self.dx;
        let fy = (y - self.y0) / self.dy;
        let nx = self.data.ncols();
        let ny = self.data.nrows();
        if fx < 0.0 || fy < 0.0 || fx > (nx - 1) as f64 || fy > (ny - 1) as f64 {
            return 0.0;
        }
        let ix = (fx.floor() as usize).min(nx - 2);
        let iy = (fy.floor() as usize).min(ny - 2);
        let tx = fx - ix as f64;
        let ty = fy - iy as f64;
        let z00 = self.data[(iy, ix)];
        let z01 = self.data[(iy, ix + 1)];
        let z10 = self.data[(iy + 1, ix)];
        let z11 = self.data[(iy + 1, ix + 1)];
        (1.0 - ty) * ((1.0 - tx) * z00 + tx * z01) + ty * ((1.0 - tx) * z10 + tx * z11)
    }
}

/// Zernike figure over an annular aperture.
///
/// Coefficients use the dummy-slot layout: index j is the Noll-j
/// coefficient in meters and slot 0 is ignored. Coordinates are normalized
/// by the outer radius before evaluation; points off the aperture report
/// zero sag.
#[derive(Debug, Clone)]
pub struct ZernikeSurface {
    coeffs: Vec<f64>,
    aperture: Annulus,
}

impl ZernikeSurface {
    pub fn new(coeffs: Vec<f64>, aperture: Annulus) -> Self {
        assert!(coeffs.len() >= 2, "need at least one Noll term past the dummy slot");
        Self { coeffs, aperture }
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }
}

impl Surface for ZernikeSurface {
    fn sag(&self, x: f64, y: f64) -> f64 {
        if !self.aperture.contains(x, y) {
            return 0.0;
        }
        let u = x / self.aperture.outer;
        let v = y / self.aperture.outer;
        self.coeffs
            .iter()
            .enumerate()
            .skip(1)
            .map(|(j, c)| c * zernike::zernike(j, u, v))
            .sum()
    }
}
