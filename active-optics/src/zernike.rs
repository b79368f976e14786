//! Zernike polynomial evaluation in the Noll (1976) single-index scheme.
//!
//! Wavefronts and mirror figures are expanded in Zernike polynomials over
//! the unit disk, with coordinates normalized so the pupil (or mirror) outer
//! edge sits at radius 1. Indexing follows Noll's convention: j starts at 1
//! (piston), even j carries the cosine azimuthal term and odd j the sine
//! term, and each polynomial is normalized to unit RMS over the unit disk.
//!
//! Coefficient vectors elsewhere in the crate use a dummy-slot layout where
//! index j holds the Noll-j coefficient and slot 0 is unused; this module
//! works in plain Noll indices.

use nalgebra::DMatrix;

/// Map a Noll index (j >= 1) to the radial degree n and signed azimuthal
/// frequency m. Positive m denotes the cosine term, negative m the sine
/// term.
pub fn noll_to_nm(j: usize) -> (u32, i32) {
    assert!(j >= 1, "Noll indices start at 1");
    let mut n = 0u32;
    let mut j1 = j - 1;
    while j1 > n as usize {
        n += 1;
        j1 -= n as usize;
    }
    let sign = if j % 2 == 0 { 1 } else { -1 };
    let magnitude = (n % 2) + 2 * ((j1 as u32 + (n + 1) % 2) / 2);
    (n, sign * magnitude as i32)
}

fn factorial(k: u32) -> f64 {
    (2..=k).map(|v| v as f64).product()
}

/// Radial polynomial R_n^m(rho) for m >= 0.
fn radial(n: u32, m: u32, rho: f64) -> f64 {
    debug_assert!(m <= n && (n - m) % 2 == 0);
    let mut sum = 0.0;
    for k in 0..=(n - m) / 2 {
        let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
        let coeff = factorial(n - k)
            / (factorial(k) * factorial((n + m) / 2 - k) * factorial((n - m) / 2 - k));
        sum += sign * coeff * rho.powi((n - 2 * k) as i32);
    }
    sum
}

/// Evaluate the Noll-j Zernike polynomial at a point in normalized pupil
/// coordinates. No aperture masking is applied; callers restrict the domain.
pub fn zernike(j: usize, x: f64, y: f64) -> f64 {
    let (n, m) = noll_to_nm(j);
    let rho = (x * x + y * y).sqrt();
    let theta = y.atan2(x);
    let m_abs = m.unsigned_abs();
    let norm = if m == 0 {
        ((n + 1) as f64).sqrt()
    } else {
        (2.0 * (n + 1) as f64).sqrt()
    };
    let azimuthal = if m > 0 {
        (m_abs as f64 * theta).cos()
    } else if m < 0 {
        (m_abs as f64 * theta).sin()
    } else {
        1.0
    };
    norm * radial(n, m_abs, rho) * azimuthal
}

/// Build the least-squares design matrix for Noll terms j = 1..=n_terms,
/// one row per sample point.
pub fn design_matrix(n_terms: usize, points: &[(f64, f64)]) -> DMatrix<f64> {
    let mut matrix = DMatrix::zeros(points.len(), n_terms);
    for (row, &(x, y)) in points.iter().enumerate() {
        for j in 1..=n_terms {
            matrix[(row, j - 1)] = zernike(j, x, y);
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_noll_index_table() {
        // Spot checks against the published Noll ordering.
        assert_eq!(noll_to_nm(1), (0, 0));
        assert_eq!(noll_to_nm(2), (1, 1));
        assert_eq!(noll_to_nm(3), (1, -1));
        assert_eq!(noll_to_nm(4), (2, 0));
        assert_eq!(noll_to_nm(5), (2, -2));
        assert_eq!(noll_to_nm(6), (2, 2));
        assert_eq!(noll_to_nm(7), (3, -1));
        assert_eq!(noll_to_nm(8), (3, 1));
        assert_eq!(noll_to_nm(9), (3, -3));
        assert_eq!(noll_to_nm(10), (3, 3));
        assert_eq!(noll_to_nm(11), (4, 0));
        assert_eq!(noll_to_nm(22), (6, 0));
    }

    #[test]
    #[should_panic(expected = "Noll indices start at 1")]
    fn test_noll_zero_rejected() {
        noll_to_nm(0);
    }

    #[test]
    fn test_low_order_values() {
        // Piston is 1 everywhere.
        assert_relative_eq!(zernike(1, 0.3, -0.7), 1.0, max_relative = 1e-12);
        // Tilts are 2x and 2y.
        assert_relative_eq!(zernike(2, 0.5, 0.0), 1.0, max_relative = 1e-12);
        assert_relative_eq!(zernike(3, 0.0, 0.5), 1.0, max_relative = 1e-12);
        // Defocus at the center is -sqrt(3).
        assert_relative_eq!(zernike(4, 0.0, 0.0), -(3.0f64.sqrt()), max_relative = 1e-12);
        // Astigmatism Z6 = sqrt(6) (x^2 - y^2).
        assert_relative_eq!(
            zernike(6, 0.6, 0.0),
            6.0f64.sqrt() * 0.36,
            max_relative = 1e-12
        );
        // Spherical at the center is +sqrt(5).
        assert_relative_eq!(zernike(11, 0.0, 0.0), 5.0f64.sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn test_unit_rms_over_disk() {
        // Discrete check of Noll normalization: the mean of Z_i * Z_j over a
        // dense uniform sampling of the unit disk approximates the Kronecker
        // delta.
        let n = 201;
        let mut pairs = vec![];
        for (i, j) in [(2, 2), (4, 4), (11, 11), (2, 3), (4, 6), (5, 13)] {
            let mut sum = 0.0;
            let mut count = 0usize;
            for iy in 0..n {
                for ix in 0..n {
                    let x = -1.0 + 2.0 * ix as f64 / (n - 1) as f64;
                    let y = -1.0 + 2.0 * iy as f64 / (n - 1) as f64;
                    if x * x + y * y <= 1.0 {
                        sum += zernike(i, x, y) * zernike(j, x, y);
                        count += 1;
                    }
                }
            }
            pairs.push(((i, j), sum / count as f64));
        }
        for ((i, j), mean) in pairs {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!(
                (mean - expected).abs() < 2e-2,
                "<Z{} Z{}> = {} (expected {})",
                i,
                j,
                mean,
                expected
            );
        }
    }

    #[test]
    fn test_design_matrix_layout() {
        let points = [(0.0, 0.0), (0.5, 0.0), (0.0, 0.5)];
        let matrix = design_matrix(4, &points);
        assert_eq!(matrix.shape(), (3, 4));
        // Column 0 is piston, column 1 is the x tilt.
        assert_relative_eq!(matrix[(0, 0)], 1.0, max_relative = 1e-12);
        assert_relative_eq!(matrix[(1, 1)], 1.0, max_relative = 1e-12);
        assert_relative_eq!(matrix[(2, 2)], 1.0, max_relative = 1e-12);
        assert_relative_eq!(matrix[(0, 3)], -(3.0f64.sqrt()), max_relative = 1e-12);
    }
}
