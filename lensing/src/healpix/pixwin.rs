//! Pixel window function of the HEALPix grid.

use super::Healpix;

/// Approximate pixel window `w_ℓ` for ℓ = 0..=lmax.
///
/// Each pixel is modelled as a spherical cap of the same solid angle, whose
/// normalised Legendre transform is
/// `w_ℓ = (P_{ℓ−1}(x) − P_{ℓ+1}(x)) / ((2ℓ+1)(1−x))`, `x = 1 − Ω_pix / 2π`.
/// A smoothed field picks up a factor `w_ℓ²` in its power spectrum.
pub fn pixel_window(hp: &Healpix, lmax: usize) -> Vec<f64> {
    let x = 1.0 - hp.pixel_area() / (2.0 * std::f64::consts::PI);

    // unnormalised Legendre polynomials P_0..P_{lmax+1}
    let mut p = Vec::with_capacity(lmax + 2);
    p.push(1.0);
    p.push(x);
    for l in 1..=lmax {
        let lf = l as f64;
        let next = ((2.0 * lf + 1.0) * x * p[l] - lf * p[l - 1]) / (lf + 1.0);
        p.push(next);
    }

    (0..=lmax)
        .map(|l| {
            if l == 0 {
                1.0
            } else {
                (p[l - 1] - p[l + 1]) / ((2 * l + 1) as f64 * (1.0 - x))
            }
        })
        .collect()
}
