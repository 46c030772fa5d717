//! Orthonormalised associated Legendre functions.
//!
//! `λ_ℓm(θ)` is the θ-part of the spherical harmonic, `Y_ℓm = λ_ℓm(θ) e^{imφ}`,
//! including the Condon–Shortley phase. Values are produced for all
//! `0 ≤ m ≤ ℓ ≤ ℓ_max` at one colatitude using the standard three-term
//! recurrence in ℓ, seeded from the sectoral terms `λ_mm`.

use std::f64::consts::PI;

use crate::healpix::alm::alm_index;

/// `λ_ℓm` and `dλ_ℓm/dθ` tabulated at a single colatitude.
///
/// Storage follows the [`Alm`](crate::healpix::alm::Alm) ordering so a table
/// can be zipped directly against harmonic coefficients.
#[derive(Debug, Clone)]
pub struct LegendreTable {
    lmax: usize,
    cos_theta: f64,
    sin_theta: f64,
    values: Vec<f64>,
    derivs: Vec<f64>,
}

impl LegendreTable {
    /// Tabulate at colatitude given by `cos_theta` (sinθ is taken non-negative).
    ///
    /// # Panics
    /// If `cos_theta` lies outside `[-1, 1]`.
    pub fn new(lmax: usize, cos_theta: f64) -> Self {
        assert!(
            (-1.0..=1.0).contains(&cos_theta),
            "cos(theta) must lie in [-1, 1], got {cos_theta}"
        );

        let c = cos_theta;
        let s = (1.0 - c * c).max(0.0).sqrt();
        let size = (lmax + 1) * (lmax + 2) / 2;
        let mut values = vec![0.0; size];
        let mut derivs = vec![0.0; size];

        let mut sectoral = 1.0 / (4.0 * PI).sqrt();
        for m in 0..=lmax {
            if m > 0 {
                let mf = m as f64;
                sectoral *= -((2.0 * mf + 1.0) / (2.0 * mf)).sqrt() * s;
            }
            values[alm_index(lmax, m, m)] = sectoral;

            if m < lmax {
                values[alm_index(lmax, m + 1, m)] = (2.0 * m as f64 + 3.0).sqrt() * c * sectoral;
            }

            for l in (m + 2)..=lmax {
                let a_l = recurrence_coefficient(l, m);
                let a_prev = recurrence_coefficient(l - 1, m);
                let lm1 = values[alm_index(lmax, l - 1, m)];
                let lm2 = values[alm_index(lmax, l - 2, m)];
                values[alm_index(lmax, l, m)] = a_l * (c * lm1 - lm2 / a_prev);
            }
        }

        // dλ/dθ from (ℓ cosθ λ_ℓm − b_ℓm λ_ℓ-1,m) / sinθ; undefined exactly at the poles
        if s > 0.0 {
            for m in 0..=lmax {
                for l in m..=lmax {
                    let lf = l as f64;
                    let mf = m as f64;
                    let lower = if l > m {
                        let b = ((2.0 * lf + 1.0) * (lf * lf - mf * mf) / (2.0 * lf - 1.0)).sqrt();
                        b * values[alm_index(lmax, l - 1, m)]
                    } else {
                        0.0
                    };
                    derivs[alm_index(lmax, l, m)] =
                        (lf * c * values[alm_index(lmax, l, m)] - lower) / s;
                }
            }
        }

        Self {
            lmax,
            cos_theta: c,
            sin_theta: s,
            values,
            derivs,
        }
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub fn cos_theta(&self) -> f64 {
        self.cos_theta
    }

    pub fn sin_theta(&self) -> f64 {
        self.sin_theta
    }

    /// `λ_ℓm(θ)`
    pub fn value(&self, l: usize, m: usize) -> f64 {
        self.values[alm_index(self.lmax, l, m)]
    }

    /// `dλ_ℓm/dθ`
    pub fn deriv(&self, l: usize, m: usize) -> f64 {
        self.derivs[alm_index(self.lmax, l, m)]
    }

    /// θ-profile of `ð ð Y_ℓm` for `m` and for `-m`.
    ///
    /// Returns `(R_ℓm, R̃_ℓm)` where `ð ð Y_ℓm = R_ℓm e^{imφ}` and
    /// `ð ð Y*_ℓm = R̃_ℓm e^{-imφ}`. Dividing by `sqrt((ℓ-1)ℓ(ℓ+1)(ℓ+2))`
    /// gives the spin-2 harmonic `₂Y_ℓm`.
    pub fn spin2_profiles(&self, l: usize, m: usize) -> (f64, f64) {
        let c = self.cos_theta;
        let s = self.sin_theta;
        let lf = l as f64;
        let mf = m as f64;
        let lam = self.value(l, m);
        let dlam = self.deriv(l, m);
        let ll1 = lf * (lf + 1.0);

        let plus = -ll1 * lam - 2.0 * (c + mf) * dlam / s + 2.0 * mf * (mf + c) * lam / (s * s);
        let minus = -ll1 * lam - 2.0 * (c - mf) * dlam / s + 2.0 * mf * (mf - c) * lam / (s * s);
        (plus, minus)
    }
}

fn recurrence_coefficient(l: usize, m: usize) -> f64 {
    let lf = l as f64;
    let mf = m as f64;
    ((4.0 * lf * lf - 1.0) / (lf * lf - mf * mf)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_low_order_closed_forms() {
        let theta: f64 = 0.7;
        let (c, s) = (theta.cos(), theta.sin());
        let table = LegendreTable::new(3, c);

        assert_relative_eq!(table.value(0, 0), (1.0 / (4.0 * PI)).sqrt(), epsilon = 1e-14);
        assert_relative_eq!(table.value(1, 0), (3.0 / (4.0 * PI)).sqrt() * c, epsilon = 1e-14);
        assert_relative_eq!(
            table.value(1, 1),
            -(3.0 / (8.0 * PI)).sqrt() * s,
            epsilon = 1e-14
        );
        assert_relative_eq!(
            table.value(2, 0),
            (5.0 / (4.0 * PI)).sqrt() * 0.5 * (3.0 * c * c - 1.0),
            epsilon = 1e-14
        );
        assert_relative_eq!(
            table.value(2, 2),
            0.25 * (15.0 / (2.0 * PI)).sqrt() * s * s,
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        let theta: f64 = 1.1;
        let h = 1e-6;
        let table = LegendreTable::new(8, theta.cos());
        let up = LegendreTable::new(8, (theta + h).cos());
        let down = LegendreTable::new(8, (theta - h).cos());

        for m in 0..=8 {
            for l in m..=8 {
                let numeric = (up.value(l, m) - down.value(l, m)) / (2.0 * h);
                assert_relative_eq!(table.deriv(l, m), numeric, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_spin2_profile_of_quadrupole() {
        // ð ð Y_20 = sqrt(24) ₂Y_20 = sqrt(24 * 15 / 32π) sin²θ
        let theta: f64 = 0.4;
        let table = LegendreTable::new(2, theta.cos());
        let (plus, minus) = table.spin2_profiles(2, 0);
        let expected = (45.0 / (4.0 * PI)).sqrt() * theta.sin().powi(2);

        assert_relative_eq!(plus, expected, epsilon = 1e-12);
        assert_relative_eq!(minus, expected, epsilon = 1e-12);
    }

    #[test]
    #[should_panic(expected = "cos(theta) must lie in [-1, 1]")]
    fn test_rejects_invalid_cosine() {
        LegendreTable::new(2, 1.5);
    }
}
