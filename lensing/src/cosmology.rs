//! Background cosmology needed by the lensing integrator.
//!
//! Distances are dimensionless, in units of the Hubble distance `c/H0`, so the
//! lensing prefactor reduces to `3 Ω_m / 2` without any reference to `H0`.

use serde::{Deserialize, Serialize};

use crate::algo::quadrature::simpson;

/// Background expansion history.
pub trait Cosmology {
    /// Matter density parameter today.
    fn omega_m(&self) -> f64;

    /// Dimensionless Hubble rate `E(z) = H(z)/H0`.
    fn ef(&self, z: f64) -> f64;

    /// Transverse comoving distance to redshift `z` in Hubble units.
    fn xm(&self, z: f64) -> f64;

    /// Transverse comoving distance between `z1` and `z2` in Hubble units.
    ///
    /// The default is only correct for spatially flat models.
    fn xm_between(&self, z1: f64, z2: f64) -> f64 {
        self.xm(z2) - self.xm(z1)
    }
}

/// Spatially flat ΛCDM with negligible radiation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatLambdaCdm {
    pub omega_m: f64,
}

/// Redshift step used to pick the number of Simpson panels.
const DISTANCE_STEP: f64 = 1e-3;

impl FlatLambdaCdm {
    /// # Panics
    /// If `omega_m` is outside `(0, 1]`.
    pub fn new(omega_m: f64) -> Self {
        assert!(
            omega_m > 0.0 && omega_m <= 1.0,
            "omega_m must lie in (0, 1], got {omega_m}"
        );
        Self { omega_m }
    }
}

impl Default for FlatLambdaCdm {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl Cosmology for FlatLambdaCdm {
    fn omega_m(&self) -> f64 {
        self.omega_m
    }

    fn ef(&self, z: f64) -> f64 {
        let a3 = (1.0 + z).powi(3);
        (self.omega_m * a3 + (1.0 - self.omega_m)).sqrt()
    }

    fn xm(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        let panels = ((z / DISTANCE_STEP).ceil() as usize).max(1);
        simpson(|zp| 1.0 / self.ef(zp), 0.0, z, 2 * panels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_einstein_de_sitter_distance() {
        let eds = FlatLambdaCdm::new(1.0);
        for z in [0.1, 0.5, 1.0, 3.0] {
            let expected = 2.0 * (1.0 - 1.0 / (1.0_f64 + z).sqrt());
            assert_relative_eq!(eds.xm(z), expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_distance_is_monotonic_and_zero_at_origin() {
        let cosmo = FlatLambdaCdm::default();
        assert_eq!(cosmo.xm(0.0), 0.0);
        let mut last = 0.0;
        for i in 1..20 {
            let x = cosmo.xm(i as f64 * 0.1);
            assert!(x > last);
            last = x;
        }
        assert_relative_eq!(cosmo.xm_between(0.5, 1.0), cosmo.xm(1.0) - cosmo.xm(0.5));
    }

    #[test]
    fn test_hubble_rate_today_is_one() {
        assert_relative_eq!(FlatLambdaCdm::new(0.25).ef(0.0), 1.0);
    }

    #[test]
    #[should_panic(expected = "omega_m must lie in (0, 1]")]
    fn test_rejects_unphysical_matter_density() {
        FlatLambdaCdm::new(0.0);
    }
}
