//! Uniformly distributed galaxies with Gaussian shape noise.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

use crate::catalogue::{ellipticity_gaussian, Galaxy};
use crate::pipeline::GalaxySource;
use crate::shells::ShellWindow;

/// Solid angle of the full sky in square arcminutes.
pub fn full_sky_arcmin2() -> f64 {
    let arcmin_per_rad = 180.0 * 60.0 / PI;
    4.0 * PI * arcmin_per_rad * arcmin_per_rad
}

/// Poisson-sampled galaxies, uniform on the sky and in redshift within each shell.
#[derive(Debug, Clone)]
pub struct UniformGalaxies {
    density: f64,
    sigma_e: f64,
    zmin: f64,
    rng: StdRng,
}

impl UniformGalaxies {
    /// # Arguments
    /// * `density` - Mean galaxies per square arcminute per shell
    /// * `sigma_e` - Intrinsic ellipticity scatter per component
    /// * `seed` - RNG seed
    ///
    /// # Panics
    /// If `density` is negative or not finite.
    pub fn new(density: f64, sigma_e: f64, seed: u64) -> Self {
        assert!(
            density.is_finite() && density >= 0.0,
            "galaxy density must be non-negative, got {density}"
        );
        Self {
            density,
            sigma_e,
            zmin: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Only shells reaching beyond `zmin` host galaxies.
    pub fn from_redshift(mut self, zmin: f64) -> Self {
        self.zmin = zmin;
        self
    }

    /// Mean number of galaxies drawn for `window`.
    pub fn expected_count(&self, window: &ShellWindow) -> f64 {
        if window.upper() <= self.zmin {
            0.0
        } else {
            self.density * full_sky_arcmin2()
        }
    }
}

impl GalaxySource for UniformGalaxies {
    fn galaxies(&mut self, window: &ShellWindow) -> Vec<Galaxy> {
        let mean = self.expected_count(window);
        if mean <= 0.0 {
            return Vec::new();
        }
        let count = match Poisson::new(mean) {
            Ok(poisson) => {
                let draw: f64 = poisson.sample(&mut self.rng);
                draw as usize
            }
            Err(_) => return Vec::new(),
        };

        let eps = ellipticity_gaussian(count, self.sigma_e, &mut self.rng);
        let (lower, upper) = (window.lower(), window.upper());
        eps.into_iter()
            .map(|eps| {
                let lon = self.rng.gen_range(0.0..360.0);
                let lat = self.rng.gen_range(-1.0_f64..=1.0).asin().to_degrees();
                let z = self.rng.gen_range(lower..upper);
                Galaxy { lon, lat, z, eps }
            })
            .collect()
    }
}
