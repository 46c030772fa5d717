//! Gaussian (and shifted lognormal) random contrast maps.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rustfft::num_complex::Complex64;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

use crate::healpix::sht::alm2map;
use crate::healpix::{Alm, Healpix};
use crate::pipeline::ContrastSource;
use crate::shells::ShellWindow;

/// `C_ℓ = amplitude · (ℓ / 2)^slope` for ℓ ≥ 2, zero below.
pub fn power_law_cl(lmax: usize, amplitude: f64, slope: f64) -> Vec<f64> {
    (0..=lmax)
        .map(|l| {
            if l < 2 {
                0.0
            } else {
                amplitude * (l as f64 / 2.0).powf(slope)
            }
        })
        .collect()
}

/// Draw harmonic coefficients of a Gaussian random field with spectrum `cl`.
///
/// `a_ℓ0` is real with variance `C_ℓ`; for m > 0 the real and imaginary parts
/// each carry `C_ℓ / 2`. Negative entries of `cl` are treated as zero.
///
/// # Panics
/// If `cl` is empty.
pub fn gaussian_alm<R: Rng + ?Sized>(cl: &[f64], rng: &mut R) -> Alm {
    assert!(!cl.is_empty(), "spectrum must have at least one entry");
    let lmax = cl.len() - 1;
    let mut alm = Alm::zeros(lmax);

    for m in 0..=lmax {
        for l in m..=lmax {
            let amp = cl[l].max(0.0).sqrt();
            let re: f64 = rng.sample(StandardNormal);
            let value = if m == 0 {
                Complex64::new(amp * re, 0.0)
            } else {
                let im: f64 = rng.sample(StandardNormal);
                Complex64::new(re, im) * (amp * FRAC_1_SQRT_2)
            };
            alm.set(l, m, value);
        }
    }
    alm
}

/// Fresh Gaussian contrast map for every shell, all with the same spectrum.
#[derive(Debug, Clone)]
pub struct GaussianContrast {
    healpix: Healpix,
    cl: Vec<f64>,
    rng: StdRng,
    lognormal_shift: Option<f64>,
}

impl GaussianContrast {
    pub fn new(healpix: Healpix, cl: Vec<f64>, seed: u64) -> Self {
        Self {
            healpix,
            cl,
            rng: StdRng::seed_from_u64(seed),
            lognormal_shift: None,
        }
    }

    /// Map each Gaussian field `x` to `λ (exp(x/λ − σ²/2λ²) − 1)`.
    ///
    /// The result keeps zero mean and is bounded below by `−λ`.
    ///
    /// # Panics
    /// If `shift` is not positive.
    pub fn lognormal(mut self, shift: f64) -> Self {
        assert!(shift > 0.0, "lognormal shift must be positive, got {shift}");
        self.lognormal_shift = Some(shift);
        self
    }

    /// Pixel variance of the Gaussian field, `Σ (2ℓ+1) C_ℓ / 4π`.
    pub fn variance(&self) -> f64 {
        self.cl
            .iter()
            .enumerate()
            .map(|(l, c)| (2 * l + 1) as f64 * c.max(0.0))
            .sum::<f64>()
            / (4.0 * PI)
    }

    pub fn cl(&self) -> &[f64] {
        &self.cl
    }
}

impl ContrastSource for GaussianContrast {
    fn contrast(&mut self, _window: &ShellWindow) -> Array1<f64> {
        let alm = gaussian_alm(&self.cl, &mut self.rng);
        let gaussian = alm2map(&self.healpix, &alm);

        match self.lognormal_shift {
            None => gaussian,
            Some(shift) => {
                let half_var = 0.5 * self.variance() / (shift * shift);
                gaussian.mapv(|x| shift * ((x / shift - half_var).exp() - 1.0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healpix::alm::alm2cl;
    use crate::shells::tophat_windows;

    #[test]
    fn test_power_law_shape() {
        let cl = power_law_cl(6, 1e-3, -2.0);
        assert_eq!(cl[0], 0.0);
        assert_eq!(cl[1], 0.0);
        assert_eq!(cl[2], 1e-3);
        assert!((cl[4] - 0.25e-3).abs() < 1e-15);
    }

    #[test]
    fn test_alm_spectrum_averages_to_input() {
        let lmax = 32;
        let cl = power_law_cl(lmax, 1.0, 0.0);
        let mut rng = StdRng::seed_from_u64(17);

        let trials = 40;
        let mut mean = vec![0.0; lmax + 1];
        for _ in 0..trials {
            for (m, c) in mean.iter_mut().zip(alm2cl(&gaussian_alm(&cl, &mut rng))) {
                *m += c / trials as f64;
            }
        }
        // average over ℓ = 20..=32 has roughly 1% scatter
        let band: f64 = mean[20..].iter().sum::<f64>() / 13.0;
        assert!((band - 1.0).abs() < 0.05, "band power {band}");
        assert_eq!(mean[0], 0.0);
    }

    #[test]
    fn test_same_seed_same_maps() {
        let hp = Healpix::new(4).unwrap();
        let window = &tophat_windows(&[0.0, 1.0], 0.1).unwrap()[0];
        let cl = power_law_cl(8, 1e-2, -1.0);
        let mut a = GaussianContrast::new(hp, cl.clone(), 5);
        let mut b = GaussianContrast::new(hp, cl, 5);

        let first = a.contrast(window);
        assert_eq!(first, b.contrast(window));
        assert_eq!(first.len(), hp.npix());
        assert_ne!(first, a.contrast(window));
    }

    #[test]
    fn test_lognormal_bounded_below() {
        let hp = Healpix::new(8).unwrap();
        let window = &tophat_windows(&[0.0, 1.0], 0.1).unwrap()[0];
        let mut source = GaussianContrast::new(hp, power_law_cl(16, 0.5, -1.0), 3).lognormal(1.0);
        let delta = source.contrast(window);
        assert!(delta.iter().all(|d| *d > -1.0));
    }

    #[test]
    #[should_panic(expected = "lognormal shift must be positive")]
    fn test_rejects_zero_shift() {
        let hp = Healpix::new(1).unwrap();
        GaussianContrast::new(hp, vec![0.0; 3], 0).lognormal(0.0);
    }
}
