//! Cumulative convergence from a stream of matter shells (Born approximation).
//!
//! In the thin-lens discretisation every shell `i` is collapsed onto a lens
//! plane at comoving distance `x_i` (its effective redshift) and the
//! convergence of a source at distance `x_s` is
//!
//! ```text
//! κ(x_s) = Σ_i A_i δ_i x_i (x_s − x_i) / x_s
//!        = Σ_i c_i − (Σ_i c_i x_i) / x_s,        c_i = A_i x_i δ_i
//! A_i    = 3/2 Ω_m (1 + z_i) / E(z_i) · N_i
//! ```
//!
//! with `N_i` the window normalization. The second form shows that only two
//! running totals per pixel are needed, `s0 = Σ c_i` and `s1 = Σ c_i x_i`, no
//! matter how many shells have been seen. [`ConvergenceAccumulator`] keeps
//! exactly those and evaluates κ at the upper edge of the latest shell.
//! [`born_direct`] recomputes the same sum from scratch and exists to check
//! the running form.

use log::{debug, info};
use ndarray::{Array1, ArrayView1, Zip};
use thiserror::Error;

use crate::cosmology::Cosmology;
use crate::healpix::Healpix;
use crate::shells::ShellWindow;

/// Errors raised while feeding shells to the accumulator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvergenceError {
    #[error(
        "shell {index} is out of order: {quantity} distance {current} precedes {previous}"
    )]
    OrderingViolation {
        index: usize,
        quantity: &'static str,
        previous: f64,
        current: f64,
    },
    #[error("contrast map has {actual} pixels, expected {expected}")]
    ResolutionMismatch { expected: usize, actual: usize },
    #[error("shell {index} has non-positive source distance at z = {redshift}")]
    InvalidSourcePlane { index: usize, redshift: f64 },
    #[error("shell {index} has non-finite {quantity} distance {value} at z = {redshift}")]
    NonFiniteDistance {
        index: usize,
        quantity: &'static str,
        redshift: f64,
        value: f64,
    },
}

/// Lensing weight `A_i` of a shell, excluding the distance factors.
pub fn lens_weight<C: Cosmology>(cosmo: &C, window: &ShellWindow) -> f64 {
    let z = window.zeff();
    1.5 * cosmo.omega_m() * (1.0 + z) / cosmo.ef(z) * window.normalization()
}

/// Running Born integral over an ordered stream of shells.
///
/// The accumulator is created for one resolution and fed shells front to back.
/// It cannot be rewound: [`finalize`](Self::finalize) consumes it.
#[derive(Debug, Clone)]
pub struct ConvergenceAccumulator<C: Cosmology> {
    cosmo: C,
    healpix: Healpix,
    /// Σ c_i per pixel
    s0: Array1<f64>,
    /// Σ c_i x_i per pixel
    s1: Array1<f64>,
    kappa: Array1<f64>,
    delta: Array1<f64>,
    lens_distance: f64,
    source_distance: f64,
    source_redshift: f64,
    shells: usize,
}

impl<C: Cosmology> ConvergenceAccumulator<C> {
    pub fn new(cosmo: C, healpix: Healpix) -> Self {
        let npix = healpix.npix();
        Self {
            cosmo,
            healpix,
            s0: Array1::zeros(npix),
            s1: Array1::zeros(npix),
            kappa: Array1::zeros(npix),
            delta: Array1::zeros(npix),
            lens_distance: 0.0,
            source_distance: 0.0,
            source_redshift: 0.0,
            shells: 0,
        }
    }

    /// Advance the integral by one shell.
    ///
    /// # Arguments
    /// * `delta` - Density contrast of the shell, one value per pixel
    /// * `window` - Window of the shell; shells must arrive with non-decreasing
    ///   lens-plane and source-plane distances
    ///
    /// On error the state is left untouched.
    pub fn add_window(
        &mut self,
        delta: ArrayView1<f64>,
        window: &ShellWindow,
    ) -> Result<(), ConvergenceError> {
        let expected = self.healpix.npix();
        if delta.len() != expected {
            return Err(ConvergenceError::ResolutionMismatch {
                expected,
                actual: delta.len(),
            });
        }

        let index = self.shells;
        let x_lens = self.cosmo.xm(window.zeff());
        let x_src = self.cosmo.xm(window.upper());

        for (quantity, redshift, value) in [
            ("lens", window.zeff(), x_lens),
            ("source", window.upper(), x_src),
        ] {
            if !value.is_finite() {
                return Err(ConvergenceError::NonFiniteDistance {
                    index,
                    quantity,
                    redshift,
                    value,
                });
            }
        }
        if x_src <= 0.0 {
            return Err(ConvergenceError::InvalidSourcePlane {
                index,
                redshift: window.upper(),
            });
        }
        if index > 0 {
            if x_lens < self.lens_distance {
                return Err(ConvergenceError::OrderingViolation {
                    index,
                    quantity: "lens",
                    previous: self.lens_distance,
                    current: x_lens,
                });
            }
            if x_src < self.source_distance {
                return Err(ConvergenceError::OrderingViolation {
                    index,
                    quantity: "source",
                    previous: self.source_distance,
                    current: x_src,
                });
            }
        }

        let weight = lens_weight(&self.cosmo, window) * x_lens;
        let inv_src = 1.0 / x_src;

        Zip::from(&mut self.s0)
            .and(&mut self.s1)
            .and(&mut self.kappa)
            .and(&delta)
            .for_each(|s0, s1, kappa, &d| {
                let c = weight * d;
                *s0 += c;
                *s1 += c * x_lens;
                *kappa = *s0 - *s1 * inv_src;
            });

        debug!(
            "shell {index}: zeff={:.4} zsrc={:.4} x_lens={:.5} x_src={:.5} weight={:.5e}",
            window.zeff(),
            window.upper(),
            x_lens,
            x_src,
            weight
        );

        self.delta.assign(&delta);
        self.lens_distance = x_lens;
        self.source_distance = x_src;
        self.source_redshift = window.upper();
        self.shells += 1;
        Ok(())
    }

    /// Current cumulative convergence at [`source_redshift`](Self::source_redshift).
    pub fn kappa(&self) -> ArrayView1<'_, f64> {
        self.kappa.view()
    }

    /// Contrast of the most recent shell.
    pub fn delta(&self) -> ArrayView1<'_, f64> {
        self.delta.view()
    }

    /// Source redshift of the current convergence, zero before the first shell.
    pub fn source_redshift(&self) -> f64 {
        self.source_redshift
    }

    pub fn shells_seen(&self) -> usize {
        self.shells
    }

    pub fn healpix(&self) -> &Healpix {
        &self.healpix
    }

    pub fn cosmology(&self) -> &C {
        &self.cosmo
    }

    /// Close the stream and hand out the final convergence map.
    pub fn finalize(self) -> ConvergenceMap {
        info!(
            "convergence finalized after {} shells at z_src={:.4}",
            self.shells, self.source_redshift
        );
        ConvergenceMap {
            kappa: self.kappa,
            source_redshift: self.source_redshift,
            shells: self.shells,
        }
    }
}

/// Convergence of a finished shell stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceMap {
    pub kappa: Array1<f64>,
    pub source_redshift: f64,
    pub shells: usize,
}

/// Born sum for `shells` recomputed from scratch at the upper edge of the last shell.
///
/// Costs O(shells) per call, so evaluating every prefix of a stream is
/// O(shells²). Returns `None` for an empty stream.
pub fn born_direct<C: Cosmology>(
    cosmo: &C,
    shells: &[(ArrayView1<f64>, &ShellWindow)],
) -> Option<Array1<f64>> {
    let (_, last) = shells.last()?;
    let x_src = cosmo.xm(last.upper());
    let mut kappa = Array1::zeros(shells[0].0.len());

    for (delta, window) in shells {
        let x = cosmo.xm(window.zeff());
        let factor = lens_weight(cosmo, window) * x * (x_src - x) / x_src;
        kappa.scaled_add(factor, delta);
    }
    Some(kappa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmology::FlatLambdaCdm;
    use crate::shells::{linear_windows, tophat_windows};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn nside2() -> Healpix {
        Healpix::new(2).unwrap()
    }

    #[test]
    fn test_constant_shells_give_uniform_increasing_kappa() {
        let windows = tophat_windows(&[0.0, 1.0, 2.0, 3.0], 0.01).unwrap();
        let hp = nside2();
        let mut acc = ConvergenceAccumulator::new(FlatLambdaCdm::default(), hp);

        let mut previous = 0.0;
        for (window, contrast) in windows.iter().zip([0.1, 0.2, 0.3]) {
            assert_relative_eq!(window.normalization(), 1.0, epsilon = 1e-12);
            let delta = Array1::from_elem(hp.npix(), contrast);
            acc.add_window(delta.view(), window).unwrap();

            let kappa = acc.kappa();
            let first = kappa[0];
            for &value in kappa.iter() {
                assert_eq!(value, first);
            }
            assert!(first.abs() > previous, "{} <= {}", first.abs(), previous);
            previous = first.abs();
        }
        assert_eq!(acc.shells_seen(), 3);
        assert_relative_eq!(acc.source_redshift(), 3.0);
    }

    #[test]
    fn test_running_sum_matches_direct_recomputation() {
        let cosmo = FlatLambdaCdm::new(0.3);
        let hp = nside2();
        let windows = linear_windows(&[0.0, 0.2, 0.5, 0.7, 1.0, 1.4, 2.0], 0.01).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let deltas: Vec<Array1<f64>> = windows
            .iter()
            .map(|_| Array1::from_shape_fn(hp.npix(), |_| rng.gen_range(-1.0..3.0)))
            .collect();

        let mut acc = ConvergenceAccumulator::new(cosmo, hp);
        for k in 0..windows.len() {
            acc.add_window(deltas[k].view(), &windows[k]).unwrap();

            let prefix: Vec<(ArrayView1<f64>, &ShellWindow)> = deltas[..=k]
                .iter()
                .zip(&windows[..=k])
                .map(|(d, w)| (d.view(), w))
                .collect();
            let direct = born_direct(&cosmo, &prefix).unwrap();

            for (a, b) in acc.kappa().iter().zip(direct.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-12, max_relative = 1e-10);
            }
        }
    }

    #[test]
    fn test_out_of_order_shell_is_rejected_without_mutation() {
        let windows = tophat_windows(&[0.0, 0.5, 1.0], 0.01).unwrap();
        let hp = nside2();
        let delta = Array1::from_elem(hp.npix(), 1.0);
        let mut acc = ConvergenceAccumulator::new(FlatLambdaCdm::default(), hp);

        acc.add_window(delta.view(), &windows[1]).unwrap();
        let before = acc.kappa().to_owned();

        let err = acc.add_window(delta.view(), &windows[0]).unwrap_err();
        assert!(matches!(
            err,
            ConvergenceError::OrderingViolation {
                index: 1,
                quantity: "lens",
                ..
            }
        ));
        assert_eq!(acc.kappa(), before.view());
        assert_eq!(acc.shells_seen(), 1);
    }

    /// Flat model whose distances blow up beyond `zmax`.
    struct Truncated {
        inner: FlatLambdaCdm,
        zmax: f64,
    }

    impl Cosmology for Truncated {
        fn omega_m(&self) -> f64 {
            self.inner.omega_m()
        }

        fn ef(&self, z: f64) -> f64 {
            self.inner.ef(z)
        }

        fn xm(&self, z: f64) -> f64 {
            if z > self.zmax {
                f64::NAN
            } else {
                self.inner.xm(z)
            }
        }
    }

    #[test]
    fn test_non_finite_distance_is_rejected_without_mutation() {
        let windows = tophat_windows(&[0.0, 0.5, 1.0, 1.5], 0.01).unwrap();
        let hp = nside2();
        let delta = Array1::from_elem(hp.npix(), 0.4);
        let cosmo = Truncated {
            inner: FlatLambdaCdm::default(),
            zmax: 0.6,
        };
        let mut acc = ConvergenceAccumulator::new(cosmo, hp);

        acc.add_window(delta.view(), &windows[0]).unwrap();
        let before = acc.kappa().to_owned();

        // lens plane at 0.75 is past the cutoff
        let err = acc.add_window(delta.view(), &windows[1]).unwrap_err();
        assert!(matches!(
            err,
            ConvergenceError::NonFiniteDistance {
                index: 1,
                quantity: "lens",
                ..
            }
        ));
        assert_eq!(acc.kappa(), before.view());
        assert!(acc.kappa().iter().all(|k| k.is_finite()));
        assert_eq!(acc.shells_seen(), 1);
        assert_relative_eq!(acc.source_redshift(), 0.5);
    }

    #[test]
    fn test_resolution_mismatch() {
        let windows = tophat_windows(&[0.0, 0.5], 0.01).unwrap();
        let mut acc = ConvergenceAccumulator::new(FlatLambdaCdm::default(), nside2());
        let delta = Array1::zeros(12);

        assert_eq!(
            acc.add_window(delta.view(), &windows[0]),
            Err(ConvergenceError::ResolutionMismatch {
                expected: 48,
                actual: 12
            })
        );
    }

    #[test]
    fn test_finalize_keeps_last_state() {
        let windows = tophat_windows(&[0.0, 0.5, 1.0], 0.01).unwrap();
        let hp = nside2();
        let delta = Array1::from_elem(hp.npix(), 0.5);
        let mut acc = ConvergenceAccumulator::new(FlatLambdaCdm::default(), hp);
        for w in &windows {
            acc.add_window(delta.view(), w).unwrap();
        }
        let expected = acc.kappa().to_owned();

        assert_eq!(acc.delta(), delta.view());
        let map = acc.finalize();

        assert_eq!(map.kappa, expected);
        assert_eq!(map.shells, 2);
        assert_relative_eq!(map.source_redshift, 1.0);
    }

    #[test]
    fn test_born_direct_empty() {
        assert!(born_direct(&FlatLambdaCdm::default(), &[]).is_none());
    }
}
