//! Convergence to shear, and shear applied to galaxies.
//!
//! With the lensing potential `ψ` defined by `κ = ½ ð̄ð ψ` the shear is
//! `γ = ½ ð ð ψ`. In harmonic space this is a pure E-mode with
//!
//! ```text
//! γ_ℓm = f(ℓ) κ_ℓm,    f(ℓ) = sqrt((ℓ+2)(ℓ+1)ℓ(ℓ−1)) / (ℓ(ℓ+1)),   f(0) = f(1) = 0
//! ```
//!
//! synthesised as a spin-2 map `(γ1, γ2)`.

use ndarray::{Array1, ArrayView1};
use rustfft::num_complex::Complex64;
use thiserror::Error;

use crate::healpix::sht::{alm2map_spin2, map2alm_iter};
use crate::healpix::{Alm, Healpix, HealpixError};

/// Errors from shear evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShearError {
    #[error(transparent)]
    Healpix(#[from] HealpixError),
    #[error("lensing maps have mismatched sizes: kappa {kappa}, gamma1 {gamma1}, gamma2 {gamma2}")]
    MapSizes {
        kappa: usize,
        gamma1: usize,
        gamma2: usize,
    },
    #[error("galaxy columns have mismatched lengths: lon {lon}, lat {lat}, eps {eps}")]
    ColumnLengths { lon: usize, lat: usize, eps: usize },
}

/// Two-component shear map on the same grid as the convergence.
#[derive(Debug, Clone, PartialEq)]
pub struct ShearField {
    pub gamma1: Array1<f64>,
    pub gamma2: Array1<f64>,
}

/// Jacobi passes used when analysing a convergence map.
pub const DEFAULT_ANALYSIS_ITERATIONS: usize = 3;

/// Spin-2 operator taking convergence to shear.
#[derive(Debug, Clone)]
pub struct ShearTransform {
    healpix: Healpix,
    lmax: usize,
    kernel: Vec<f64>,
    iterations: usize,
}

impl ShearTransform {
    /// Transform for maps at `healpix` resolution, band-limited to `lmax`.
    pub fn new(healpix: Healpix, lmax: usize) -> Self {
        Self {
            healpix,
            lmax,
            kernel: shear_kernel(lmax),
            iterations: DEFAULT_ANALYSIS_ITERATIONS,
        }
    }

    /// Number of Jacobi passes in the convergence analysis (0 for plain quadrature).
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub fn healpix(&self) -> &Healpix {
        &self.healpix
    }

    /// E-mode shear coefficients from convergence coefficients.
    ///
    /// Monopole and dipole are set to exactly zero regardless of the input.
    pub fn shear_alm(&self, kappa_alm: &Alm) -> Alm {
        let mut alm = kappa_alm.clone();
        if alm.lmax() <= self.lmax {
            alm.scale_by_ell(&self.kernel[..=alm.lmax()]);
        } else {
            alm.scale_by_ell(&shear_kernel(alm.lmax()));
        }
        alm.zero_below(2);
        alm
    }

    /// Shear maps from convergence coefficients.
    pub fn shear_from_alm(&self, kappa_alm: &Alm) -> ShearField {
        let e = self.shear_alm(kappa_alm);
        let (gamma1, gamma2) = alm2map_spin2(&self.healpix, &e, None);
        ShearField { gamma1, gamma2 }
    }

    /// Shear maps from a convergence map.
    pub fn shear_from_convergence(
        &self,
        kappa: ArrayView1<'_, f64>,
    ) -> Result<ShearField, HealpixError> {
        let kappa_alm =
            map2alm_iter(&self.healpix, &kappa.to_vec(), self.lmax, self.iterations)?;
        Ok(self.shear_from_alm(&kappa_alm))
    }
}

/// `f(ℓ)` for ℓ = 0..=lmax.
pub fn shear_kernel(lmax: usize) -> Vec<f64> {
    (0..=lmax)
        .map(|l| {
            if l < 2 {
                0.0
            } else {
                let lf = l as f64;
                ((lf + 2.0) * (lf + 1.0) * lf * (lf - 1.0)).sqrt() / (lf * (lf + 1.0))
            }
        })
        .collect()
}

/// Reduced shear `g = γ / (1 − κ)`.
///
/// Diverges on the critical curve `κ = 1`; the shell maps are assumed to stay
/// well below it.
pub fn reduced_shear(kappa: f64, gamma: Complex64) -> Complex64 {
    gamma / (1.0 - kappa)
}

/// Lensed ellipticity from intrinsic ellipticity and reduced shear.
///
/// ```text
/// ε = (ε_s + g) / (1 + g* ε_s)        |g| ≤ 1
/// ε = (1 + g ε_s*) / (ε_s* + g*)      |g| > 1
/// ```
pub fn lens_ellipticity(eps: Complex64, g: Complex64) -> Complex64 {
    if g.norm_sqr() <= 1.0 {
        (eps + g) / (1.0 + g.conj() * eps)
    } else {
        (1.0 + g * eps.conj()) / (eps.conj() + g.conj())
    }
}

/// Observed ellipticities of galaxies given the lensing maps.
///
/// The lensing fields are read at the pixel containing each galaxy. With
/// `reduced` the full reduced-shear transformation is applied, otherwise the
/// linear approximation `ε + γ`.
///
/// # Arguments
/// * `lon`, `lat` - Galaxy positions in degrees
/// * `eps` - Intrinsic ellipticities
/// * `kappa`, `shear` - Lensing maps at the source redshift
pub fn galaxy_shear(
    healpix: &Healpix,
    lon: &[f64],
    lat: &[f64],
    eps: &[Complex64],
    kappa: ArrayView1<'_, f64>,
    shear: &ShearField,
    reduced: bool,
) -> Result<Vec<Complex64>, ShearError> {
    if kappa.len() != shear.gamma1.len() || kappa.len() != shear.gamma2.len() {
        return Err(ShearError::MapSizes {
            kappa: kappa.len(),
            gamma1: shear.gamma1.len(),
            gamma2: shear.gamma2.len(),
        });
    }
    healpix.check_map_len(kappa.len())?;
    if lon.len() != lat.len() || lon.len() != eps.len() {
        return Err(ShearError::ColumnLengths {
            lon: lon.len(),
            lat: lat.len(),
            eps: eps.len(),
        });
    }

    Ok(lon
        .iter()
        .zip(lat)
        .zip(eps)
        .map(|((&lo, &la), &e)| {
            let pix = healpix.lonlat_to_pix(lo, la);
            let gamma = Complex64::new(shear.gamma1[pix], shear.gamma2[pix]);
            if reduced {
                lens_ellipticity(e, reduced_shear(kappa[pix], gamma))
            } else {
                e + gamma
            }
        })
        .collect())
}
