//! Angular power spectra and their comparison against theory.
//!
//! A spectrum measured from a pixelized catalogue differs from the theory
//! spectrum of the underlying field in three ways:
//!
//! - additive shot noise from the finite number of points per pixel
//! - mode mixing from sampling the field at discrete random positions
//! - smoothing by the pixel window
//!
//! [`SpectrumValidator`] removes the first and applies the other two to the
//! theory, so that `observed − N_ℓ` can be compared with `M · (w_ℓ² C_ℓ)`.
//! Monopole and dipole carry no information here and are zero throughout.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use log::debug;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest multipole with physical content.
pub const LMIN: usize = 2;

/// Errors from spectrum bookkeeping and validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpectrumError {
    #[error("{what} has length {actual}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("spectrum {name} has nonzero value {value} at ell = {ell}")]
    DegenerateSpectrum {
        name: String,
        ell: usize,
        value: f64,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

fn check_len(what: &'static str, values: &[f64], lmax: usize) -> Result<(), SpectrumError> {
    if values.len() != lmax + 1 {
        return Err(SpectrumError::LengthMismatch {
            what,
            expected: lmax + 1,
            actual: values.len(),
        });
    }
    Ok(())
}

/// Set `C_0` and `C_1` to zero.
pub fn zero_low_ell(values: &mut [f64]) {
    for v in values.iter_mut().take(LMIN) {
        *v = 0.0;
    }
}

/// Named spectra for ℓ = 0..=lmax, one per field combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSet {
    lmax: usize,
    spectra: BTreeMap<String, Vec<f64>>,
}

impl SpectrumSet {
    pub fn new(lmax: usize) -> Self {
        Self {
            lmax,
            spectra: BTreeMap::new(),
        }
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    /// Add a spectrum; the ℓ < 2 entries must already be zero.
    pub fn insert(&mut self, name: &str, values: Vec<f64>) -> Result<(), SpectrumError> {
        check_len("spectrum", &values, self.lmax)?;
        if let Some((ell, &value)) = values.iter().enumerate().take(LMIN).find(|(_, v)| **v != 0.0)
        {
            return Err(SpectrumError::DegenerateSpectrum {
                name: name.to_string(),
                ell,
                value,
            });
        }
        self.spectra.insert(name.to_string(), values);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.spectra.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.spectra.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.spectra.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

/// Shot noise of a pixelized point sample.
///
/// # Arguments
/// * `lmax` - Highest multipole
/// * `expected_per_pixel` - Mean number of points per pixel, `n̄`
/// * `npix` - Number of pixels
/// * `sigma` - Scatter of the value carried by each point (per component for
///   complex values)
///
/// # Returns
/// `N_ℓ = 4π σ² / (npix · n̄)` for ℓ ≥ 2, zero below.
pub fn shot_noise(
    lmax: usize,
    expected_per_pixel: f64,
    npix: usize,
    sigma: f64,
) -> Result<Vec<f64>, SpectrumError> {
    if !(expected_per_pixel > 0.0 && expected_per_pixel.is_finite()) {
        return Err(SpectrumError::InvalidParameter(format!(
            "expected count per pixel must be positive, got {expected_per_pixel}"
        )));
    }
    if npix == 0 {
        return Err(SpectrumError::InvalidParameter(
            "pixel count must be positive".to_string(),
        ));
    }

    let level = 4.0 * PI * sigma * sigma / (npix as f64 * expected_per_pixel);
    Ok((0..=lmax)
        .map(|l| if l < LMIN { 0.0 } else { level })
        .collect())
}

/// Spin of the sampled field, which sets how its variance splits across modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Spin {
    Zero,
    Two,
}

/// Dense `(lmax+1)²` coupling between theory and observed multipoles.
#[derive(Debug, Clone, PartialEq)]
pub struct MixingMatrix {
    matrix: Array2<f64>,
}

impl MixingMatrix {
    /// No mixing; ℓ < 2 rows and columns are still zero.
    pub fn identity(lmax: usize) -> Self {
        let mut matrix = Array2::eye(lmax + 1);
        for l in 0..LMIN.min(lmax + 1) {
            matrix[[l, l]] = 0.0;
        }
        Self { matrix }
    }

    /// Mixing from sampling a field at `total_points` uniformly random positions.
    ///
    /// Every point sees the full field variance, so power leaks from every
    /// multipole into a flat floor:
    ///
    /// ```text
    /// M_ℓℓ' = (1 − 1/N) δ_ℓℓ' + c(ℓ') / N
    /// c(ℓ') = 2ℓ' + 1        spin 0
    /// c(ℓ') = ℓ' + 1/2       spin 2
    /// ```
    ///
    /// Fails with `InvalidParameter` unless `total_points` is greater than one.
    pub fn uniform_sampling(
        lmax: usize,
        total_points: f64,
        spin: Spin,
    ) -> Result<Self, SpectrumError> {
        if !(total_points > 1.0) {
            return Err(SpectrumError::InvalidParameter(format!(
                "uniform sampling needs more than one point, got {total_points}"
            )));
        }

        let n = lmax + 1;
        let diagonal = 1.0 - 1.0 / total_points;
        let matrix = Array2::from_shape_fn((n, n), |(l, lp)| {
            if l < LMIN || lp < LMIN {
                return 0.0;
            }
            let column = match spin {
                Spin::Zero => (2 * lp + 1) as f64,
                Spin::Two => lp as f64 + 0.5,
            } / total_points;
            if l == lp {
                diagonal + column
            } else {
                column
            }
        });
        Ok(Self { matrix })
    }

    /// Wrap an explicit matrix, zeroing the ℓ < 2 rows and columns.
    pub fn from_array(mut matrix: Array2<f64>) -> Result<Self, SpectrumError> {
        let (rows, cols) = matrix.dim();
        if rows != cols || rows == 0 {
            return Err(SpectrumError::InvalidParameter(format!(
                "mixing matrix must be square and non-empty, got {rows}x{cols}"
            )));
        }
        for l in 0..LMIN.min(rows) {
            matrix.row_mut(l).fill(0.0);
            matrix.column_mut(l).fill(0.0);
        }
        Ok(Self { matrix })
    }

    pub fn lmax(&self) -> usize {
        self.matrix.nrows() - 1
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// `M · cl`.
    pub fn apply(&self, cl: &[f64]) -> Result<Vec<f64>, SpectrumError> {
        check_len("spectrum", cl, self.lmax())?;
        Ok(self.matrix.dot(&Array1::from_vec(cl.to_vec())).to_vec())
    }
}

/// Result of comparing a measured spectrum with theory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ell: Vec<usize>,
    pub debiased: Vec<f64>,
    pub expected: Vec<f64>,
    /// `(debiased − expected) / expected`, zero where `expected` vanishes
    pub relative_residual: Vec<f64>,
    /// Largest `|relative_residual|` over ℓ ≥ 2
    pub max_abs_relative: f64,
}

impl ValidationReport {
    pub fn within(&self, tolerance: f64) -> bool {
        self.max_abs_relative <= tolerance
    }
}

/// Shot-noise subtraction and mixing correction for one spectrum.
#[derive(Debug, Clone)]
pub struct SpectrumValidator {
    noise: Vec<f64>,
    mixing: MixingMatrix,
    pixel_window: Option<Vec<f64>>,
}

impl SpectrumValidator {
    pub fn new(noise: Vec<f64>, mixing: MixingMatrix) -> Result<Self, SpectrumError> {
        check_len("shot noise", &noise, mixing.lmax())?;
        Ok(Self {
            noise,
            mixing,
            pixel_window: None,
        })
    }

    /// Apply `w_ℓ²` to the theory before mixing.
    pub fn with_pixel_window(mut self, window: Vec<f64>) -> Result<Self, SpectrumError> {
        check_len("pixel window", &window, self.lmax())?;
        self.pixel_window = Some(window);
        Ok(self)
    }

    pub fn lmax(&self) -> usize {
        self.mixing.lmax()
    }

    pub fn noise(&self) -> &[f64] {
        &self.noise
    }

    pub fn mixing(&self) -> &MixingMatrix {
        &self.mixing
    }

    /// `observed − N_ℓ` with ℓ < 2 set to zero.
    pub fn debias(&self, observed: &[f64]) -> Result<Vec<f64>, SpectrumError> {
        debias(observed, &self.noise)
    }

    /// Theory as it should appear in the debiased measurement.
    pub fn expected(&self, theory: &[f64]) -> Result<Vec<f64>, SpectrumError> {
        check_len("theory", theory, self.lmax())?;
        let smoothed: Vec<f64> = match &self.pixel_window {
            Some(w) => theory.iter().zip(w).map(|(c, w)| c * w * w).collect(),
            None => theory.to_vec(),
        };
        self.mixing.apply(&smoothed)
    }

    pub fn validate(
        &self,
        observed: &[f64],
        theory: &[f64],
    ) -> Result<ValidationReport, SpectrumError> {
        let debiased = self.debias(observed)?;
        let expected = self.expected(theory)?;

        let relative_residual: Vec<f64> = debiased
            .iter()
            .zip(&expected)
            .enumerate()
            .map(|(l, (d, e))| {
                if l < LMIN || *e == 0.0 {
                    0.0
                } else {
                    (d - e) / e
                }
            })
            .collect();
        let max_abs_relative = relative_residual
            .iter()
            .fold(0.0_f64, |acc, r| acc.max(r.abs()));

        debug!(
            "validated spectrum up to lmax={} max |rel| = {:.3e}",
            self.lmax(),
            max_abs_relative
        );

        Ok(ValidationReport {
            ell: (0..=self.lmax()).collect(),
            debiased,
            expected,
            relative_residual,
            max_abs_relative,
        })
    }
}

/// `observed − noise` with ℓ < 2 set to zero.
pub fn debias(observed: &[f64], noise: &[f64]) -> Result<Vec<f64>, SpectrumError> {
    if observed.len() != noise.len() {
        return Err(SpectrumError::LengthMismatch {
            what: "observed spectrum",
            expected: noise.len(),
            actual: observed.len(),
        });
    }
    let mut debiased: Vec<f64> = observed.iter().zip(noise).map(|(o, n)| o - n).collect();
    zero_low_ell(&mut debiased);
    Ok(debiased)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn power_law(lmax: usize) -> Vec<f64> {
        (0..=lmax)
            .map(|l| if l < 2 { 0.0 } else { 1e-4 / (l * l) as f64 })
            .collect()
    }

    #[test]
    fn test_shot_noise_level() {
        let noise = shot_noise(8, 4.0, 768, 0.3).unwrap();
        assert_eq!(noise[0], 0.0);
        assert_eq!(noise[1], 0.0);
        let level = 4.0 * PI * 0.09 / (768.0 * 4.0);
        for n in &noise[2..] {
            assert_relative_eq!(*n, level);
        }
    }

    #[test]
    fn test_shot_noise_rejects_empty_sample() {
        assert!(matches!(
            shot_noise(8, 0.0, 768, 0.3),
            Err(SpectrumError::InvalidParameter(_))
        ));
        assert!(matches!(
            shot_noise(8, f64::NAN, 768, 0.3),
            Err(SpectrumError::InvalidParameter(_))
        ));
        assert!(shot_noise(8, 1.0, 0, 0.3).is_err());
    }

    #[test]
    fn test_uniform_sampling_needs_two_points() {
        for n in [0.0, 1.0, f64::NAN] {
            assert!(matches!(
                MixingMatrix::uniform_sampling(4, n, Spin::Two),
                Err(SpectrumError::InvalidParameter(_))
            ));
        }
        assert!(MixingMatrix::uniform_sampling(4, 2.0, Spin::Two).is_ok());
    }

    #[test]
    fn test_debias_identity() {
        // observed = M·theory + N recovers M·theory exactly
        let lmax = 16;
        let theory = power_law(lmax);
        let noise = shot_noise(lmax, 2.5, 3072, 0.26).unwrap();
        let mixing = MixingMatrix::uniform_sampling(lmax, 7680.0, Spin::Two).unwrap();
        let validator = SpectrumValidator::new(noise.clone(), mixing).unwrap();

        let expected = validator.expected(&theory).unwrap();
        let observed: Vec<f64> = expected.iter().zip(&noise).map(|(e, n)| e + n).collect();
        let debiased = validator.debias(&observed).unwrap();

        for (d, e) in debiased.iter().zip(&expected) {
            assert_relative_eq!(*d, *e, max_relative = 1e-12);
        }
        let report = validator.validate(&observed, &theory).unwrap();
        assert!(report.within(1e-10));
        assert_eq!(report.ell.len(), lmax + 1);
    }

    #[test]
    fn test_low_multipoles_are_zeroed() {
        let noise = vec![0.5; 5];
        let debiased = debias(&[3.0, 2.0, 1.5, 1.5, 1.5], &noise).unwrap();
        assert_eq!(debiased, vec![0.0, 0.0, 1.0, 1.0, 1.0]);

        let mixing = MixingMatrix::uniform_sampling(4, 10.0, Spin::Zero).unwrap();
        let m = mixing.as_array();
        for l in 0..2 {
            assert!(m.row(l).iter().all(|v| *v == 0.0));
            assert!(m.column(l).iter().all(|v| *v == 0.0));
        }
        let identity = MixingMatrix::identity(4);
        assert_eq!(identity.apply(&[1.0; 5]).unwrap(), vec![0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_uniform_sampling_entries() {
        let mixing = MixingMatrix::uniform_sampling(3, 100.0, Spin::Zero).unwrap();
        let m = mixing.as_array();
        assert_relative_eq!(m[[2, 2]], 0.99 + 5.0 / 100.0);
        assert_relative_eq!(m[[2, 3]], 7.0 / 100.0);
        assert_relative_eq!(m[[3, 2]], 5.0 / 100.0);

        let spin2 = MixingMatrix::uniform_sampling(3, 100.0, Spin::Two).unwrap();
        assert_relative_eq!(spin2.as_array()[[2, 3]], 3.5 / 100.0);
    }

    #[test]
    fn test_pixel_window_applied_to_theory() {
        let theory = vec![0.0, 0.0, 1.0, 1.0];
        let validator = SpectrumValidator::new(vec![0.0; 4], MixingMatrix::identity(3))
            .unwrap()
            .with_pixel_window(vec![1.0, 1.0, 0.5, 0.25])
            .unwrap();
        assert_eq!(validator.expected(&theory).unwrap(), vec![0.0, 0.0, 0.25, 0.0625]);
    }

    #[test]
    fn test_length_checks() {
        let mixing = MixingMatrix::identity(4);
        assert!(matches!(
            SpectrumValidator::new(vec![0.0; 3], mixing.clone()),
            Err(SpectrumError::LengthMismatch {
                what: "shot noise",
                ..
            })
        ));
        let validator = SpectrumValidator::new(vec![0.0; 5], mixing).unwrap();
        assert!(validator.validate(&[0.0; 5], &[0.0; 6]).is_err());
        assert!(MixingMatrix::from_array(Array2::zeros((2, 3))).is_err());
    }

    #[test]
    fn test_spectrum_set_enforces_low_ell() {
        let mut set = SpectrumSet::new(3);
        set.insert("EE", vec![0.0, 0.0, 1.0, 2.0]).unwrap();
        assert_eq!(
            set.insert("BB", vec![0.0, 0.1, 1.0, 2.0]),
            Err(SpectrumError::DegenerateSpectrum {
                name: "BB".to_string(),
                ell: 1,
                value: 0.1
            })
        );
        assert!(set.insert("EB", vec![0.0; 3]).is_err());

        let mut cl = vec![1.0, 1.0, 1.0, 1.0];
        zero_low_ell(&mut cl);
        set.insert("KK", cl).unwrap();

        assert_eq!(set.names().collect::<Vec<_>>(), vec!["EE", "KK"]);
        assert_eq!(set.get("EE").unwrap()[3], 2.0);
        assert!(set.get("BB").is_none());
    }
}
