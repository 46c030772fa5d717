//! Galaxy catalogues built up batch by batch.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use rustfft::num_complex::Complex64;

/// A single observed galaxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Galaxy {
    /// Longitude in degrees
    pub lon: f64,
    /// Latitude in degrees
    pub lat: f64,
    /// True redshift
    pub z: f64,
    /// Observed ellipticity, intrinsic shape plus shear
    pub eps: Complex64,
}

/// Column-oriented galaxy table.
///
/// Columns grow by amortised doubling; a batch is appended in place and never
/// forces a copy of the rows already stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalogue {
    lon: Vec<f64>,
    lat: Vec<f64>,
    z: Vec<f64>,
    eps: Vec<Complex64>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lon: Vec::with_capacity(capacity),
            lat: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            eps: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, galaxy: Galaxy) {
        self.lon.push(galaxy.lon);
        self.lat.push(galaxy.lat);
        self.z.push(galaxy.z);
        self.eps.push(galaxy.eps);
    }

    pub fn extend_batch<I: IntoIterator<Item = Galaxy>>(&mut self, batch: I) {
        let iter = batch.into_iter();
        let (lower, _) = iter.size_hint();
        self.reserve(lower);
        for galaxy in iter {
            self.push(galaxy);
        }
    }

    pub fn reserve(&mut self, additional: usize) {
        self.lon.reserve(additional);
        self.lat.reserve(additional);
        self.z.reserve(additional);
        self.eps.reserve(additional);
    }

    pub fn len(&self) -> usize {
        self.lon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lon.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Galaxy> {
        Some(Galaxy {
            lon: *self.lon.get(index)?,
            lat: self.lat[index],
            z: self.z[index],
            eps: self.eps[index],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Galaxy> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    pub fn eps(&self) -> &[Complex64] {
        &self.eps
    }

    /// Positions as `(lon, lat)` pairs for sphere binning.
    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.lon.iter().copied().zip(self.lat.iter().copied()).collect()
    }
}

impl FromIterator<Galaxy> for Catalogue {
    fn from_iter<I: IntoIterator<Item = Galaxy>>(iter: I) -> Self {
        let mut catalogue = Catalogue::new();
        catalogue.extend_batch(iter);
        catalogue
    }
}

/// Draw intrinsic ellipticities with independent Gaussian components.
///
/// Draws with `|ε| ≥ 1` are rejected and redrawn, so the result is a
/// truncated Gaussian.
///
/// # Arguments
/// * `count` - Number of ellipticities to draw
/// * `sigma` - Standard deviation of each component
///
/// # Panics
/// If `sigma` is negative, not finite, or so large that draws almost never
/// land inside the unit disc.
pub fn ellipticity_gaussian<R: Rng + ?Sized>(
    count: usize,
    sigma: f64,
    rng: &mut R,
) -> Vec<Complex64> {
    assert!(
        sigma.is_finite() && (0.0..=2.0).contains(&sigma),
        "ellipticity scatter must lie in [0, 2], got {sigma}"
    );
    if sigma == 0.0 {
        return vec![Complex64::new(0.0, 0.0); count];
    }

    let normal = Normal::new(0.0, sigma).expect("sigma validated above");
    (0..count)
        .map(|_| loop {
            let eps = Complex64::new(normal.sample(rng), normal.sample(rng));
            if eps.norm_sqr() < 1.0 {
                break eps;
            }
        })
        .collect()
}
