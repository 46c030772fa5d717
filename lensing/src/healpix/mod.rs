//! HEALPix equal-area sphere pixelization (RING ordering).
//!
//! The sphere is split into `12·N²` pixels of identical area arranged on
//! `4N−1` iso-latitude rings. Rings in the two polar caps hold `4i` pixels
//! (for the i-th ring from the pole), equatorial rings hold `4N`. Equal-latitude
//! rings with uniformly spaced pixels are what make the ring-FFT harmonic
//! transform in [`sht`] possible.
//!
//! Angles follow the physics convention: colatitude `θ ∈ [0, π]` measured from
//! the north pole and longitude `φ ∈ [0, 2π)`. [`Healpix::lonlat_to_pix`]
//! accepts catalogue-style longitude/latitude in degrees.

pub mod alm;
pub mod pixwin;
pub mod sht;

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use thiserror::Error;

pub use alm::{alm_index, Alm};
pub use pixwin::pixel_window;

/// Errors from pixelization and map-shape validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HealpixError {
    #[error("nside must be a power of two >= 1, got {0}")]
    InvalidNside(usize),
    #[error("map has {actual} pixels but nside {nside} requires {expected}")]
    ResolutionMismatch {
        nside: usize,
        expected: usize,
        actual: usize,
    },
    #[error("pixel index {pix} out of range for {npix} pixels")]
    PixelOutOfRange { pix: usize, npix: usize },
}

/// One iso-latitude ring of pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ring {
    /// RING-scheme index of the first pixel
    pub start: usize,
    /// Number of pixels on the ring
    pub len: usize,
    /// cos θ of the ring
    pub z: f64,
    /// Longitude of the first pixel centre
    pub phi0: f64,
}

impl Ring {
    pub fn theta(&self) -> f64 {
        self.z.acos()
    }
}

/// A HEALPix grid of a given resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Healpix {
    nside: usize,
}

impl Healpix {
    /// Create a grid with resolution parameter `nside`.
    pub fn new(nside: usize) -> Result<Self, HealpixError> {
        if nside == 0 || !nside.is_power_of_two() {
            return Err(HealpixError::InvalidNside(nside));
        }
        Ok(Self { nside })
    }

    pub fn nside(&self) -> usize {
        self.nside
    }

    /// Total pixel count, `12·N²`.
    pub fn npix(&self) -> usize {
        12 * self.nside * self.nside
    }

    /// Number of iso-latitude rings, `4N−1`.
    pub fn nrings(&self) -> usize {
        4 * self.nside - 1
    }

    /// Solid angle of a single pixel in steradians.
    pub fn pixel_area(&self) -> f64 {
        4.0 * PI / self.npix() as f64
    }

    /// Number of pixels in each polar cap.
    fn ncap(&self) -> usize {
        2 * self.nside * (self.nside - 1)
    }

    /// Fail unless `len` equals the pixel count of this grid.
    pub fn check_map_len(&self, len: usize) -> Result<(), HealpixError> {
        if len != self.npix() {
            return Err(HealpixError::ResolutionMismatch {
                nside: self.nside,
                expected: self.npix(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Geometry of ring `index` (1-based from the north pole).
    ///
    /// # Panics
    /// If `index` is outside `1..=4N-1`.
    pub fn ring(&self, index: usize) -> Ring {
        let n = self.nside;
        assert!(
            (1..=self.nrings()).contains(&index),
            "ring index {index} out of range 1..={}",
            self.nrings()
        );

        let nf = n as f64;
        if index < n {
            let i = index as f64;
            Ring {
                start: 2 * index * (index - 1),
                len: 4 * index,
                z: 1.0 - i * i / (3.0 * nf * nf),
                phi0: PI / (4.0 * i),
            }
        } else if index <= 3 * n {
            let shifted = (index + n) % 2 == 0;
            Ring {
                start: self.ncap() + (index - n) * 4 * n,
                len: 4 * n,
                z: (2.0 * nf - index as f64) * 2.0 / (3.0 * nf),
                phi0: if shifted { PI / (4.0 * nf) } else { 0.0 },
            }
        } else {
            let mirror = 4 * n - index;
            let i = mirror as f64;
            Ring {
                start: self.npix() - 2 * mirror * (mirror + 1),
                len: 4 * mirror,
                z: -(1.0 - i * i / (3.0 * nf * nf)),
                phi0: PI / (4.0 * i),
            }
        }
    }

    /// All rings from north to south.
    pub fn rings(&self) -> Vec<Ring> {
        (1..=self.nrings()).map(|i| self.ring(i)).collect()
    }

    /// Pixel containing the direction `(theta, phi)`.
    pub fn ang2pix(&self, theta: f64, phi: f64) -> usize {
        let n = self.nside as i64;
        let z = theta.cos();
        let za = z.abs();
        let tt = phi.rem_euclid(TAU) / FRAC_PI_2; // in [0, 4)

        let pix = if za <= 2.0 / 3.0 {
            let temp1 = n as f64 * (0.5 + tt);
            let temp2 = n as f64 * z * 0.75;
            let jp = (temp1 - temp2) as i64;
            let jm = (temp1 + temp2) as i64;

            let ir = n + 1 + jp - jm;
            let kshift = 1 - (ir & 1);
            let ip = (jp + jm - n + kshift + 1) / 2;
            let ip = ip.rem_euclid(4 * n);

            self.ncap() as i64 + (ir - 1) * 4 * n + ip
        } else {
            let tp = tt - tt.floor();
            let tmp = n as f64 * (3.0 * (1.0 - za)).sqrt();
            let jp = (tp * tmp) as i64;
            let jm = ((1.0 - tp) * tmp) as i64;

            let ir = jp + jm + 1;
            let ip = ((tt * ir as f64) as i64).rem_euclid(4 * ir);

            if z > 0.0 {
                2 * ir * (ir - 1) + ip
            } else {
                self.npix() as i64 - 2 * ir * (ir + 1) + ip
            }
        };

        pix as usize
    }

    /// Centre `(theta, phi)` of pixel `pix`.
    pub fn pix2ang(&self, pix: usize) -> Result<(f64, f64), HealpixError> {
        let npix = self.npix();
        if pix >= npix {
            return Err(HealpixError::PixelOutOfRange { pix, npix });
        }

        let n = self.nside;
        let ncap = self.ncap();
        let ring_index = if pix < ncap {
            (1 + isqrt(1 + 2 * pix)) >> 1
        } else if pix < npix - ncap {
            (pix - ncap) / (4 * n) + n
        } else {
            let ip = npix - pix;
            4 * n - ((1 + isqrt(2 * ip - 1)) >> 1)
        };

        let ring = self.ring(ring_index);
        let offset = (pix - ring.start) as f64;
        let phi = ring.phi0 + offset * TAU / ring.len as f64;
        Ok((ring.z.acos(), phi))
    }

    /// Pixel containing longitude/latitude given in degrees.
    pub fn lonlat_to_pix(&self, lon_deg: f64, lat_deg: f64) -> usize {
        let theta = FRAC_PI_2 - lat_deg.to_radians();
        self.ang2pix(theta.clamp(0.0, PI), lon_deg.to_radians())
    }

    /// Longitude/latitude in degrees of the centre of `pix`.
    pub fn pix_to_lonlat(&self, pix: usize) -> Result<(f64, f64), HealpixError> {
        let (theta, phi) = self.pix2ang(pix)?;
        Ok((phi.to_degrees(), (FRAC_PI_2 - theta).to_degrees()))
    }
}

fn isqrt(v: usize) -> usize {
    let mut r = (v as f64).sqrt() as usize;
    while r * r > v {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= v {
        r += 1;
    }
    r
}
