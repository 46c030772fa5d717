//! Spherical harmonic coefficients of real fields.

use rustfft::num_complex::Complex64;

/// Flat index of `(l, m)` in m-major order (`m = 0` block first).
///
/// This is the same layout healpy uses, so `alm_index(lmax, l, 0) == l`.
pub fn alm_index(lmax: usize, l: usize, m: usize) -> usize {
    debug_assert!(m <= l && l <= lmax, "invalid (l, m) = ({l}, {m}) for lmax {lmax}");
    m * (2 * lmax + 1 - m) / 2 + l
}

/// Harmonic coefficients `a_ℓm` for `0 ≤ m ≤ ℓ ≤ ℓ_max` of a real field.
///
/// Negative-m coefficients are implied by `a_ℓ,-m = (-1)^m a*_ℓm`.
#[derive(Debug, Clone, PartialEq)]
pub struct Alm {
    lmax: usize,
    data: Vec<Complex64>,
}

impl Alm {
    /// All-zero coefficients up to `lmax`.
    pub fn zeros(lmax: usize) -> Self {
        Self {
            lmax,
            data: vec![Complex64::new(0.0, 0.0); (lmax + 1) * (lmax + 2) / 2],
        }
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, l: usize, m: usize) -> Complex64 {
        self.data[alm_index(self.lmax, l, m)]
    }

    pub fn set(&mut self, l: usize, m: usize, value: Complex64) {
        self.data[alm_index(self.lmax, l, m)] = value;
    }

    pub fn get_mut(&mut self, l: usize, m: usize) -> &mut Complex64 {
        &mut self.data[alm_index(self.lmax, l, m)]
    }

    pub fn as_slice(&self) -> &[Complex64] {
        &self.data
    }

    /// Multiply every `a_ℓm` by `fl[ℓ]`.
    ///
    /// # Panics
    /// If `fl` is shorter than `lmax + 1`.
    pub fn scale_by_ell(&mut self, fl: &[f64]) {
        assert!(
            fl.len() > self.lmax,
            "filter has {} entries but lmax is {}",
            fl.len(),
            self.lmax
        );
        for m in 0..=self.lmax {
            for l in m..=self.lmax {
                self.data[alm_index(self.lmax, l, m)] *= fl[l];
            }
        }
    }

    /// Add `other` coefficient by coefficient.
    ///
    /// # Panics
    /// If the two sets have different `lmax`.
    pub fn add_assign(&mut self, other: &Alm) {
        assert_eq!(self.lmax, other.lmax, "coefficient sets must share lmax");
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// Zero every coefficient with `ℓ < lmin`.
    pub fn zero_below(&mut self, lmin: usize) {
        for m in 0..lmin.min(self.lmax + 1) {
            for l in m..lmin.min(self.lmax + 1) {
                self.data[alm_index(self.lmax, l, m)] = Complex64::new(0.0, 0.0);
            }
        }
    }
}

/// Angular power spectrum `C_ℓ = Σ_m |a_ℓm|² / (2ℓ+1)`.
pub fn alm2cl(alm: &Alm) -> Vec<f64> {
    cross_cl(alm, alm)
}

/// Cross spectrum `C_ℓ = Σ_m Re(a_ℓm b*_ℓm) / (2ℓ+1)` over `m = -ℓ..ℓ`.
///
/// # Panics
/// If the two coefficient sets have different `lmax`.
pub fn cross_cl(a: &Alm, b: &Alm) -> Vec<f64> {
    assert_eq!(a.lmax, b.lmax, "cross spectrum of alms with different lmax");
    let lmax = a.lmax;

    (0..=lmax)
        .map(|l| {
            let mut sum = (a.get(l, 0) * b.get(l, 0).conj()).re;
            for m in 1..=l {
                sum += 2.0 * (a.get(l, m) * b.get(l, m).conj()).re;
            }
            sum / (2 * l + 1) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_index_layout() {
        assert_eq!(alm_index(3, 0, 0), 0);
        assert_eq!(alm_index(3, 3, 0), 3);
        assert_eq!(alm_index(3, 1, 1), 4);
        assert_eq!(alm_index(3, 3, 3), 9);
        assert_eq!(Alm::zeros(3).len(), 10);
    }

    #[test]
    fn test_cl_counts_negative_m() {
        let mut alm = Alm::zeros(2);
        alm.set(2, 0, Complex64::new(1.0, 0.0));
        alm.set(2, 1, Complex64::new(0.0, 1.0));
        alm.set(2, 2, Complex64::new(1.0, 1.0));
        let cl = alm2cl(&alm);

        assert_eq!(cl[0], 0.0);
        assert_eq!(cl[1], 0.0);
        assert_relative_eq!(cl[2], (1.0 + 2.0 * 1.0 + 2.0 * 2.0) / 5.0);
    }

    #[test]
    fn test_scale_and_zero_below() {
        let mut alm = Alm::zeros(3);
        for m in 0..=3 {
            for l in m..=3 {
                alm.set(l, m, Complex64::new(1.0, -1.0));
            }
        }
        alm.scale_by_ell(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(alm.get(3, 2), Complex64::new(3.0, -3.0));

        alm.zero_below(3);
        assert_eq!(alm.get(2, 2), Complex64::new(0.0, 0.0));
        assert_eq!(alm.get(3, 3), Complex64::new(3.0, -3.0));
    }
}
