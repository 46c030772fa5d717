//! Reduction of point catalogues onto a fixed spatial partition.
//!
//! A [`Binning`] maps positions to bin indices; a [`PixelAggregate`] holds the
//! running `(count, value_sum)` for every bin and only ever grows by addition,
//! so batches may arrive in any order and any grouping. Two partitions are
//! provided:
//!
//! - [`SphereBinning`]: HEALPix pixels addressed by longitude/latitude in degrees
//! - [`GridBinning`]: a rectilinear 3D grid given by sorted edge arrays, with
//!   half-open cells `edge[i] <= x < edge[i+1]`
//!
//! Points outside a grid are not assigned to any bin; they are tallied in
//! [`PixelAggregate::rejected`].
//!
//! Reduction is a direct scatter-add, linear in the number of points.
//! [`PixelAggregate::reduce_batch_par`] splits a batch across threads, reduces
//! each part into a private aggregate and merges the partial results.

use std::ops::{AddAssign, Div};

use log::{debug, warn};
use ndarray::{Array1, Array3};
use rayon::prelude::*;
use rustfft::num_complex::Complex64;
use thiserror::Error;

use crate::healpix::Healpix;

/// Errors raised by reduction and by reads of the aggregate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PixelizeError {
    #[error("bin {index} is empty")]
    EmptyBin { index: usize },
    #[error("bin {index} out of range for {n_bins} bins")]
    BinOutOfRange { index: usize, n_bins: usize },
    #[error("aggregate has {aggregate} bins but the partition has {binning}")]
    BinningMismatch { aggregate: usize, binning: usize },
    #[error("{positions} positions but {values} values")]
    LengthMismatch { positions: usize, values: usize },
    #[error("expected count per bin must be positive and finite, got {0}")]
    InvalidNormalization(f64),
    #[error("edges on axis {axis} must be finite, strictly increasing and at least two")]
    InvalidEdges { axis: usize },
}

/// A partition of space into a fixed number of bins.
pub trait Binning: Sync {
    type Position: Sync;

    fn n_bins(&self) -> usize;

    /// Bin containing `position`, or `None` if it falls outside the partition.
    fn bin_index(&self, position: &Self::Position) -> Option<usize>;
}

/// Equal-area HEALPix pixels; positions are `(lon, lat)` in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereBinning {
    healpix: Healpix,
}

impl SphereBinning {
    pub fn new(healpix: Healpix) -> Self {
        Self { healpix }
    }

    pub fn healpix(&self) -> &Healpix {
        &self.healpix
    }
}

impl Binning for SphereBinning {
    type Position = (f64, f64);

    fn n_bins(&self) -> usize {
        self.healpix.npix()
    }

    fn bin_index(&self, &(lon, lat): &(f64, f64)) -> Option<usize> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        Some(self.healpix.lonlat_to_pix(lon, lat))
    }
}

/// Rectilinear 3D grid; bins are numbered in row-major `(x, y, z)` order.
#[derive(Debug, Clone, PartialEq)]
pub struct GridBinning {
    edges: [Vec<f64>; 3],
}

impl GridBinning {
    /// Grid with explicit cell edges along each axis.
    pub fn new(edges: [Vec<f64>; 3]) -> Result<Self, PixelizeError> {
        for (axis, e) in edges.iter().enumerate() {
            let ordered = e.windows(2).all(|w| w[0] < w[1]);
            if e.len() < 2 || !ordered || e.iter().any(|v| !v.is_finite()) {
                return Err(PixelizeError::InvalidEdges { axis });
            }
        }
        Ok(Self { edges })
    }

    /// Cube `[lower, upper)³` split into `cells` equal cells per axis.
    pub fn cube(lower: f64, upper: f64, cells: usize) -> Result<Self, PixelizeError> {
        let step = (upper - lower) / cells as f64;
        let axis: Vec<f64> = (0..=cells)
            .map(|i| if i == cells { upper } else { lower + i as f64 * step })
            .collect();
        Self::new([axis.clone(), axis.clone(), axis])
    }

    /// Cells per axis.
    pub fn shape(&self) -> (usize, usize, usize) {
        (
            self.edges[0].len() - 1,
            self.edges[1].len() - 1,
            self.edges[2].len() - 1,
        )
    }

    pub fn edges(&self, axis: usize) -> &[f64] {
        &self.edges[axis]
    }

    /// Reshape a flat per-bin array into the grid.
    pub fn to_grid<T: Clone>(&self, flat: &[T]) -> Result<Array3<T>, PixelizeError> {
        let shape = self.shape();
        Array3::from_shape_vec(shape, flat.to_vec()).map_err(|_| {
            PixelizeError::BinningMismatch {
                aggregate: flat.len(),
                binning: self.n_bins(),
            }
        })
    }
}

fn axis_bin(edges: &[f64], x: f64) -> Option<usize> {
    if !(x >= edges[0]) || x >= edges[edges.len() - 1] {
        return None;
    }
    Some(edges.partition_point(|&e| e <= x) - 1)
}

impl Binning for GridBinning {
    type Position = [f64; 3];

    fn n_bins(&self) -> usize {
        let (nx, ny, nz) = self.shape();
        nx * ny * nz
    }

    fn bin_index(&self, position: &[f64; 3]) -> Option<usize> {
        let (_, ny, nz) = self.shape();
        let ix = axis_bin(&self.edges[0], position[0])?;
        let iy = axis_bin(&self.edges[1], position[1])?;
        let iz = axis_bin(&self.edges[2], position[2])?;
        Some((ix * ny + iy) * nz + iz)
    }
}

/// Values that can be summed per bin and divided by a count.
pub trait BinValue: Copy + Default + AddAssign + Div<f64, Output = Self> + Send + Sync {}

impl BinValue for f64 {}
impl BinValue for Complex64 {}

/// What to report for bins that received no points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmptyBinPolicy<V> {
    /// Fail with [`PixelizeError::EmptyBin`] on the first empty bin.
    Fail,
    /// Substitute the given value.
    Fill(V),
}

/// Running per-bin `(count, value_sum)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelAggregate<V> {
    counts: Vec<u64>,
    sums: Vec<V>,
    rejected: u64,
}

impl<V: BinValue> PixelAggregate<V> {
    /// Empty aggregate over `n_bins` bins.
    pub fn new(n_bins: usize) -> Self {
        Self {
            counts: vec![0; n_bins],
            sums: vec![V::default(); n_bins],
            rejected: 0,
        }
    }

    pub fn for_binning<B: Binning>(binning: &B) -> Self {
        Self::new(binning.n_bins())
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Add a single point to bin `index`.
    pub fn add(&mut self, index: usize, value: V) -> Result<(), PixelizeError> {
        let n_bins = self.len();
        if index >= n_bins {
            return Err(PixelizeError::BinOutOfRange { index, n_bins });
        }
        self.counts[index] += 1;
        self.sums[index] += value;
        Ok(())
    }

    fn check_batch<B: Binning>(
        &self,
        binning: &B,
        positions: &[B::Position],
        values: &[V],
    ) -> Result<(), PixelizeError> {
        if binning.n_bins() != self.len() {
            return Err(PixelizeError::BinningMismatch {
                aggregate: self.len(),
                binning: binning.n_bins(),
            });
        }
        if positions.len() != values.len() {
            return Err(PixelizeError::LengthMismatch {
                positions: positions.len(),
                values: values.len(),
            });
        }
        Ok(())
    }

    /// Scatter-add one batch of points.
    pub fn reduce_batch<B: Binning>(
        &mut self,
        binning: &B,
        positions: &[B::Position],
        values: &[V],
    ) -> Result<(), PixelizeError> {
        self.check_batch(binning, positions, values)?;

        let mut rejected = 0u64;
        for (position, &value) in positions.iter().zip(values) {
            match binning.bin_index(position) {
                Some(index) => {
                    self.counts[index] += 1;
                    self.sums[index] += value;
                }
                None => rejected += 1,
            }
        }

        self.rejected += rejected;
        debug!(
            "reduced batch of {} points into {} bins ({} outside)",
            positions.len(),
            self.len(),
            rejected
        );
        Ok(())
    }

    /// Scatter-add one batch using all rayon worker threads.
    ///
    /// Each worker reduces a slice of the batch into a private aggregate and
    /// the partial aggregates are merged. Counts are identical to
    /// [`reduce_batch`](Self::reduce_batch); floating-point sums agree up to
    /// summation order.
    pub fn reduce_batch_par<B: Binning>(
        &mut self,
        binning: &B,
        positions: &[B::Position],
        values: &[V],
    ) -> Result<(), PixelizeError> {
        self.check_batch(binning, positions, values)?;
        let n_bins = self.len();

        let partial = positions
            .par_iter()
            .zip(values.par_iter())
            .fold(
                || PixelAggregate::new(n_bins),
                |mut acc, (position, &value)| {
                    match binning.bin_index(position) {
                        Some(index) => {
                            acc.counts[index] += 1;
                            acc.sums[index] += value;
                        }
                        None => acc.rejected += 1,
                    }
                    acc
                },
            )
            .reduce(
                || PixelAggregate::new(n_bins),
                |mut a, b| {
                    a.absorb(&b);
                    a
                },
            );

        self.absorb(&partial);
        Ok(())
    }

    fn absorb(&mut self, other: &Self) {
        for (c, o) in self.counts.iter_mut().zip(&other.counts) {
            *c += o;
        }
        for (s, o) in self.sums.iter_mut().zip(&other.sums) {
            *s += *o;
        }
        self.rejected += other.rejected;
    }

    /// Add another aggregate over the same partition into this one.
    pub fn merge(&mut self, other: &Self) -> Result<(), PixelizeError> {
        if other.len() != self.len() {
            return Err(PixelizeError::BinningMismatch {
                aggregate: self.len(),
                binning: other.len(),
            });
        }
        self.absorb(other);
        Ok(())
    }

    /// Count of bin `index`, `None` past the last bin.
    pub fn count(&self, index: usize) -> Option<u64> {
        self.counts.get(index).copied()
    }

    pub fn value_sum(&self, index: usize) -> Option<V> {
        self.sums.get(index).copied()
    }

    /// `(count, value_sum)` of bin `index`.
    pub fn get(&self, index: usize) -> Option<(u64, V)> {
        Some((self.count(index)?, self.value_sum(index)?))
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn value_sums(&self) -> &[V] {
        &self.sums
    }

    /// Total number of points assigned to a bin.
    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Number of points that fell outside the partition.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Mean value of the points in bin `index`.
    pub fn mean(&self, index: usize) -> Result<V, PixelizeError> {
        let count = self.count(index).ok_or(PixelizeError::BinOutOfRange {
            index,
            n_bins: self.len(),
        })?;
        match count {
            0 => Err(PixelizeError::EmptyBin { index }),
            n => Ok(self.sums[index] / n as f64),
        }
    }

    /// Per-bin means with `policy` deciding what empty bins become.
    pub fn mean_map(&self, policy: EmptyBinPolicy<V>) -> Result<Vec<V>, PixelizeError> {
        let mut empty = 0usize;
        let means = (0..self.len())
            .map(|index| match (self.mean(index), policy) {
                (Ok(v), _) => Ok(v),
                (Err(_), EmptyBinPolicy::Fill(fill)) => {
                    empty += 1;
                    Ok(fill)
                }
                (Err(e), EmptyBinPolicy::Fail) => Err(e),
            })
            .collect::<Result<Vec<V>, PixelizeError>>()?;

        if empty > 0 {
            warn!("{empty} of {} bins were empty and filled", self.len());
        }
        Ok(means)
    }

    /// Close the aggregate, dividing every sum by the expected count per bin.
    pub fn finalize(self, expected_per_bin: f64) -> Result<NormalizedField<V>, PixelizeError> {
        if !(expected_per_bin > 0.0) || !expected_per_bin.is_finite() {
            return Err(PixelizeError::InvalidNormalization(expected_per_bin));
        }

        let values = self.sums.iter().map(|&s| s / expected_per_bin).collect();
        Ok(NormalizedField {
            values,
            counts: self.counts,
            expected_per_bin,
            rejected: self.rejected,
        })
    }
}

/// Scatter-add a single batch into a fresh aggregate.
pub fn reduce<B: Binning, V: BinValue>(
    binning: &B,
    positions: &[B::Position],
    values: &[V],
) -> Result<PixelAggregate<V>, PixelizeError> {
    let mut aggregate = PixelAggregate::for_binning(binning);
    aggregate.reduce_batch(binning, positions, values)?;
    Ok(aggregate)
}

/// Aggregate sums after division by the expected count per bin.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedField<V> {
    pub values: Vec<V>,
    pub counts: Vec<u64>,
    pub expected_per_bin: f64,
    pub rejected: u64,
}

impl NormalizedField<f64> {
    pub fn to_array(&self) -> Array1<f64> {
        Array1::from_vec(self.values.clone())
    }
}

impl NormalizedField<Complex64> {
    /// Real and imaginary parts as separate maps.
    pub fn components(&self) -> (Array1<f64>, Array1<f64>) {
        let re = self.values.iter().map(|v| v.re).collect();
        let im = self.values.iter().map(|v| v.im).collect();
        (re, im)
    }
}
