//! Radial shells and their redshift window functions.
//!
//! A [`ShellWindow`] is the immutable description of one matter shell: a
//! weight curve `w(z)` sampled on a redshift grid and an effective redshift at
//! which the shell is collapsed onto a single lens plane. The lower and upper
//! ends of the support bound the shell along the line of sight.
//!
//! Builders for the two common partitions are provided: top-hat shells
//! between consecutive edges and overlapping triangular (linear spline)
//! windows centred on nodes.

use thiserror::Error;

use crate::algo::quadrature::{interp, trapezoid, InterpError};

/// Errors from window construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WindowError {
    #[error("invalid weight table: {0}")]
    Table(#[from] InterpError),
    #[error("redshift {value} at index {index} is negative or not finite")]
    InvalidRedshift { index: usize, value: f64 },
    #[error("weight {value} at index {index} is negative or not finite")]
    InvalidWeight { index: usize, value: f64 },
    #[error("window has zero total weight")]
    ZeroWeight,
    #[error("effective redshift {zeff} has zero weight or lies outside [{lower}, {upper}]")]
    EffectiveRedshift { zeff: f64, lower: f64, upper: f64 },
    #[error("shell edges must be strictly increasing and non-negative")]
    InvalidEdges,
    #[error("redshift step must be positive, got {0}")]
    InvalidStep(f64),
}

/// Weight curve of a single shell.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellWindow {
    za: Vec<f64>,
    wa: Vec<f64>,
    zeff: f64,
}

impl ShellWindow {
    /// Build a window from a sampled weight curve.
    ///
    /// # Arguments
    /// * `za` - Redshift grid, sorted ascending, at least two points
    /// * `wa` - Non-negative weights on `za`
    /// * `zeff` - Effective redshift; defaults to the weighted mean redshift
    pub fn new(za: Vec<f64>, wa: Vec<f64>, zeff: Option<f64>) -> Result<Self, WindowError> {
        if let Some((index, &value)) = za
            .iter()
            .enumerate()
            .find(|(_, z)| !(z.is_finite() && **z >= 0.0))
        {
            return Err(WindowError::InvalidRedshift { index, value });
        }
        // validates lengths and ordering
        let total = trapezoid(&za, &wa)?;

        if let Some((index, &value)) = wa
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(WindowError::InvalidWeight { index, value });
        }
        if !(total > 0.0) {
            return Err(WindowError::ZeroWeight);
        }

        let zeff = match zeff {
            Some(z) => z,
            None => {
                let zw: Vec<f64> = za.iter().zip(&wa).map(|(z, w)| z * w).collect();
                trapezoid(&za, &zw)? / total
            }
        };

        let lower = za[0];
        let upper = za[za.len() - 1];
        let at_zeff = if zeff.is_finite() {
            interp(zeff, &za, &wa).unwrap_or(0.0)
        } else {
            0.0
        };
        if !(at_zeff > 0.0) {
            return Err(WindowError::EffectiveRedshift { zeff, lower, upper });
        }

        Ok(Self { za, wa, zeff })
    }

    pub fn za(&self) -> &[f64] {
        &self.za
    }

    pub fn wa(&self) -> &[f64] {
        &self.wa
    }

    /// Redshift of the lens plane standing in for this shell.
    pub fn zeff(&self) -> f64 {
        self.zeff
    }

    /// Lower end of the redshift support.
    pub fn lower(&self) -> f64 {
        self.za[0]
    }

    /// Upper end of the redshift support.
    pub fn upper(&self) -> f64 {
        self.za[self.za.len() - 1]
    }

    /// Weight at `z`, zero outside the support.
    pub fn weight_at(&self, z: f64) -> f64 {
        interp(z, &self.za, &self.wa).unwrap_or(0.0)
    }

    /// Lens-plane normalization `∫ w dz / w(zeff)`.
    ///
    /// For a unit top-hat this is the shell thickness in redshift.
    pub fn normalization(&self) -> f64 {
        let total = trapezoid(&self.za, &self.wa).unwrap_or(0.0);
        total / self.weight_at(self.zeff)
    }
}

/// Inclusive grid from `zmin` to `zmax` with spacing no larger than `dz`.
pub fn redshift_grid(zmin: f64, zmax: f64, dz: f64) -> Result<Vec<f64>, WindowError> {
    if !(dz > 0.0) {
        return Err(WindowError::InvalidStep(dz));
    }
    if !(zmax > zmin) || !(zmin >= 0.0) || !zmax.is_finite() {
        return Err(WindowError::InvalidEdges);
    }

    let steps = (((zmax - zmin) / dz) - 1e-9).ceil().max(1.0) as usize;
    let h = (zmax - zmin) / steps as f64;
    let mut grid: Vec<f64> = (0..steps).map(|i| zmin + i as f64 * h).collect();
    grid.push(zmax);
    Ok(grid)
}

fn check_edges(edges: &[f64]) -> Result<(), WindowError> {
    if edges.len() < 2
        || !(edges[0] >= 0.0)
        || !edges.iter().all(|e| e.is_finite())
        || edges.windows(2).any(|w| !(w[1] > w[0]))
    {
        return Err(WindowError::InvalidEdges);
    }
    Ok(())
}

/// Unit top-hat windows between consecutive `edges`.
pub fn tophat_windows(edges: &[f64], dz: f64) -> Result<Vec<ShellWindow>, WindowError> {
    check_edges(edges)?;

    edges
        .windows(2)
        .map(|pair| {
            let za = redshift_grid(pair[0], pair[1], dz)?;
            let wa = vec![1.0; za.len()];
            ShellWindow::new(za, wa, None)
        })
        .collect()
}

/// Triangular windows peaking at each interior node.
///
/// Window `i` rises linearly from `nodes[i-1]` to `nodes[i]` and falls to zero
/// at `nodes[i+1]`; its effective redshift is the peak. Consecutive windows
/// form a partition of unity on `[nodes[1], nodes[n-2]]`.
pub fn linear_windows(nodes: &[f64], dz: f64) -> Result<Vec<ShellWindow>, WindowError> {
    check_edges(nodes)?;
    if nodes.len() < 3 {
        return Err(WindowError::InvalidEdges);
    }

    nodes
        .windows(3)
        .map(|triple| {
            let (z0, z1, z2) = (triple[0], triple[1], triple[2]);
            let za = redshift_grid(z0, z2, dz)?;
            let wa = za
                .iter()
                .map(|&z| {
                    if z <= z1 {
                        (z - z0) / (z1 - z0)
                    } else {
                        (z2 - z) / (z2 - z1)
                    }
                })
                .map(|w: f64| w.clamp(0.0, 1.0))
                .collect();
            ShellWindow::new(za, wa, Some(z1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tophat_normalization_is_width() {
        let windows = tophat_windows(&[0.0, 0.5, 1.5], 0.01).unwrap();
        assert_eq!(windows.len(), 2);
        assert_relative_eq!(windows[0].normalization(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(windows[1].normalization(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(windows[0].zeff(), 0.25, epsilon = 1e-12);
        assert_relative_eq!(windows[1].lower(), 0.5);
        assert_relative_eq!(windows[1].upper(), 1.5);
    }

    #[test]
    fn test_linear_windows_peak_at_nodes() {
        let windows = linear_windows(&[0.0, 0.4, 0.8, 1.2], 0.05).unwrap();
        assert_eq!(windows.len(), 2);
        assert_relative_eq!(windows[0].zeff(), 0.4);
        assert_relative_eq!(windows[0].weight_at(0.4), 1.0, epsilon = 1e-12);
        // triangle of base 0.8 and height 1
        assert_relative_eq!(windows[0].normalization(), 0.4, epsilon = 1e-12);
        // partition of unity between the peaks
        let z = 0.55;
        assert_relative_eq!(
            windows[0].weight_at(z) + windows[1].weight_at(z),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_redshift_grid_spacing() {
        let grid = redshift_grid(0.0, 1.0, 0.3).unwrap();
        assert_eq!(grid.len(), 5);
        assert_relative_eq!(grid[1], 0.25);
        assert_eq!(*grid.last().unwrap(), 1.0);

        assert_eq!(redshift_grid(0.0, 1.0, 0.0), Err(WindowError::InvalidStep(0.0)));
    }

    #[test]
    fn test_window_validation() {
        assert_eq!(
            ShellWindow::new(vec![0.0, 1.0], vec![0.0, 0.0], None),
            Err(WindowError::ZeroWeight)
        );
        assert_eq!(
            ShellWindow::new(vec![0.0, 1.0], vec![1.0, -1.0], None),
            Err(WindowError::InvalidWeight {
                index: 1,
                value: -1.0
            })
        );
        assert!(matches!(
            ShellWindow::new(vec![0.0, 1.0], vec![1.0, 1.0], Some(2.0)),
            Err(WindowError::EffectiveRedshift { .. })
        ));
        assert!(matches!(
            ShellWindow::new(vec![1.0, 0.0], vec![1.0, 1.0], None),
            Err(WindowError::Table(InterpError::UnsortedData))
        ));
    }

    #[test]
    fn test_non_finite_windows_are_rejected() {
        assert!(matches!(
            ShellWindow::new(vec![0.0, f64::NAN], vec![1.0, 1.0], None),
            Err(WindowError::InvalidRedshift { index: 1, .. })
        ));
        assert!(matches!(
            ShellWindow::new(vec![0.0, f64::INFINITY], vec![1.0, 1.0], None),
            Err(WindowError::InvalidRedshift { index: 1, .. })
        ));
        assert!(matches!(
            ShellWindow::new(vec![0.0, 1.0], vec![1.0, 1.0], Some(f64::NAN)),
            Err(WindowError::EffectiveRedshift { .. })
        ));
        assert!(matches!(
            ShellWindow::new(vec![0.0, 1.0], vec![1.0, f64::NAN], None),
            Err(WindowError::InvalidWeight { index: 1, .. })
        ));
        assert_eq!(
            tophat_windows(&[0.0, f64::NAN, 1.0], 0.1),
            Err(WindowError::InvalidEdges)
        );
        assert_eq!(
            tophat_windows(&[0.0, f64::INFINITY], 0.1),
            Err(WindowError::InvalidEdges)
        );
    }

    #[test]
    fn test_invalid_edges() {
        assert_eq!(
            tophat_windows(&[0.0, 0.0, 1.0], 0.1),
            Err(WindowError::InvalidEdges)
        );
        assert_eq!(linear_windows(&[0.0, 1.0], 0.1), Err(WindowError::InvalidEdges));
    }
}
