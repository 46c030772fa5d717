//! One-dimensional interpolation and quadrature on tabulated curves.
//!
//! Shell weight curves arrive as sampled `(z, w)` tables, so everything here
//! works on pairs of slices rather than closures, except [`simpson`] which is
//! used for smooth analytic integrands such as the inverse Hubble rate.

use thiserror::Error;

/// Errors raised when a tabulated curve cannot be interpolated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length ({0} != {1})")]
    MismatchedLengths(usize, usize),
    #[error("X values must be sorted in ascending order")]
    UnsortedData,
}

fn validate_table(xs: &[f64], ys: &[f64]) -> Result<(), InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths(xs.len(), ys.len()));
    }
    if xs.len() < 2 {
        return Err(InterpError::InsufficientData);
    }
    if xs.windows(2).any(|w| !(w[1] >= w[0])) {
        return Err(InterpError::UnsortedData);
    }
    Ok(())
}

/// Linear interpolation of a sorted table at `x`.
///
/// The interval is located with a binary search, so the cost is O(log n).
///
/// # Arguments
/// * `x` - Abscissa to evaluate at, must lie inside `[xs[0], xs[n-1]]`
/// * `xs` - Sorted abscissae
/// * `ys` - Ordinates, same length as `xs`
///
/// # Examples
///
/// ```rust
/// use lensing::algo::quadrature::interp;
///
/// let zs = [0.0, 0.5, 1.0];
/// let ws = [0.0, 1.0, 0.0];
/// assert_eq!(interp(0.25, &zs, &ws).unwrap(), 0.5);
/// ```
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    validate_table(xs, ys)?;

    let last = xs.len() - 1;
    if x < xs[0] || x > xs[last] {
        return Err(InterpError::OutOfBounds(x, xs[0], xs[last]));
    }

    // first index with xs[idx] > x
    let idx = xs.partition_point(|&v| v <= x);
    if idx == 0 {
        return Ok(ys[0]);
    }
    if idx > last {
        return Ok(ys[last]);
    }

    let (x1, x2) = (xs[idx - 1], xs[idx]);
    let (y1, y2) = (ys[idx - 1], ys[idx]);
    if x2 == x1 {
        return Ok(y2);
    }
    let t = (x - x1) / (x2 - x1);
    Ok(y1 + t * (y2 - y1))
}

/// Trapezoidal integral of a tabulated curve.
///
/// # Arguments
/// * `xs` - Sorted abscissae
/// * `ys` - Ordinates, same length as `xs`
pub fn trapezoid(xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    validate_table(xs, ys)?;

    Ok(xs
        .windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| 0.5 * (y[0] + y[1]) * (x[1] - x[0]))
        .sum())
}

/// Composite Simpson integral of `f` over `[a, b]` using `intervals` panels.
///
/// # Panics
/// If `intervals` is zero or odd.
pub fn simpson<F>(f: F, a: f64, b: f64, intervals: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    assert!(
        intervals > 0 && intervals % 2 == 0,
        "Simpson integration needs a positive even number of intervals, got {intervals}"
    );

    if a == b {
        return 0.0;
    }

    let h = (b - a) / intervals as f64;
    let mut sum = f(a) + f(b);
    for i in 1..intervals {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(a + i as f64 * h);
    }
    sum * h / 3.0
}
