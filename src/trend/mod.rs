//! Regional-residual separation of a scalar field.
//!
//! The regional (long-wavelength) component is estimated either by a
//! polynomial trend surface fitted by least squares, or by a moving-average
//! window; the residual is always `observed - regional`. The polynomial fit
//! normalizes coordinates to `[0, 1]²`, fits over valid (finite) samples
//! only, and evaluates the trend over the whole domain — including cells
//! that carry no data.

use crate::{
    fXX,
    math::{T, powi},
};
use itertools::zip_eq;
use nalgebra::{DMatrix, DVector, SVD};
use ndarray::Array2;
use thiserror::Error;

/// Errors associated with the [`trend`](crate::trend) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum TrendError {
    #[error("polynomial degree {0} is not supported (expected 1 - 3)")]
    UnsupportedDegree(usize),
    #[error("input arrays have mismatched lengths ({0} vs {1})")]
    LengthMismatch(usize, usize),
    #[error("not enough valid samples ({valid}) for {terms} polynomial terms")]
    NotEnoughSamples { valid: usize, terms: usize },
    #[error("least-squares fit did not converge")]
    FitFailed,
    #[error("window of {window} does not fit a series of length {len}")]
    InvalidWindow { window: usize, len: usize },
}

// Monomial basis x^(d-j) * y^j for all d = 0..=degree, j = 0..=d; degree 2
// yields [1, x, y, x², xy, y²].
fn monomials<T>(x: T, y: T, degree: usize) -> Vec<T>
where
    T: fXX,
{
    let mut terms = Vec::with_capacity((degree + 1) * (degree + 2) / 2);

    for d in 0..=degree {
        for j in 0..=d {
            terms.push(powi!(x, (d - j) as i32) * powi!(y, j as i32));
        }
    }

    terms
}

fn fit_polynomial<T>(
    x_norm: &[T],
    y_norm: &[T],
    values: &[T],
    degree: usize,
) -> Result<DVector<T>, TrendError>
where
    T: fXX,
{
    if !(1..=3).contains(&degree) {
        return Err(TrendError::UnsupportedDegree(degree));
    }

    let n_terms = (degree + 1) * (degree + 2) / 2;

    let valid = x_norm
        .iter()
        .zip(y_norm.iter())
        .zip(values.iter())
        .filter(|((x, y), v)| x.is_finite() && y.is_finite() && v.is_finite())
        .map(|((&x, &y), &v)| (x, y, v))
        .collect::<Vec<(T, T, T)>>();

    if valid.len() < n_terms {
        return Err(TrendError::NotEnoughSamples {
            valid: valid.len(),
            terms: n_terms,
        });
    }

    let design = DMatrix::from_fn(valid.len(), n_terms, |row, col| {
        monomials(valid[row].0, valid[row].1, degree)[col]
    });
    let rhs = DVector::from_iterator(valid.len(), valid.iter().map(|&(.., v)| v));

    SVD::new(design, true, true)
        .solve(&rhs, T!(1e-12))
        .map_err(|_| TrendError::FitFailed)
}

/// Polynomial regional-residual separation of a 2D grid.
///
/// Returns `(regional, residual)` with `residual = grid - regional`. The
/// regional trend is defined over the full grid; residual cells are `NaN`
/// exactly where the input is.
pub fn polynomial_trend_grid<T>(
    grid: &Array2<T>,
    degree: usize,
) -> Result<(Array2<T>, Array2<T>), TrendError>
where
    T: fXX,
{
    let (rows, cols) = grid.dim();

    if rows < 2 || cols < 2 {
        return Err(TrendError::NotEnoughSamples {
            valid: rows * cols,
            terms: (degree + 1) * (degree + 2) / 2,
        });
    }

    let x_at = |col: usize| T::from_usize(col).unwrap() / T::from_usize(cols - 1).unwrap();
    let y_at = |row: usize| T::from_usize(row).unwrap() / T::from_usize(rows - 1).unwrap();

    let mut x_norm = Vec::with_capacity(rows * cols);
    let mut y_norm = Vec::with_capacity(rows * cols);
    let mut values = Vec::with_capacity(rows * cols);

    for row in 0..rows {
        for col in 0..cols {
            x_norm.push(x_at(col));
            y_norm.push(y_at(row));
            values.push(grid[(row, col)]);
        }
    }

    let coeffs = fit_polynomial(&x_norm, &y_norm, &values, degree)?;

    let regional = Array2::from_shape_fn((rows, cols), |(row, col)| {
        monomials(x_at(col), y_at(row), degree)
            .iter()
            .zip(coeffs.iter())
            .map(|(&term, &coeff)| term * coeff)
            .sum::<T>()
    });

    let residual = Array2::from_shape_fn((rows, cols), |idx| grid[idx] - regional[idx]);

    Ok((regional, residual))
}

/// Polynomial regional-residual separation of scattered samples.
///
/// Coordinates are normalized to `[0, 1]²` over their valid extent before
/// fitting. Returns `(regional, residual)` aligned with the input samples.
pub fn polynomial_trend_points<T>(
    x: &[T],
    y: &[T],
    values: &[T],
    degree: usize,
) -> Result<(Vec<T>, Vec<T>), TrendError>
where
    T: fXX,
{
    if x.len() != y.len() {
        return Err(TrendError::LengthMismatch(x.len(), y.len()));
    }

    if x.len() != values.len() {
        return Err(TrendError::LengthMismatch(x.len(), values.len()));
    }

    let span = |axis: &[T]| {
        let min = crate::math::nan_min(axis);
        let max = crate::math::nan_max(axis);
        let range = max - min;

        move |v: T| match range > T::zero() {
            true => (v - min) / range,
            false => T::zero(),
        }
    };

    let nx = span(x);
    let ny = span(y);

    let x_norm = x.iter().map(|&v| nx(v)).collect::<Vec<T>>();
    let y_norm = y.iter().map(|&v| ny(v)).collect::<Vec<T>>();

    let coeffs = fit_polynomial(&x_norm, &y_norm, values, degree)?;

    let regional = x_norm
        .iter()
        .zip(y_norm.iter())
        .map(|(&xn, &yn)| {
            monomials(xn, yn, degree)
                .iter()
                .zip(coeffs.iter())
                .map(|(&term, &coeff)| term * coeff)
                .sum::<T>()
        })
        .collect::<Vec<T>>();

    let residual = zip_eq(values.iter(), regional.iter())
        .map(|(&v, &r)| v - r)
        .collect();

    Ok((regional, residual))
}

/// Moving-average regional-residual separation of a profile.
///
/// The regional component is the centered windowed mean (window truncated at
/// the profile ends, NaN samples excluded); `window = None` defaults to one
/// tenth of the profile length. Used when a polynomial fit is unstable or
/// the acquisition geometry is irregular.
pub fn moving_average_trend<T>(
    values: &[T],
    window: Option<usize>,
) -> Result<(Vec<T>, Vec<T>), TrendError>
where
    T: fXX,
{
    let window = window.unwrap_or(values.len() / 10).max(1);

    if window > values.len() {
        return Err(TrendError::InvalidWindow {
            window,
            len: values.len(),
        });
    }

    let half = window / 2;

    let regional = (0..values.len())
        .map(|idx| {
            let lo = idx.saturating_sub(half);
            let hi = (idx + half + 1).min(values.len());

            crate::math::nan_mean(&values[lo..hi])
        })
        .collect::<Vec<T>>();

    let residual = zip_eq(values.iter(), regional.iter())
        .map(|(&v, &r)| v - r)
        .collect();

    Ok((regional, residual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_trend_is_removed_exactly() {
        let grid = Array2::from_shape_fn((12, 10), |(row, col)| {
            5.0 + 2.0 * col as f64 - 3.0 * row as f64
        });

        let (regional, residual) = polynomial_trend_grid(&grid, 1).unwrap();

        residual
            .iter()
            .for_each(|&r| assert_relative_eq!(r, 0.0, epsilon = 1e-8));
        assert_relative_eq!(regional[(0, 0)], 5.0, epsilon = 1e-8);
    }

    #[test]
    fn test_quadratic_trend_with_gaps() {
        let mut grid = Array2::from_shape_fn((15, 15), |(row, col)| {
            let (x, y) = (col as f64 / 14.0, row as f64 / 14.0);
            1.0 + x + 2.0 * y + 3.0 * x * x - y * y + 0.5 * x * y
        });
        grid[(7, 7)] = f64::NAN;
        grid[(2, 11)] = f64::NAN;

        let (regional, residual) = polynomial_trend_grid(&grid, 2).unwrap();

        // The trend is still evaluated where the data is missing.
        assert!(regional[(7, 7)].is_finite());
        assert!(residual[(7, 7)].is_nan());

        residual
            .iter()
            .filter(|r| r.is_finite())
            .for_each(|&r| assert_relative_eq!(r, 0.0, epsilon = 1e-7));
    }

    #[test]
    fn test_cubic_degree_and_unsupported_degree() {
        let grid = Array2::from_shape_fn((8, 8), |(row, col)| (col + row) as f64);

        assert!(polynomial_trend_grid(&grid, 3).is_ok());
        assert!(matches!(
            polynomial_trend_grid(&grid, 4),
            Err(TrendError::UnsupportedDegree(4))
        ));
    }

    #[test]
    fn test_scattered_points_linear() {
        let x = [0.0, 100.0, 0.0, 100.0, 50.0];
        let y = [0.0, 0.0, 100.0, 100.0, 50.0];
        let values = x
            .iter()
            .zip(y.iter())
            .map(|(&x, &y)| 2.0 + 0.1 * x + 0.2 * y)
            .collect::<Vec<f64>>();

        let (_, residual) = polynomial_trend_points(&x, &y, &values, 1).unwrap();

        residual
            .iter()
            .for_each(|&r| assert_relative_eq!(r, 0.0, epsilon = 1e-8));
    }

    #[test]
    fn test_moving_average_constant_profile() {
        let values = vec![4.0; 50];
        let (regional, residual) = moving_average_trend(&values, None).unwrap();

        regional.iter().for_each(|&r| assert_relative_eq!(r, 4.0));
        residual.iter().for_each(|&r| assert_relative_eq!(r, 0.0));
    }

    #[test]
    fn test_residual_is_observed_minus_regional() {
        let values = (0..40).map(|v| v as f64).collect::<Vec<f64>>();
        let (regional, residual) = moving_average_trend(&values, Some(5)).unwrap();

        for idx in 0..values.len() {
            assert_relative_eq!(values[idx] - regional[idx], residual[idx]);
        }
    }
}
