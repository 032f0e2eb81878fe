//! Derivative suite for scalar potential-field profiles and grids.
//!
//! All grid operators return arrays of the same shape as their input and
//! propagate `NaN`: a stencil that touches a missing cell produces a missing
//! cell, never a silently zero-filled one. The single documented exception is
//! the tilt angle, where the total horizontal gradient is floored at a small
//! epsilon to avoid a division singularity.
//!
//! The vertical derivative of a 2D grid is the Laplacian surrogate
//! `dT/dz ≈ -∇²T / 2`, which follows from the harmonicity of a potential
//! field (`∇²T = 0` implies `∂²T/∂z² = -(∂²T/∂x² + ∂²T/∂y²)`). This is a
//! first-order approximation, not an exact transform; exact frequency-domain
//! operators for profiles live in [`spectral`].
//!
//! Zero-phase Butterworth band-pass separation lives in [`bandpass`].

pub mod bandpass;
pub mod spectral;

use crate::{
    fXX,
    math::{T, atan2, cos, powi, sin, sqrt},
};
use ndarray::{Array2, ShapeError};
use rayon::prelude::*;
use thiserror::Error;

/// Errors associated with the [`deriv`](crate::deriv) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum DerivError<T> {
    #[error("grid of {rows}x{cols} is too small for a {min}x{min} stencil")]
    GridTooSmall { rows: usize, cols: usize, min: usize },
    #[error("grid shapes do not match ({0:?} vs {1:?})")]
    ShapeMismatch((usize, usize), (usize, usize)),
    #[error("invalid sample spacing {0}")]
    InvalidSpacing(T),
    #[error("profile of length {len} is too short (minimum {min})")]
    ProfileTooShort { len: usize, min: usize },
    #[error("non-finite sample at index {0} in a global transform")]
    NonFiniteInput(usize),
    #[error("invalid filter cutoff {0} (expected fraction of Nyquist in (0, 1))")]
    InvalidCutoff(T),
    #[error("invalid derivative order {0}")]
    InvalidOrder(u32),
    #[error("array shape error")]
    Shape(#[from] ShapeError),
}

/// The full set of grid derivatives computed by [`grid_derivatives`].
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct GridDerivatives<T> {
    pub dt_dx: Array2<T>,
    pub dt_dy: Array2<T>,
    pub thg: Array2<T>,
    pub dt_dz: Array2<T>,
    pub tilt: Array2<T>,
    pub analytic_signal: Array2<T>,
}

fn validate_grid<T>(grid: &Array2<T>, (dx, dy): (T, T)) -> Result<(), DerivError<T>>
where
    T: fXX,
{
    let (rows, cols) = grid.dim();

    if rows < 3 || cols < 3 {
        return Err(DerivError::GridTooSmall { rows, cols, min: 3 });
    }

    if !(dx > T::zero()) || !dx.is_finite() {
        return Err(DerivError::InvalidSpacing(dx));
    }

    if !(dy > T::zero()) || !dy.is_finite() {
        return Err(DerivError::InvalidSpacing(dy));
    }

    Ok(())
}

/// Horizontal derivatives `(dT/dx, dT/dy)` of a grid via the 3x3 Horn stencil.
///
/// `grid` has shape `(ny, nx)` with rows along y and columns along x. Border
/// cells and cells with any missing neighbor are `NaN`.
pub fn horizontal_gradients<T>(
    grid: &Array2<T>,
    spacing: (T, T),
) -> Result<(Array2<T>, Array2<T>), DerivError<T>>
where
    T: fXX,
{
    validate_grid(grid, spacing)?;

    let (rows, cols) = grid.dim();
    let (dx, dy) = spacing;
    let eight_dx = T!(8.0) * dx;
    let eight_dy = T!(8.0) * dy;

    let pairs: Vec<(T, T)> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![(T::nan(), T::nan()); cols];

            if row == 0 || row == rows - 1 {
                return row_data;
            }

            for col in 1..cols - 1 {
                let a = grid[(row - 1, col - 1)];
                let b = grid[(row - 1, col)];
                let c = grid[(row - 1, col + 1)];
                let d = grid[(row, col - 1)];
                let f = grid[(row, col + 1)];
                let g = grid[(row + 1, col - 1)];
                let h = grid[(row + 1, col)];
                let i = grid[(row + 1, col + 1)];

                if [a, b, c, d, f, g, h, i].iter().any(|v| !v.is_finite()) {
                    continue;
                }

                let gx = ((c + T!(2.0) * f + i) - (a + T!(2.0) * d + g)) / eight_dx;
                let gy = ((g + T!(2.0) * h + i) - (a + T!(2.0) * b + c)) / eight_dy;

                row_data[col] = (gx, gy);
            }

            row_data
        })
        .collect();

    let gx = Array2::from_shape_vec((rows, cols), pairs.iter().map(|p| p.0).collect())?;
    let gy = Array2::from_shape_vec((rows, cols), pairs.iter().map(|p| p.1).collect())?;

    Ok((gx, gy))
}

/// Total horizontal gradient `sqrt((dT/dx)² + (dT/dy)²)`.
pub fn total_horizontal_gradient<T>(
    dt_dx: &Array2<T>,
    dt_dy: &Array2<T>,
) -> Result<Array2<T>, DerivError<T>>
where
    T: fXX,
{
    if dt_dx.dim() != dt_dy.dim() {
        return Err(DerivError::ShapeMismatch(dt_dx.dim(), dt_dy.dim()));
    }

    Ok(Array2::from_shape_fn(dt_dx.dim(), |idx| {
        sqrt!(powi!(dt_dx[idx], 2) + powi!(dt_dy[idx], 2))
    }))
}

/// Vertical derivative of a grid via the Laplacian surrogate `-∇²T / 2`.
///
/// First-order approximation derived from potential-field harmonicity; see
/// the module docs. Border cells and cells with missing neighbors are `NaN`.
pub fn vertical_derivative_grid<T>(
    grid: &Array2<T>,
    spacing: (T, T),
) -> Result<Array2<T>, DerivError<T>>
where
    T: fXX,
{
    validate_grid(grid, spacing)?;

    let (rows, cols) = grid.dim();
    let (dx, dy) = spacing;
    let dx2 = powi!(dx, 2);
    let dy2 = powi!(dy, 2);

    Ok(Array2::from_shape_fn((rows, cols), |(row, col)| {
        if row == 0 || row == rows - 1 || col == 0 || col == cols - 1 {
            return T::nan();
        }

        let center = grid[(row, col)];
        let west = grid[(row, col - 1)];
        let east = grid[(row, col + 1)];
        let south = grid[(row - 1, col)];
        let north = grid[(row + 1, col)];

        if [center, west, east, south, north]
            .iter()
            .any(|v| !v.is_finite())
        {
            return T::nan();
        }

        let laplacian =
            (west + east - T!(2.0) * center) / dx2 + (south + north - T!(2.0) * center) / dy2;

        -laplacian / T!(2.0)
    }))
}

/// Tilt angle `atan2(dT/dz, THG)` in radians.
///
/// The total horizontal gradient is floored at `1e-10` to avoid the division
/// singularity over flat field regions; this is the one documented exception
/// to strict NaN propagation (a missing input still yields `NaN`).
pub fn tilt_angle<T>(dt_dz: &Array2<T>, thg: &Array2<T>) -> Result<Array2<T>, DerivError<T>>
where
    T: fXX,
{
    if dt_dz.dim() != thg.dim() {
        return Err(DerivError::ShapeMismatch(dt_dz.dim(), thg.dim()));
    }

    Ok(Array2::from_shape_fn(dt_dz.dim(), |idx| {
        let dz = dt_dz[idx];
        let h = thg[idx];

        if !dz.is_finite() || !h.is_finite() {
            return T::nan();
        }

        let h = if h > T!(1e-10) { h } else { T!(1e-10) };

        atan2!(dz, h)
    }))
}

/// Analytic signal amplitude `sqrt((dT/dx)² + (dT/dy)² + (dT/dz)²)`.
///
/// Always ≥ 0 where defined; independent of the magnetization direction.
pub fn analytic_signal<T>(
    dt_dx: &Array2<T>,
    dt_dy: &Array2<T>,
    dt_dz: &Array2<T>,
) -> Result<Array2<T>, DerivError<T>>
where
    T: fXX,
{
    if dt_dx.dim() != dt_dy.dim() {
        return Err(DerivError::ShapeMismatch(dt_dx.dim(), dt_dy.dim()));
    }

    if dt_dx.dim() != dt_dz.dim() {
        return Err(DerivError::ShapeMismatch(dt_dx.dim(), dt_dz.dim()));
    }

    Ok(Array2::from_shape_fn(dt_dx.dim(), |idx| {
        sqrt!(powi!(dt_dx[idx], 2) + powi!(dt_dy[idx], 2) + powi!(dt_dz[idx], 2))
    }))
}

/// Directional derivative of a grid at `azimuth` degrees clockwise from north.
pub fn directional_derivative<T>(
    grid: &Array2<T>,
    spacing: (T, T),
    azimuth: T,
) -> Result<Array2<T>, DerivError<T>>
where
    T: fXX,
{
    let (dt_dx, dt_dy) = horizontal_gradients(grid, spacing)?;

    let theta = (T!(90.0) - azimuth) * T::pi() / T!(180.0);
    let (ct, st) = (cos!(theta), sin!(theta));

    Ok(Array2::from_shape_fn(dt_dx.dim(), |idx| {
        dt_dx[idx] * ct + dt_dy[idx] * st
    }))
}

/// Compute the full derivative set of a grid in one pass.
pub fn grid_derivatives<T>(
    grid: &Array2<T>,
    spacing: (T, T),
) -> Result<GridDerivatives<T>, DerivError<T>>
where
    T: fXX,
{
    let (dt_dx, dt_dy) = horizontal_gradients(grid, spacing)?;
    let thg = total_horizontal_gradient(&dt_dx, &dt_dy)?;
    let dt_dz = vertical_derivative_grid(grid, spacing)?;
    let tilt = tilt_angle(&dt_dz, &thg)?;
    let analytic_signal = analytic_signal(&dt_dx, &dt_dy, &dt_dz)?;

    Ok(GridDerivatives {
        dt_dx,
        dt_dy,
        thg,
        dt_dz,
        tilt,
        analytic_signal,
    })
}

/// Gradient of a 1D profile: central differences, one-sided at the ends.
///
/// A missing neighbor makes the affected output sample `NaN`.
pub fn profile_gradient<T>(values: &[T], dx: T) -> Result<Vec<T>, DerivError<T>>
where
    T: fXX,
{
    if values.len() < 2 {
        return Err(DerivError::ProfileTooShort {
            len: values.len(),
            min: 2,
        });
    }

    if !(dx > T::zero()) || !dx.is_finite() {
        return Err(DerivError::InvalidSpacing(dx));
    }

    let n = values.len();

    Ok((0..n)
        .map(|idx| match idx {
            0 => (values[1] - values[0]) / dx,
            _ if idx == n - 1 => (values[n - 1] - values[n - 2]) / dx,
            _ => (values[idx + 1] - values[idx - 1]) / (T!(2.0) * dx),
        })
        .collect())
}
