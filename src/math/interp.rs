//! Interpolation primitives for scattered samples and regular grids.

use crate::{
    fXX,
    math::{MathError, T, powf, powi, sqrt},
};
use ndarray::Array2;

/// Interpolate scattered samples onto a regular grid by inverse-distance
/// weighting.
///
/// `x_axis`/`y_axis` are the grid node coordinates; the output has shape
/// `(y_axis.len(), x_axis.len())`. Non-finite samples are ignored. Distances
/// are floored at a small fraction of the grid spacing, so a node coinciding
/// with a sample takes (almost exactly) that sample's value. Nodes receive
/// `NaN` only when no finite sample exists at all.
pub fn idw_to_grid<T>(
    x: &[T],
    y: &[T],
    values: &[T],
    x_axis: &[T],
    y_axis: &[T],
    power: T,
) -> Result<Array2<T>, MathError<T>>
where
    T: fXX,
{
    if x.len() != y.len() {
        return Err(MathError::LengthMismatch(x.len(), y.len()));
    }

    if x.len() != values.len() {
        return Err(MathError::LengthMismatch(x.len(), values.len()));
    }

    if power <= T::zero() {
        return Err(MathError::InvalidParameter {
            name: "power",
            value: power,
        });
    }

    let mut out = Array2::from_elem((y_axis.len(), x_axis.len()), T::nan());

    for (row, &yn) in y_axis.iter().enumerate() {
        for (col, &xn) in x_axis.iter().enumerate() {
            let mut num = T::zero();
            let mut den = T::zero();

            for ((&xs, &ys), &vs) in x.iter().zip(y.iter()).zip(values.iter()) {
                if !vs.is_finite() || !xs.is_finite() || !ys.is_finite() {
                    continue;
                }

                let d = sqrt!(powi!(xs - xn, 2) + powi!(ys - yn, 2));
                let d = if d > T!(1e-9) { d } else { T!(1e-9) };
                let w = T::one() / powf!(d, power);

                num += w * vs;
                den += w;
            }

            if den > T::zero() {
                out[(row, col)] = num / den;
            }
        }
    }

    Ok(out)
}

/// Sample a regular grid bilinearly at `(x, y)`.
///
/// `grid` has shape `(ny, nx)` with row 0 at `y_min`; the extent spans the
/// node coordinates `[x_min, x_max] × [y_min, y_max]`. Points outside the
/// extent yield `NaN`, as does any interpolation involving a `NaN` corner.
pub fn bilinear_sample<T>(
    grid: &Array2<T>,
    (x_min, x_max): (T, T),
    (y_min, y_max): (T, T),
    x: T,
    y: T,
) -> T
where
    T: fXX,
{
    let (ny, nx) = grid.dim();

    if nx < 2 || ny < 2 || x < x_min || x > x_max || y < y_min || y > y_max {
        return T::nan();
    }

    let fx = (x - x_min) / (x_max - x_min) * T::from_usize(nx - 1).unwrap();
    let fy = (y - y_min) / (y_max - y_min) * T::from_usize(ny - 1).unwrap();

    let col: usize = num_traits::Float::floor(fx).as_();
    let row: usize = num_traits::Float::floor(fy).as_();
    let col = col.min(nx - 2);
    let row = row.min(ny - 2);

    let tx = fx - T::from_usize(col).unwrap();
    let ty = fy - T::from_usize(row).unwrap();

    let v00 = grid[(row, col)];
    let v01 = grid[(row, col + 1)];
    let v10 = grid[(row + 1, col)];
    let v11 = grid[(row + 1, col + 1)];

    v00 * (T::one() - tx) * (T::one() - ty)
        + v01 * tx * (T::one() - ty)
        + v10 * (T::one() - tx) * ty
        + v11 * tx * ty
}
