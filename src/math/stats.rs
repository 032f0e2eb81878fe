//! NaN-aware statistics and normalization routines.

use crate::{
    fXX,
    math::{MathError, T, exp, powi, sqrt},
};
use serde::{Deserialize, Serialize};

/// Minimum over the finite entries of `values`, or `NaN` if there are none.
pub fn nan_min<T>(values: &[T]) -> T
where
    T: fXX,
{
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold(T::nan(), |acc, &v| if !(acc <= v) { v } else { acc })
}

/// Maximum over the finite entries of `values`, or `NaN` if there are none.
pub fn nan_max<T>(values: &[T]) -> T
where
    T: fXX,
{
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold(T::nan(), |acc, &v| if !(acc >= v) { v } else { acc })
}

/// Mean over the finite entries of `values`, or `NaN` if there are none.
pub fn nan_mean<T>(values: &[T]) -> T
where
    T: fXX,
{
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((T::zero(), 0_usize), |(sum, count), &v| (sum + v, count + 1));

    match count {
        0 => T::nan(),
        _ => sum / T::from_usize(count).unwrap(),
    }
}

/// Population standard deviation over the finite entries of `values`.
pub fn nan_std<T>(values: &[T]) -> T
where
    T: fXX,
{
    let mean = nan_mean(values);

    if mean.is_nan() {
        return T::nan();
    }

    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((T::zero(), 0_usize), |(sum, count), &v| {
            (sum + powi!(v - mean, 2), count + 1)
        });

    sqrt!(sum / T::from_usize(count).unwrap())
}

/// Root mean square of `values` (all entries, no NaN filtering).
pub fn rms<T>(values: &[T]) -> T
where
    T: fXX,
{
    sqrt!(
        values.iter().map(|&v| powi!(v, 2)).sum::<T>() / T::from_usize(values.len().max(1)).unwrap()
    )
}

/// Descriptive statistics over the finite entries of a sample set.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[allow(missing_docs)]
pub struct DescriptiveStats<T> {
    pub n_total: usize,
    pub n_valid: usize,
    pub min: T,
    pub max: T,
    pub mean: T,
    pub std: T,
    pub median: T,
}

/// Compute [`DescriptiveStats`] for `values`, excluding NaN/inf entries.
pub fn descriptive_stats<T>(values: &[T]) -> Result<DescriptiveStats<T>, MathError<T>>
where
    T: fXX,
{
    let mut valid = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect::<Vec<T>>();

    if valid.is_empty() {
        return Err(MathError::NoValidSamples);
    }

    valid.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let median = match valid.len() % 2 {
        1 => valid[valid.len() / 2],
        _ => (valid[valid.len() / 2 - 1] + valid[valid.len() / 2]) / T!(2.0),
    };

    Ok(DescriptiveStats {
        n_total: values.len(),
        n_valid: valid.len(),
        min: valid[0],
        max: valid[valid.len() - 1],
        mean: nan_mean(&valid),
        std: nan_std(&valid),
        median,
    })
}

/// Normalization methods for sample sets and grids.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub enum NormalizeMethod<T> {
    /// Affine rescaling of the finite value range onto `[0, 1]`.
    #[default]
    MinMax,
    /// Centering on the mean, scaling by the standard deviation.
    ZScore,
    /// Affine rescaling of a percentile window onto `[0, 1]`, clipped.
    Percentile {
        /// Lower percentile (0 - 100).
        low: T,
        /// Upper percentile (0 - 100).
        high: T,
    },
}

/// Normalize `values` in place according to `method`.
///
/// Bounds are computed over finite entries only; NaN entries are preserved
/// as NaN in the output. A constant input maps to all-zero (min-max and
/// z-score) rather than dividing by zero.
pub fn normalize<T>(values: &mut [T], method: NormalizeMethod<T>) -> Result<(), MathError<T>>
where
    T: fXX,
{
    let valid = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect::<Vec<T>>();

    if valid.is_empty() {
        return Err(MathError::NoValidSamples);
    }

    match method {
        NormalizeMethod::MinMax => {
            let (vmin, vmax) = (nan_min(&valid), nan_max(&valid));
            let range = vmax - vmin;

            values.iter_mut().for_each(|v| {
                *v = match range > T::zero() {
                    true => (*v - vmin) / range,
                    false => *v * T::zero(),
                }
            });
        }
        NormalizeMethod::ZScore => {
            let (mean, std) = (nan_mean(&valid), nan_std(&valid));

            values.iter_mut().for_each(|v| {
                *v = match std > T::zero() {
                    true => (*v - mean) / std,
                    false => *v * T::zero(),
                }
            });
        }
        NormalizeMethod::Percentile { low, high } => {
            if !(T::zero() <= low && low < high && high <= T!(100.0)) {
                return Err(MathError::InvalidParameter {
                    name: "percentile window",
                    value: low,
                });
            }

            let p_low = percentile_sorted(&valid, low);
            let p_high = percentile_sorted(&valid, high);
            let range = p_high - p_low;

            values.iter_mut().for_each(|v| {
                *v = match range > T::zero() {
                    true => num_traits::clamp((*v - p_low) / range, T::zero(), T::one()),
                    false => *v * T::zero(),
                }
            });
        }
    }

    Ok(())
}

// Linear-interpolated percentile over a copy of the finite samples.
fn percentile_sorted<T>(valid: &[T], pct: T) -> T
where
    T: fXX,
{
    let mut sorted = valid.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let pos = pct / T!(100.0) * T::from_usize(sorted.len() - 1).unwrap();
    let idx: usize = num_traits::Float::floor(pos).as_();
    let frac = pos - T::from_usize(idx).unwrap();

    match idx + 1 < sorted.len() {
        true => sorted[idx] * (T::one() - frac) + sorted[idx + 1] * frac,
        false => sorted[idx],
    }
}

/// Indices and thresholds of samples beyond `mean ± sigma · std`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[allow(missing_docs)]
pub struct SigmaScreen<T> {
    pub threshold_high: T,
    pub threshold_low: T,
    pub high_indices: Vec<usize>,
    pub low_indices: Vec<usize>,
}

/// Screen a sample set for values beyond `sigma` standard deviations from the mean.
pub fn sigma_screen<T>(values: &[T], sigma: T) -> Result<SigmaScreen<T>, MathError<T>>
where
    T: fXX,
{
    if sigma <= T::zero() {
        return Err(MathError::InvalidParameter {
            name: "sigma",
            value: sigma,
        });
    }

    let mean = nan_mean(values);
    let std = nan_std(values);

    if mean.is_nan() {
        return Err(MathError::NoValidSamples);
    }

    let threshold_high = mean + sigma * std;
    let threshold_low = mean - sigma * std;

    Ok(SigmaScreen {
        threshold_high,
        threshold_low,
        high_indices: values
            .iter()
            .enumerate()
            .filter_map(|(idx, &v)| (v > threshold_high).then_some(idx))
            .collect(),
        low_indices: values
            .iter()
            .enumerate()
            .filter_map(|(idx, &v)| (v < threshold_low).then_some(idx))
            .collect(),
    })
}

/// Smooth a profile with a truncated (4σ) Gaussian kernel.
///
/// NaN entries are excluded from each local average and remain NaN in the
/// output when no finite neighbor falls inside the kernel support.
pub fn gaussian_smooth<T>(values: &[T], sigma: T) -> Result<Vec<T>, MathError<T>>
where
    T: fXX,
{
    if sigma <= T::zero() {
        return Err(MathError::InvalidParameter {
            name: "sigma",
            value: sigma,
        });
    }

    let radius: usize = num_traits::Float::ceil(sigma * T!(4.0)).as_();
    let radius = radius.max(1);

    let kernel = (0..=2 * radius)
        .map(|k| {
            let u = (T::from_usize(k).unwrap() - T::from_usize(radius).unwrap()) / sigma;
            exp!(-u * u / T!(2.0))
        })
        .collect::<Vec<T>>();

    Ok((0..values.len())
        .map(|idx| {
            let mut acc = T::zero();
            let mut norm = T::zero();

            for (k, &w) in kernel.iter().enumerate() {
                let j = idx as isize + k as isize - radius as isize;

                if j < 0 || j >= values.len() as isize {
                    continue;
                }

                let v = values[j as usize];

                if v.is_finite() {
                    acc += w * v;
                    norm += w;
                }
            }

            match norm > T::zero() {
                true => acc / norm,
                false => T::nan(),
            }
        })
        .collect())
}
