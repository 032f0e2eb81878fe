//! Frequency-domain operators for 1D profiles.
//!
//! Wavenumbers are in cycles per length unit (`fftfreq(n) / spacing`), so a
//! spacing of `1.0` reproduces index-space behavior. These are global
//! transforms: a single `NaN` would smear over the whole output, so
//! non-finite input is rejected up front rather than propagated.

use crate::{
    deriv::DerivError,
    fXX,
    math::{T, abs, exp},
};
use log::debug;
use rustfft::{FftNum, FftPlanner, num_complex::Complex};

fn validate_profile<T>(values: &[T], spacing: T) -> Result<(), DerivError<T>>
where
    T: fXX,
{
    if values.len() < 4 {
        return Err(DerivError::ProfileTooShort {
            len: values.len(),
            min: 4,
        });
    }

    if !(spacing > T::zero()) || !spacing.is_finite() {
        return Err(DerivError::InvalidSpacing(spacing));
    }

    if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
        return Err(DerivError::NonFiniteInput(idx));
    }

    Ok(())
}

// Discrete sample frequencies in cycles per length unit.
fn fftfreq<T>(n: usize, spacing: T) -> Vec<T>
where
    T: fXX,
{
    (0..n)
        .map(|idx| {
            let k = match idx <= (n - 1) / 2 {
                true => T::from_usize(idx).unwrap(),
                false => T::from_usize(idx).unwrap() - T::from_usize(n).unwrap(),
            };

            k / (T::from_usize(n).unwrap() * spacing)
        })
        .collect()
}

// Apply `factor(k)` to the spectrum of `values` and return the real part of
// the inverse transform.
fn spectral_apply<T, F>(values: &[T], spacing: T, factor: F) -> Vec<T>
where
    T: fXX + FftNum,
    F: Fn(T) -> Complex<T>,
{
    let n = values.len();
    let mut planner = FftPlanner::<T>::new();
    let fft_forward = planner.plan_fft_forward(n);
    let fft_inverse = planner.plan_fft_inverse(n);

    let mut buffer = values
        .iter()
        .map(|&v| Complex::new(v, T::zero()))
        .collect::<Vec<Complex<T>>>();

    fft_forward.process(&mut buffer);

    for (value, k) in buffer.iter_mut().zip(fftfreq(n, spacing)) {
        *value = *value * factor(k);
    }

    fft_inverse.process(&mut buffer);

    let scale = T::one() / T::from_usize(n).unwrap();

    buffer.into_iter().map(|v| v.re * scale).collect()
}

/// Vertical derivative of order `order` (1 or 2) of a profile.
///
/// Multiplies the spectrum by `(2πik)^order` and returns the real part of the
/// inverse transform.
pub fn vertical_derivative<T>(
    values: &[T],
    spacing: T,
    order: u32,
) -> Result<Vec<T>, DerivError<T>>
where
    T: fXX + FftNum,
{
    validate_profile(values, spacing)?;

    if !(1..=2).contains(&order) {
        return Err(DerivError::InvalidOrder(order));
    }

    debug!(
        "vertical_derivative: n={} order={} spacing={}",
        values.len(),
        order,
        spacing
    );

    Ok(spectral_apply(values, spacing, |k| {
        Complex::new(T::zero(), T::two_pi() * k).powu(order)
    }))
}

/// Upward continuation of a profile to height `height`.
///
/// Applies the attenuation `exp(-2π|k|h)` in the frequency domain, which
/// monotonically suppresses short wavelengths; used to emphasize deep sources
/// and suppress near-surface noise. `height` must be non-negative; zero is
/// the identity.
pub fn upward_continuation<T>(
    values: &[T],
    spacing: T,
    height: T,
) -> Result<Vec<T>, DerivError<T>>
where
    T: fXX + FftNum,
{
    validate_profile(values, spacing)?;

    if !(height >= T::zero()) || !height.is_finite() {
        return Err(DerivError::InvalidSpacing(height));
    }

    debug!(
        "upward_continuation: n={} height={} spacing={}",
        values.len(),
        height,
        spacing
    );

    Ok(spectral_apply(values, spacing, |k| {
        Complex::new(exp!(-T::two_pi() * abs!(k) * height), T::zero())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::nan_max;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    const N: usize = 128;

    fn sine(cycles: f64) -> Vec<f64> {
        (0..N)
            .map(|i| (2.0 * PI * cycles * i as f64 / N as f64).sin())
            .collect()
    }

    #[test]
    fn test_first_derivative_of_sine() {
        // d/dx sin(2πfx/N) = (2πf/N) cos(2πfx/N) for an exact bin frequency.
        let deriv = vertical_derivative(&sine(4.0), 1.0, 1).unwrap();
        let scale = 2.0 * PI * 4.0 / N as f64;

        for (i, &d) in deriv.iter().enumerate() {
            let expected = scale * (2.0 * PI * 4.0 * i as f64 / N as f64).cos();
            assert_relative_eq!(d, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_second_derivative_of_sine() {
        let deriv = vertical_derivative(&sine(4.0), 1.0, 2).unwrap();
        let scale = (2.0 * PI * 4.0 / N as f64).powi(2);

        for (&d, &s) in deriv.iter().zip(sine(4.0).iter()) {
            assert_relative_eq!(d, -scale * s, epsilon = 1e-9, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_upward_continuation_attenuates_sine() {
        let height = 8.0;
        let continued = upward_continuation(&sine(4.0), 1.0, height).unwrap();

        let expected = (-2.0 * PI * (4.0 / N as f64) * height).exp();
        let amplitude = nan_max(&continued);

        assert_relative_eq!(amplitude, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_upward_continuation_zero_height_identity() {
        let values = sine(3.0);
        let continued = upward_continuation(&values, 1.0, 0.0).unwrap();

        for (&a, &b) in continued.iter().zip(values.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_rejects_non_finite_input() {
        let mut values = sine(2.0);
        values[10] = f64::NAN;

        assert!(matches!(
            vertical_derivative(&values, 1.0, 1),
            Err(DerivError::NonFiniteInput(10))
        ));
    }
}
