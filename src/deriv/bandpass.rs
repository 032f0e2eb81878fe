//! Zero-phase Butterworth filtering for band-pass separation.
//!
//! Filters are cascades of biquad (second-order) sections in Direct Form II
//! Transposed, designed from the analog Butterworth prototype poles via the
//! bilinear transform. Zero-phase response is obtained by running the cascade
//! forward and backward over an odd-reflection padded copy of the profile,
//! which cancels the phase distortion of a single pass.

use crate::{
    deriv::DerivError,
    fXX,
    math::{T, abs, cos, powi, sin, sqrt, tan},
};
use num_complex::Complex;

/// A single biquad section `H(z) = (b0 + b1 z⁻¹ + b2 z⁻²) / (1 + a1 z⁻¹ + a2 z⁻²)`.
#[derive(Clone, Debug)]
pub struct Biquad<T> {
    b: [T; 3],
    a: [T; 2],
}

impl<T> Biquad<T>
where
    T: fXX,
{
    /// Run the section over `values` (Direct Form II Transposed, zero initial state).
    fn run(&self, values: &mut [T]) {
        let mut s1 = T::zero();
        let mut s2 = T::zero();

        for value in values.iter_mut() {
            let out = self.b[0] * *value + s1;
            s1 = self.b[1] * *value - self.a[0] * out + s2;
            s2 = self.b[2] * *value - self.a[1] * out;
            *value = out;
        }
    }

    /// Returns `true` if both poles lie inside the unit circle.
    pub fn is_stable(&self) -> bool {
        abs!(self.a[1]) < T::one() && abs!(self.a[0]) < T::one() + self.a[1]
    }
}

/// The pass-band placement of a [`Butterworth`] cascade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Band {
    Lowpass,
    Highpass,
}

/// A Butterworth filter as a cascade of biquad sections.
#[derive(Clone, Debug)]
pub struct Butterworth<T> {
    sections: Vec<Biquad<T>>,
    order: usize,
}

impl<T> Butterworth<T>
where
    T: fXX,
{
    /// Design a low-pass filter. `cutoff` is a fraction of the Nyquist
    /// frequency, strictly inside `(0, 1)`.
    pub fn lowpass(order: usize, cutoff: T) -> Result<Self, DerivError<T>> {
        Self::design(order, cutoff, Band::Lowpass)
    }

    /// Design a high-pass filter. `cutoff` is a fraction of the Nyquist
    /// frequency, strictly inside `(0, 1)`.
    pub fn highpass(order: usize, cutoff: T) -> Result<Self, DerivError<T>> {
        Self::design(order, cutoff, Band::Highpass)
    }

    fn design(order: usize, cutoff: T, band: Band) -> Result<Self, DerivError<T>> {
        if order == 0 || order > 20 {
            return Err(DerivError::InvalidOrder(order as u32));
        }

        if !(cutoff > T::zero() && cutoff < T::one()) || !cutoff.is_finite() {
            return Err(DerivError::InvalidCutoff(cutoff));
        }

        // Unit sample rate; the cutoff fraction of Nyquist maps to fc = cutoff / 2.
        let k = T!(2.0);
        let wc = k * tan!(T::half_pi() * cutoff);

        let mut sections = Vec::with_capacity(order.div_ceil(2));
        let mut remaining = order;

        // Analog prototype poles on the left unit semicircle, taken as
        // conjugate pairs; odd orders leave one real pole.
        for pair in 0..order / 2 {
            let theta =
                T::pi() * T::from_usize(2 * pair + order + 1).unwrap() / T::from_usize(2 * order).unwrap();
            let pole = Complex::new(cos!(theta), sin!(theta)) * wc;

            sections.push(bilinear_2pole(pole, k, band));
            remaining -= 2;
        }

        if remaining == 1 {
            sections.push(bilinear_1pole(-wc, k, band));
        }

        Ok(Self { sections, order })
    }

    /// The filter order.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Returns `true` if every section is stable.
    pub fn is_stable(&self) -> bool {
        self.sections.iter().all(|s| s.is_stable())
    }

    /// Magnitude of the frequency response at `frequency` (fraction of Nyquist).
    pub fn magnitude(&self, frequency: T) -> T {
        let omega = T::pi() * frequency;
        let z_inv = Complex::new(cos!(omega), -sin!(omega));
        let z_inv2 = z_inv * z_inv;

        let mut response = Complex::new(T::one(), T::zero());

        for section in &self.sections {
            let num = Complex::new(section.b[0], T::zero())
                + Complex::new(section.b[1], T::zero()) * z_inv
                + Complex::new(section.b[2], T::zero()) * z_inv2;
            let den = Complex::new(T::one(), T::zero())
                + Complex::new(section.a[0], T::zero()) * z_inv
                + Complex::new(section.a[1], T::zero()) * z_inv2;

            response = response * num / den;
        }

        sqrt_norm(response)
    }

    /// Apply the cascade forward and backward (zero-phase) over `values`.
    ///
    /// The profile is extended at both ends by odd reflection before
    /// filtering, which suppresses the start-up transient of each pass. The
    /// input must be finite everywhere (global transform).
    pub fn filtfilt(&self, values: &[T]) -> Result<Vec<T>, DerivError<T>> {
        let pad = 3 * (self.order + 1);

        if values.len() <= pad {
            return Err(DerivError::ProfileTooShort {
                len: values.len(),
                min: pad + 1,
            });
        }

        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(DerivError::NonFiniteInput(idx));
        }

        let n = values.len();
        let first = values[0];
        let last = values[n - 1];

        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((0..pad).map(|j| T!(2.0) * first - values[pad - j]));
        extended.extend_from_slice(values);
        extended.extend((0..pad).map(|j| T!(2.0) * last - values[n - 2 - j]));

        for section in &self.sections {
            section.run(&mut extended);
        }

        extended.reverse();

        for section in &self.sections {
            section.run(&mut extended);
        }

        extended.reverse();

        Ok(extended[pad..pad + n].to_vec())
    }
}

// |c| for Complex<T> without requiring Float on the complex type.
fn sqrt_norm<T>(c: Complex<T>) -> T
where
    T: fXX,
{
    sqrt!(powi!(c.re, 2) + powi!(c.im, 2))
}

// Bilinear transform of a complex-conjugate analog pole pair.
fn bilinear_2pole<T>(pole: Complex<T>, k: T, band: Band) -> Biquad<T>
where
    T: fXX,
{
    let p_re = pole.re;
    let p_mag_sq = powi!(pole.re, 2) + powi!(pole.im, 2);
    let k2 = powi!(k, 2);
    let d = k2 - T!(2.0) * k * p_re + p_mag_sq;

    let b = match band {
        Band::Lowpass => [p_mag_sq / d, T!(2.0) * p_mag_sq / d, p_mag_sq / d],
        Band::Highpass => [k2 / d, -T!(2.0) * k2 / d, k2 / d],
    };

    let a = [
        T!(2.0) * (p_mag_sq - k2) / d,
        (k2 + T!(2.0) * k * p_re + p_mag_sq) / d,
    ];

    Biquad { b, a }
}

// Bilinear transform of a single real analog pole.
fn bilinear_1pole<T>(p: T, k: T, band: Band) -> Biquad<T>
where
    T: fXX,
{
    let alpha = k - p;
    let beta = k + p;

    let b = match band {
        Band::Lowpass => [-p / alpha, -p / alpha, T::zero()],
        Band::Highpass => [k / alpha, -k / alpha, T::zero()],
    };

    Biquad {
        b,
        a: [-beta / alpha, T::zero()],
    }
}

/// Low-pass a profile with a zero-phase 4th-order Butterworth filter.
pub fn low_pass<T>(values: &[T], cutoff: T) -> Result<Vec<T>, DerivError<T>>
where
    T: fXX,
{
    Butterworth::lowpass(4, cutoff)?.filtfilt(values)
}

/// High-pass a profile with a zero-phase 4th-order Butterworth filter.
pub fn high_pass<T>(values: &[T], cutoff: T) -> Result<Vec<T>, DerivError<T>>
where
    T: fXX,
{
    Butterworth::highpass(4, cutoff)?.filtfilt(values)
}

/// Band-pass a profile by chaining the 4th-order high-pass and low-pass.
pub fn band_pass<T>(values: &[T], low_cut: T, high_cut: T) -> Result<Vec<T>, DerivError<T>>
where
    T: fXX,
{
    if !(low_cut < high_cut) {
        return Err(DerivError::InvalidCutoff(low_cut));
    }

    low_pass(&high_pass(values, low_cut)?, high_cut)
}
