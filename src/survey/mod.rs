//! Observation records, survey series and the inducing-field direction.
//!
//! # Observations
//!
//! A single scalar-field measurement is a [`SurveyObs`]: planar coordinates,
//! an optional elevation, the measured value, and optionally precomputed
//! spatial gradient channels. An ordered collection sharing one coordinate
//! reference is a [`SurveySeries`]; it is assembled once at load time and
//! read-only afterwards.
//!
//! Validity is explicit: [`SurveyObs::is_valid`] requires finite coordinates
//! and value, and [`SurveyObs::gradient`] returns gradients only when all
//! three channels are finite. Consumers document per operation whether
//! invalid samples propagate (stencil derivatives), are skipped (windowed
//! solves) or are rejected (global transforms).
//!
//! # Field direction
//!
//! [`FieldDirection`] holds the inducing-field orientation as inclination and
//! declination in degrees. It is immutable configuration shared by all
//! forward-model calls.

use crate::{
    fXX,
    math::{T, cos, sin},
};
use derive_more::IntoIterator;
use nalgebra::{DVector, Vector3};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors associated with the [`survey`](crate::survey) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("series is empty")]
    EmptySeries,
    #[error("invalid noise standard deviation")]
    InvalidNoise,
}

/// The orientation of the inducing/ambient magnetic field, in degrees.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct FieldDirection<T> {
    /// Magnetic inclination (degrees, positive downward).
    pub inclination: T,
    /// Magnetic declination (degrees, clockwise from north).
    pub declination: T,
}

impl<T> FieldDirection<T>
where
    T: fXX,
{
    /// Create a new [`FieldDirection`] from angles in degrees.
    pub fn new(inclination: T, declination: T) -> Self {
        Self {
            inclination,
            declination,
        }
    }

    /// Unit vector of the field direction in (east, north, down) components.
    pub fn unit_vector(&self) -> Vector3<T> {
        let inc = self.inclination * T::pi() / T!(180.0);
        let dec = self.declination * T::pi() / T!(180.0);

        Vector3::new(
            cos!(inc) * sin!(dec),
            cos!(inc) * cos!(dec),
            sin!(inc),
        )
    }
}

/// A single scalar-field observation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SurveyObs<T> {
    /// Easting coordinate.
    pub x: T,
    /// Northing coordinate.
    pub y: T,
    /// Optional elevation; absence encodes the surface (datum) assumption.
    pub z: Option<T>,
    /// Measured scalar field value.
    pub value: T,
    /// Optional precomputed spatial gradient channels `(d/dx, d/dy, d/dz)`.
    pub gradients: Option<[T; 3]>,
}

impl<T> SurveyObs<T>
where
    T: fXX,
{
    /// Create a surface observation without gradient channels.
    pub fn new(x: T, y: T, value: T) -> Self {
        Self {
            x,
            y,
            z: None,
            value,
            gradients: None,
        }
    }

    /// Attach precomputed gradient channels.
    pub fn with_gradients(mut self, gradients: [T; 3]) -> Self {
        self.gradients = Some(gradients);
        self
    }

    /// Returns the gradient channels if present and entirely finite.
    pub fn gradient(&self) -> Option<[T; 3]> {
        self.gradients
            .filter(|g| g.iter().all(|value| value.is_finite()))
    }

    /// Returns `true` if coordinates and value are finite.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.value.is_finite()
            && self.z.map(|z| z.is_finite()).unwrap_or(true)
    }
}

/// An ordered, read-after-load series of [`SurveyObs`].
#[derive(Clone, Debug, Deserialize, IntoIterator, Serialize)]
pub struct SurveySeries<T> {
    #[into_iterator(ref)]
    observations: Vec<SurveyObs<T>>,
}

impl<T> SurveySeries<T>
where
    T: fXX,
{
    /// Create a [`SurveySeries`] from an iterator over observations.
    pub fn from_iterator<I: IntoIterator<Item = SurveyObs<T>>>(iter: I) -> Self {
        Self {
            observations: iter.into_iter().collect(),
        }
    }

    /// Access an observation by index.
    pub fn get(&self, idx: usize) -> Option<&SurveyObs<T>> {
        self.observations.get(idx)
    }

    /// Returns `true` if the series contains no observations.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Returns the number of observations in the series.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Returns the number of valid observations.
    pub fn count_valid(&self) -> usize {
        self.into_iter().filter(|obs| obs.is_valid()).count()
    }

    /// Planar bounds `(x_min, x_max, y_min, y_max)` over valid observations.
    pub fn bounds(&self) -> Result<(T, T, T, T), SurveyError> {
        let mut bounds: Option<(T, T, T, T)> = None;

        for obs in self.into_iter().filter(|obs| obs.is_valid()) {
            bounds = Some(match bounds {
                None => (obs.x, obs.x, obs.y, obs.y),
                Some((x0, x1, y0, y1)) => (
                    if obs.x < x0 { obs.x } else { x0 },
                    if obs.x > x1 { obs.x } else { x1 },
                    if obs.y < y0 { obs.y } else { y0 },
                    if obs.y > y1 { obs.y } else { y1 },
                ),
            });
        }

        bounds.ok_or(SurveyError::EmptySeries)
    }

    /// The field values as a dense vector (invalid samples as NaN).
    pub fn values(&self) -> DVector<T> {
        DVector::from_iterator(
            self.len(),
            self.into_iter().map(|obs| match obs.is_valid() {
                true => obs.value,
                false => T::nan(),
            }),
        )
    }

    /// Return a copy of the series with seeded Gaussian noise added to the
    /// field values. Intended for synthetic validation series.
    pub fn with_noise(&self, std_dev: T, seed: u64) -> Result<Self, SurveyError>
    where
        StandardNormal: Distribution<T>,
    {
        if !(std_dev > T::zero()) {
            return Err(SurveyError::InvalidNoise);
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let normal = Normal::new(T::zero(), std_dev).map_err(|_| SurveyError::InvalidNoise)?;

        Ok(Self {
            observations: self
                .into_iter()
                .map(|obs| {
                    let mut obs = obs.clone();
                    obs.value += normal.sample(&mut rng);
                    obs
                })
                .collect(),
        })
    }
}
