//! Closed-form approximate magnetic responses of simple sources.
//!
//! # Approximation
//!
//! The sphere response is a simplified scalar dipole term: the anomaly is
//! proportional to `m · (3cos²θ - 1) / r³`, where `θ` is the angle of the
//! source-to-observation vector from the vertical and `m` the magnetic
//! moment. This is a vertical-anomaly-like scalar, **not** a full vector
//! total-field anomaly projected onto the ambient field; the inducing-field
//! direction enters only through the moment magnitude. The approximation is
//! intentional and should be treated as non-rigorous by consumers that need
//! calibrated amplitudes.
//!
//! Prism responses are superpositions of equal-volume sub-spheres over a
//! fixed sub-grid; superposition is exact for linear, non-interacting
//! sources, so the accuracy is limited only by the sub-discretization.

use crate::{
    fXX,
    math::{T, powf, powi, sqrt},
    survey::{FieldDirection, SurveyObs, SurveySeries},
};
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};

/// μ₀ / 4π expressed so that responses come out in nT for SI inputs.
fn moment_factor<T>() -> T
where
    T: fXX,
{
    // mu_0 * 1e9 / (4 pi) with mu_0 = 4 pi * 1e-7.
    T!(1e-7) * T!(1e9)
}

/// A uniformly magnetized sphere source.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct SphereSource<T> {
    /// Center easting.
    pub x: T,
    /// Center northing.
    pub y: T,
    /// Center depth (positive down).
    pub z: T,
    /// Sphere radius.
    pub radius: T,
    /// Magnetic susceptibility (SI).
    pub susceptibility: T,
}

impl<T> SphereSource<T>
where
    T: fXX,
{
    /// Create a new [`SphereSource`].
    pub fn new(x: T, y: T, z: T, radius: T, susceptibility: T) -> Self {
        Self {
            x,
            y,
            z,
            radius,
            susceptibility,
        }
    }

    /// Magnetic moment `V · κ` of the sphere.
    pub fn moment(&self) -> T {
        T::four_pi() / T!(3.0) * powi!(self.radius, 3) * self.susceptibility
    }

    /// Predicted anomaly at a single observation point `(x, y, z)`.
    ///
    /// `z` is the observation elevation on the same positive-down axis as the
    /// source depth (surface observations are `z = 0`). The source-observation
    /// distance is floored at one length unit to avoid the singularity at the
    /// source center. `direction` is part of the model configuration but only
    /// scales through the moment magnitude; see the module docs.
    pub fn anomaly_at(&self, _direction: &FieldDirection<T>, x: T, y: T, z: T) -> T {
        let dx = x - self.x;
        let dy = y - self.y;
        let dz = z - self.z;

        let r = floored_distance(dx, dy, dz);
        let cos_theta = dz / r;

        moment_factor::<T>() * self.moment() * (T!(3.0) * powi!(cos_theta, 2) - T::one())
            / powi!(r, 3)
    }

    /// Analytic spatial gradient `(∂T/∂x, ∂T/∂y, ∂T/∂z)` of the sphere
    /// response at an observation point, on the same floored-distance model
    /// as [`SphereSource::anomaly_at`].
    pub fn gradient_at(&self, x: T, y: T, z: T) -> Vector3<T> {
        let dx = x - self.x;
        let dy = y - self.y;
        let dz = z - self.z;

        let r = floored_distance(dx, dy, dz);
        let r2 = powi!(r, 2);
        let r7 = powi!(r, 7);
        let dz2 = powi!(dz, 2);

        let f = moment_factor::<T>() * self.moment();
        let horizontal = T!(3.0) * f * (r2 - T!(5.0) * dz2) / r7;

        Vector3::new(
            horizontal * dx,
            horizontal * dy,
            T!(3.0) * f * dz * (T!(3.0) * r2 - T!(5.0) * dz2) / r7,
        )
    }

    /// Predicted anomaly over all valid observations of a series.
    ///
    /// Observations without an elevation are taken at the datum (`z = 0`);
    /// invalid observations yield `NaN`.
    pub fn anomaly_series(
        &self,
        direction: &FieldDirection<T>,
        series: &SurveySeries<T>,
    ) -> DVector<T> {
        DVector::from_iterator(
            series.len(),
            series.into_iter().map(|obs| match obs.is_valid() {
                true => self.anomaly_at(direction, obs.x, obs.y, obs.z.unwrap_or(T::zero())),
                false => T::nan(),
            }),
        )
    }

    /// Generate a synthetic survey over a regular `nx × ny` grid of surface
    /// observations spanning `(x_min..x_max, y_min..y_max)`, with gradient
    /// channels filled from [`SphereSource::gradient_at`].
    pub fn synthetic_survey(
        &self,
        direction: &FieldDirection<T>,
        (x_min, x_max): (T, T),
        (y_min, y_max): (T, T),
        (nx, ny): (usize, usize),
    ) -> SurveySeries<T> {
        let x_at = |idx: usize| {
            x_min
                + (x_max - x_min) * T::from_usize(idx).unwrap()
                    / T::from_usize(nx.max(2) - 1).unwrap()
        };
        let y_at = |idx: usize| {
            y_min
                + (y_max - y_min) * T::from_usize(idx).unwrap()
                    / T::from_usize(ny.max(2) - 1).unwrap()
        };

        SurveySeries::from_iterator((0..ny).flat_map(|row| {
            (0..nx).map(move |col| {
                let (x, y) = (x_at(col), y_at(row));
                let gradient = self.gradient_at(x, y, T::zero());

                SurveyObs::new(x, y, self.anomaly_at(direction, x, y, T::zero()))
                    .with_gradients([gradient[0], gradient[1], gradient[2]])
            })
        }))
    }
}

/// A rectangular prism source, discretized into sub-spheres.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct PrismSource<T> {
    /// Easting extent `(x1, x2)`.
    pub x: (T, T),
    /// Northing extent `(y1, y2)`.
    pub y: (T, T),
    /// Depth extent `(z1, z2)`, positive down.
    pub z: (T, T),
    /// Magnetic susceptibility (SI).
    pub susceptibility: T,
}

impl<T> PrismSource<T>
where
    T: fXX,
{
    /// Sub-cell centers and the equivalent sphere for a given subdivision.
    ///
    /// Centers are placed on an inclusive grid spanning the prism faces; each
    /// sub-cell is represented by a sphere of equal volume.
    fn sub_spheres(&self, (nx, ny, nz): (usize, usize, usize)) -> Vec<SphereSource<T>> {
        let (nx, ny, nz) = (nx.max(1), ny.max(1), nz.max(1));

        let cell_volume = (self.x.1 - self.x.0) / T::from_usize(nx).unwrap()
            * ((self.y.1 - self.y.0) / T::from_usize(ny).unwrap())
            * ((self.z.1 - self.z.0) / T::from_usize(nz).unwrap());

        let radius = equivalent_radius(cell_volume);

        let axis = |lo: T, hi: T, n: usize| {
            (0..n)
                .map(move |idx| match n {
                    1 => lo,
                    _ => {
                        lo + (hi - lo) * T::from_usize(idx).unwrap()
                            / T::from_usize(n - 1).unwrap()
                    }
                })
                .collect::<Vec<T>>()
        };

        let xs = axis(self.x.0, self.x.1, nx);
        let ys = axis(self.y.0, self.y.1, ny);
        let zs = axis(self.z.0, self.z.1, nz);

        let mut spheres = Vec::with_capacity(nx * ny * nz);

        for &x in &xs {
            for &y in &ys {
                for &z in &zs {
                    spheres.push(SphereSource::new(x, y, z, radius, self.susceptibility));
                }
            }
        }

        spheres
    }

    /// Predicted anomaly of the prism over a series, as the exact linear
    /// superposition of its sub-sphere responses.
    ///
    /// Accuracy improves with a finer `subdivision` at proportional cost;
    /// `(3, 3, 3)` is the conventional default.
    pub fn anomaly_series(
        &self,
        direction: &FieldDirection<T>,
        series: &SurveySeries<T>,
        subdivision: (usize, usize, usize),
    ) -> DVector<T> {
        let spheres = self.sub_spheres(subdivision);

        let mut total = DVector::zeros(series.len());

        for sphere in &spheres {
            total += sphere.anomaly_series(direction, series);
        }

        total
    }
}

/// Radius of the sphere with the same volume as `volume`.
pub fn equivalent_radius<T>(volume: T) -> T
where
    T: fXX,
{
    powf!(T!(3.0) * volume / T::four_pi(), T::one() / T!(3.0))
}

fn floored_distance<T>(dx: T, dy: T, dz: T) -> T
where
    T: fXX,
{
    let r = sqrt!(powi!(dx, 2) + powi!(dy, 2) + powi!(dz, 2));

    if r > T::one() { r } else { T::one() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn direction() -> FieldDirection<f64> {
        FieldDirection::new(45.0, 0.0)
    }

    #[test]
    fn test_sphere_anomaly_peak_over_source() {
        let source = SphereSource::new(0.0, 0.0, 100.0, 50.0, 0.05);

        // Directly above the source cos²θ = 1 and the anomaly is positive;
        // far to the side it decays toward zero.
        let above = source.anomaly_at(&direction(), 0.0, 0.0, 0.0);
        let aside = source.anomaly_at(&direction(), 2000.0, 0.0, 0.0);

        assert!(above > 0.0);
        assert!(above.abs() > aside.abs() * 100.0);

        // m·(3cos²θ-1)/r³ with factor 100, m = 4π/3·50³·0.05.
        let moment = 4.0 / 3.0 * std::f64::consts::PI * 50.0_f64.powi(3) * 0.05;
        assert_relative_eq!(above, 100.0 * moment * 2.0 / 100.0_f64.powi(3), epsilon = 1e-9);
    }

    #[test]
    fn test_distance_floor_avoids_singularity() {
        let source = SphereSource::new(0.0, 0.0, 0.0, 10.0, 0.1);

        let at_center = source.anomaly_at(&direction(), 0.0, 0.0, 0.0);

        assert!(at_center.is_finite());
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let source = SphereSource::new(0.0, 0.0, 100.0, 50.0, 0.05);
        let dir = direction();
        let (x, y, z) = (130.0, -70.0, 0.0);
        let h = 1e-3;

        let gradient = source.gradient_at(x, y, z);

        let fd_x = (source.anomaly_at(&dir, x + h, y, z) - source.anomaly_at(&dir, x - h, y, z))
            / (2.0 * h);
        let fd_y = (source.anomaly_at(&dir, x, y + h, z) - source.anomaly_at(&dir, x, y - h, z))
            / (2.0 * h);
        let fd_z = (source.anomaly_at(&dir, x, y, z + h) - source.anomaly_at(&dir, x, y, z - h))
            / (2.0 * h);

        assert_relative_eq!(gradient[0], fd_x, epsilon = 1e-8, max_relative = 1e-5);
        assert_relative_eq!(gradient[1], fd_y, epsilon = 1e-8, max_relative = 1e-5);
        assert_relative_eq!(gradient[2], fd_z, epsilon = 1e-8, max_relative = 1e-5);
    }

    #[test]
    fn test_prism_equals_sub_sphere_superposition() {
        let prism = PrismSource {
            x: (-100.0, 100.0),
            y: (-100.0, 100.0),
            z: (50.0, 250.0),
            susceptibility: 0.02,
        };

        let series = SurveySeries::from_iterator(
            (0..25).map(|idx| SurveyObs::new((idx % 5) as f64 * 100.0 - 200.0,
                                             (idx / 5) as f64 * 100.0 - 200.0, 0.0)),
        );

        let total = prism.anomaly_series(&direction(), &series, (3, 3, 3));

        // Rebuild the superposition by hand from the same sub-spheres.
        let spheres = prism.sub_spheres((3, 3, 3));
        assert_eq!(spheres.len(), 27);

        let mut manual = DVector::zeros(series.len());
        for sphere in &spheres {
            manual += sphere.anomaly_series(&direction(), &series);
        }

        for idx in 0..series.len() {
            assert_relative_eq!(total[idx], manual[idx]);
        }
    }

    #[test]
    fn test_prism_response_is_linear_in_susceptibility() {
        let base = PrismSource {
            x: (-50.0, 50.0),
            y: (-50.0, 50.0),
            z: (100.0, 200.0),
            susceptibility: 0.01,
        };
        let double = PrismSource {
            susceptibility: 0.02,
            ..base
        };

        let series =
            SurveySeries::from_iterator((0..9).map(|idx| SurveyObs::new(idx as f64 * 50.0, 0.0, 0.0)));

        let a = base.anomaly_series(&direction(), &series, (2, 2, 2));
        let b = double.anomaly_series(&direction(), &series, (2, 2, 2));

        for idx in 0..series.len() {
            assert_relative_eq!(2.0 * a[idx], b[idx], epsilon = 1e-10, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_equivalent_radius_round_trip() {
        let radius = 37.0_f64;
        let volume = 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3);

        assert_relative_eq!(equivalent_radius(volume), radius, epsilon = 1e-9);
    }
}
