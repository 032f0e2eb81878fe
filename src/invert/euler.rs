//! Euler deconvolution: sliding-window source location and depth estimation.
//!
//! Euler's homogeneity equation
//! `(x-x0)∂T/∂x + (y-y0)∂T/∂y + (z-z0)∂T/∂z = N(B-T)` is solved in
//! overlapping windows for the source position `(x0, y0, z0)` and a base
//! level, with the structural index `N` encoding the assumed source
//! geometry. Windows slide with 50% overlap; a window containing any
//! missing or non-finite input is skipped, as is any window whose local
//! system is degenerate or whose depth falls outside the plausible range —
//! a failed window produces no estimate, never a global failure.
//!
//! The target vector uses the observation datum elevation explicitly
//! (default 0, i.e. the classical surface-acquisition simplification);
//! surveys acquired off the datum plane should set
//! [`EulerSettings::datum_elevation`] to avoid biased depths.

use crate::{
    fXX,
    invert::InvertError,
    math::{T, complete_linkage},
    survey::SurveySeries,
};
use derive_builder::Builder;
use log::debug;
use nalgebra::{DMatrix, DVector, SVD};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Structural index: the homogeneity exponent encoding source geometry.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub enum StructuralIndex {
    /// Geological contact (N = 0).
    Contact,
    /// Dike or sill edge (N = 1).
    Dike,
    /// Horizontal cylinder or pipe (N = 2).
    Cylinder,
    /// Compact sphere-like body (N = 3).
    #[default]
    Sphere,
}

impl StructuralIndex {
    /// The numeric exponent `N`.
    pub fn value<T>(&self) -> T
    where
        T: fXX,
    {
        match self {
            StructuralIndex::Contact => T::zero(),
            StructuralIndex::Dike => T::one(),
            StructuralIndex::Cylinder => T!(2.0),
            StructuralIndex::Sphere => T!(3.0),
        }
    }
}

/// Settings for [`euler_deconvolution`].
#[derive(Builder, Clone, Debug, Deserialize, Serialize)]
pub struct EulerSettings<T>
where
    T: fXX,
{
    /// Assumed source geometry.
    #[builder(default)]
    pub structural_index: StructuralIndex,

    /// Number of samples per sliding window.
    #[builder(default = 5)]
    pub window: usize,

    /// Upper bound on plausible source depth; estimates outside
    /// `(0, depth_max)` are discarded, not stored.
    #[builder(default = T!(5000.0))]
    pub depth_max: T,

    /// Elevation of the observation datum entering the target vector.
    #[builder(default = T::zero())]
    pub datum_elevation: T,
}

/// A single accepted Euler solution.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[allow(missing_docs)]
pub struct SourceEstimate<T> {
    pub x0: T,
    pub y0: T,
    pub z0: T,
    pub base_level: T,
    pub residual_norm: T,
    pub n_points: usize,
    pub structural_index: StructuralIndex,
}

/// A group of nearby [`SourceEstimate`]s collapsed to a centroid.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[allow(missing_docs)]
pub struct SourceCluster<T> {
    pub x0: T,
    pub y0: T,
    pub z0: T,
    pub n_solutions: usize,
}

/// Run sliding-window Euler deconvolution over a series.
///
/// Every observation in the series must carry gradient channels; windows in
/// which any of the six inputs (coordinates, value, three gradients) is
/// missing or non-finite are skipped. Windows are solved independently in
/// parallel; the estimate list preserves window order.
pub fn euler_deconvolution<T>(
    series: &SurveySeries<T>,
    settings: &EulerSettings<T>,
) -> Result<Vec<SourceEstimate<T>>, InvertError<T>>
where
    T: fXX,
{
    if settings.window < 4 {
        return Err(InvertError::WindowTooSmall(settings.window));
    }

    if series.len() <= settings.window {
        return Err(InvertError::WindowTooLarge {
            window: settings.window,
            len: series.len(),
        });
    }

    if !(settings.depth_max > T::zero()) {
        return Err(InvertError::InvalidDepthBounds {
            z_min: T::zero(),
            z_max: settings.depth_max,
        });
    }

    let start = Instant::now();
    let window = settings.window;
    let stride = (window / 2).max(1);

    let starts = (0..series.len() - window)
        .step_by(stride)
        .collect::<Vec<usize>>();

    let estimates = starts
        .par_iter()
        .filter_map(|&first| solve_window(series, first, settings))
        .collect::<Vec<SourceEstimate<T>>>();

    debug!(
        "euler_deconvolution: {} windows -> {} estimates in {:.2} sec",
        starts.len(),
        estimates.len(),
        start.elapsed().as_millis() as f64 / 1e3
    );

    Ok(estimates)
}

fn solve_window<T>(
    series: &SurveySeries<T>,
    first: usize,
    settings: &EulerSettings<T>,
) -> Option<SourceEstimate<T>>
where
    T: fXX,
{
    let window = settings.window;
    let si = settings.structural_index.value::<T>();
    let datum = settings.datum_elevation;

    let mut rows = Vec::with_capacity(window);

    for idx in first..first + window {
        let obs = series.get(idx)?;

        if !obs.is_valid() {
            return None;
        }

        let [gx, gy, gz] = obs.gradient()?;

        rows.push((obs.x, obs.y, gx, gy, gz));
    }

    let design = DMatrix::from_fn(window, 4, |row, col| {
        let (.., gx, gy, gz) = rows[row];

        match col {
            0 => gx,
            1 => gy,
            2 => gz,
            _ => -si,
        }
    });

    let target = DVector::from_iterator(
        window,
        rows.iter().map(|&(x, y, gx, gy, gz)| x * gx + y * gy + datum * gz),
    );

    // Rank-deficient windows take the minimum-norm solution; a failed
    // decomposition just drops the window.
    let solution = SVD::new(design.clone(), true, true)
        .solve(&target, T!(1e-10))
        .ok()?;

    let (x0, y0, z0, base_level) = (solution[0], solution[1], solution[2], solution[3]);

    if !x0.is_finite() || !y0.is_finite() || !z0.is_finite() || !base_level.is_finite() {
        return None;
    }

    if !(z0 > T::zero() && z0 < settings.depth_max) {
        return None;
    }

    Some(SourceEstimate {
        x0,
        y0,
        z0,
        base_level,
        residual_norm: (design * &solution - target).norm(),
        n_points: window,
        structural_index: settings.structural_index,
    })
}

/// Filter estimates to the depth band `[z_min, z_max]`.
///
/// Idempotent: filtering an already-filtered table by the same band returns
/// an identical table.
pub fn depth_filter<T>(
    estimates: &[SourceEstimate<T>],
    z_min: T,
    z_max: T,
) -> Result<Vec<SourceEstimate<T>>, InvertError<T>>
where
    T: fXX,
{
    if !(z_min < z_max) {
        return Err(InvertError::InvalidDepthBounds { z_min, z_max });
    }

    Ok(estimates
        .iter()
        .filter(|estimate| estimate.z0 >= z_min && estimate.z0 <= z_max)
        .copied()
        .collect())
}

/// Collapse nearby estimates into [`SourceCluster`]s by complete-linkage
/// clustering over `(x0, y0, z0)` with the given distance radius.
///
/// Used to avoid over-counting one physical source sampled by overlapping
/// windows. Recomputed from scratch on every call; clusters are never
/// mutated in place.
pub fn cluster_sources<T>(
    estimates: &[SourceEstimate<T>],
    radius: T,
) -> Result<Vec<SourceCluster<T>>, InvertError<T>>
where
    T: fXX,
{
    let points = estimates
        .iter()
        .map(|estimate| [estimate.x0, estimate.y0, estimate.z0])
        .collect::<Vec<[T; 3]>>();

    let clusters =
        complete_linkage(&points, radius).map_err(|_| InvertError::InvalidClusterRadius(radius))?;

    Ok(clusters
        .into_iter()
        .map(|members| {
            let count = T::from_usize(members.len()).unwrap();

            let (sx, sy, sz) = members.iter().fold(
                (T::zero(), T::zero(), T::zero()),
                |(sx, sy, sz), &idx| {
                    (
                        sx + estimates[idx].x0,
                        sy + estimates[idx].y0,
                        sz + estimates[idx].z0,
                    )
                },
            );

            SourceCluster {
                x0: sx / count,
                y0: sy / count,
                z0: sz / count,
                n_solutions: members.len(),
            }
        })
        .collect())
}
