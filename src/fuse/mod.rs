//! Prospectivity fusion of magnetic evidence and surface indicator layers.
//!
//! Every input layer — the magnetic layer and one or more independently
//! derived indicator layers — is interpolated onto a common regular grid
//! spanning the intersection of the input extents, normalized on its own,
//! and combined: indicators are averaged into one surface, then the weighted
//! sum with the magnetic layer is renormalized to `[0, 1]`. The component
//! grids are retained for traceability. The map is regenerated from scratch
//! whenever weights or inputs change.

use crate::{
    fXX,
    math::{NormalizeMethod, T, bilinear_sample, idw_to_grid, nan_max, nan_min, normalize},
};
use derive_builder::Builder;
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;

/// Errors associated with the [`fuse`](crate::fuse) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum FuseError {
    #[error("layer has mismatched coordinate/value lengths ({0} vs {1})")]
    LengthMismatch(usize, usize),
    #[error("no indicator layers supplied")]
    NoIndicators,
    #[error("layer {0} contains no finite samples")]
    EmptyLayer(usize),
    #[error("input extents do not intersect")]
    DisjointExtents,
    #[error("layer has no finite samples over the common grid")]
    NoFiniteOverlap,
    #[error("combination weights must be positive")]
    InvalidWeights,
    #[error("inverse-distance power must be positive")]
    InvalidPower,
}

/// A single input layer: scattered samples or an already-gridded surface.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Layer<T> {
    /// Scattered point samples.
    Points {
        /// Easting coordinates.
        x: Vec<T>,
        /// Northing coordinates.
        y: Vec<T>,
        /// Sample values.
        values: Vec<T>,
    },
    /// A regular grid with row 0 at `y_min`.
    Grid {
        /// Grid values, shape `(ny, nx)`.
        values: Array2<T>,
        /// Easting extent `(x_min, x_max)`.
        x_extent: (T, T),
        /// Northing extent `(y_min, y_max)`.
        y_extent: (T, T),
    },
}

impl<T> Layer<T>
where
    T: fXX,
{
    fn extent(&self) -> Option<((T, T), (T, T))> {
        match self {
            Layer::Points { x, y, .. } => {
                let (x_min, x_max) = (nan_min(x), nan_max(x));
                let (y_min, y_max) = (nan_min(y), nan_max(y));

                (x_min.is_finite() && y_min.is_finite())
                    .then_some(((x_min, x_max), (y_min, y_max)))
            }
            Layer::Grid {
                x_extent, y_extent, ..
            } => Some((*x_extent, *y_extent)),
        }
    }

    fn has_finite_samples(&self) -> bool {
        match self {
            Layer::Points { values, .. } => values.iter().any(|v| v.is_finite()),
            Layer::Grid { values, .. } => values.iter().any(|v| v.is_finite()),
        }
    }

    fn validate(&self, index: usize) -> Result<(), FuseError> {
        if let Layer::Points { x, y, values } = self {
            if x.len() != y.len() {
                return Err(FuseError::LengthMismatch(x.len(), y.len()));
            }

            if x.len() != values.len() {
                return Err(FuseError::LengthMismatch(x.len(), values.len()));
            }
        }

        match self.has_finite_samples() {
            true => Ok(()),
            false => Err(FuseError::EmptyLayer(index)),
        }
    }

    // Resample the layer onto the common grid axes.
    fn to_grid(&self, x_axis: &[T], y_axis: &[T], idw_power: T) -> Array2<T> {
        match self {
            Layer::Points { x, y, values } => {
                idw_to_grid(x, y, values, x_axis, y_axis, idw_power)
                    .expect("layer lengths validated")
            }
            Layer::Grid {
                values,
                x_extent,
                y_extent,
            } => Array2::from_shape_fn((y_axis.len(), x_axis.len()), |(row, col)| {
                bilinear_sample(values, *x_extent, *y_extent, x_axis[col], y_axis[row])
            }),
        }
    }
}

/// Settings for [`combine_prospectivity`].
#[derive(Builder, Clone, Debug, Deserialize, Serialize)]
pub struct ProspectivitySettings<T>
where
    T: fXX,
{
    /// Common grid resolution along easting.
    #[builder(default = 100)]
    pub nx: usize,

    /// Common grid resolution along northing.
    #[builder(default = 100)]
    pub ny: usize,

    /// Weight of the magnetic layer.
    #[builder(default = T!(0.5))]
    pub weight_magnetic: T,

    /// Weight of the combined indicator layer.
    #[builder(default = T!(0.5))]
    pub weight_indicator: T,

    /// Per-layer normalization applied before combination.
    #[builder(default)]
    pub normalization: NormalizeMethod<T>,

    /// Inverse-distance weighting power for scattered layers.
    #[builder(default = T!(2.0))]
    pub idw_power: T,
}

/// The fused prospectivity surface and its component layers.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProspectivityMap<T> {
    /// Easting node coordinates of the common grid.
    pub x_axis: Vec<T>,
    /// Northing node coordinates of the common grid.
    pub y_axis: Vec<T>,
    /// The combined prospectivity surface in `[0, 1]`.
    pub prospectivity: Array2<T>,
    /// The normalized magnetic component.
    pub magnetic: Array2<T>,
    /// The averaged, normalized indicator component.
    pub indicator: Array2<T>,
}

impl<T> ProspectivityMap<T>
where
    T: fXX + Serialize,
{
    /// Serialize the map to a JSON file.
    pub fn save(&self, path: String) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;

        file.write_all(serde_json::to_string(&self).unwrap().as_bytes())?;

        Ok(())
    }
}

/// Combine a magnetic layer with indicator layers into a prospectivity map.
///
/// The common grid spans the intersection of all layer extents. Each layer
/// is interpolated, normalized independently (NaN-aware), indicators are
/// averaged, and the weighted sum is renormalized to `[0, 1]`.
pub fn combine_prospectivity<T>(
    magnetic: &Layer<T>,
    indicators: &[Layer<T>],
    settings: &ProspectivitySettings<T>,
) -> Result<ProspectivityMap<T>, FuseError>
where
    T: fXX,
{
    if indicators.is_empty() {
        return Err(FuseError::NoIndicators);
    }

    if !(settings.weight_magnetic > T::zero()) || !(settings.weight_indicator > T::zero()) {
        return Err(FuseError::InvalidWeights);
    }

    if !(settings.idw_power > T::zero()) {
        return Err(FuseError::InvalidPower);
    }

    magnetic.validate(0)?;

    for (index, layer) in indicators.iter().enumerate() {
        layer.validate(index + 1)?;
    }

    // Intersection of all layer extents.
    let ((mut x_min, mut x_max), (mut y_min, mut y_max)) =
        magnetic.extent().ok_or(FuseError::EmptyLayer(0))?;

    for (index, layer) in indicators.iter().enumerate() {
        let ((lx_min, lx_max), (ly_min, ly_max)) =
            layer.extent().ok_or(FuseError::EmptyLayer(index + 1))?;

        x_min = if lx_min > x_min { lx_min } else { x_min };
        x_max = if lx_max < x_max { lx_max } else { x_max };
        y_min = if ly_min > y_min { ly_min } else { y_min };
        y_max = if ly_max < y_max { ly_max } else { y_max };
    }

    if !(x_min < x_max) || !(y_min < y_max) {
        return Err(FuseError::DisjointExtents);
    }

    let nx = settings.nx.max(2);
    let ny = settings.ny.max(2);

    let axis = |lo: T, hi: T, n: usize| {
        (0..n)
            .map(|idx| lo + (hi - lo) * T::from_usize(idx).unwrap() / T::from_usize(n - 1).unwrap())
            .collect::<Vec<T>>()
    };

    let x_axis = axis(x_min, x_max, nx);
    let y_axis = axis(y_min, y_max, ny);

    debug!(
        "prospectivity fusion: {} indicator layers on a {}x{} grid",
        indicators.len(),
        nx,
        ny
    );

    let mut magnetic_norm = magnetic.to_grid(&x_axis, &y_axis, settings.idw_power);

    normalize(
        magnetic_norm.as_slice_mut().expect("grid is contiguous"),
        settings.normalization,
    )
    .map_err(|_| FuseError::NoFiniteOverlap)?;

    // Average the normalized indicators; NaN propagates per cell, layers
    // without any finite overlap simply contribute nothing.
    let mut indicator_sum = Array2::zeros((ny, nx));
    let mut used = 0_usize;

    for layer in indicators {
        let mut grid = layer.to_grid(&x_axis, &y_axis, settings.idw_power);

        if !grid.iter().any(|v| v.is_finite()) {
            continue;
        }

        normalize(
            grid.as_slice_mut().expect("grid is contiguous"),
            settings.normalization,
        )
        .map_err(|_| FuseError::NoFiniteOverlap)?;

        indicator_sum += &grid;
        used += 1;
    }

    if used > 0 {
        let count = T::from_usize(used).unwrap();
        indicator_sum.mapv_inplace(|v| v / count);
    }

    let mut prospectivity = Array2::from_shape_fn((ny, nx), |idx| {
        settings.weight_magnetic * magnetic_norm[idx]
            + settings.weight_indicator * indicator_sum[idx]
    });

    normalize(
        prospectivity.as_slice_mut().expect("grid is contiguous"),
        NormalizeMethod::MinMax,
    )
    .map_err(|_| FuseError::NoFiniteOverlap)?;

    Ok(ProspectivityMap {
        x_axis,
        y_axis,
        prospectivity,
        magnetic: magnetic_norm,
        indicator: indicator_sum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{nan_max, nan_min};
    use approx::assert_relative_eq;

    fn scattered(offset: f64) -> Layer<f64> {
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut values = Vec::new();

        for row in 0..10 {
            for col in 0..10 {
                let (px, py) = (col as f64 * 10.0, row as f64 * 10.0);
                x.push(px);
                y.push(py);
                // A bump centered on the grid, shifted per layer.
                let d2 = (px - 45.0 - offset).powi(2) + (py - 45.0).powi(2);
                values.push((-d2 / 800.0).exp());
            }
        }

        Layer::Points { x, y, values }
    }

    fn settings() -> ProspectivitySettings<f64> {
        ProspectivitySettingsBuilder::default()
            .nx(20_usize)
            .ny(20_usize)
            .build()
            .unwrap()
    }

    #[test]
    fn test_output_is_normalized_to_unit_range() {
        let map = combine_prospectivity(&scattered(0.0), &[scattered(10.0)], &settings()).unwrap();

        let flat = map.prospectivity.iter().copied().collect::<Vec<f64>>();

        assert_relative_eq!(nan_min(&flat), 0.0);
        assert_relative_eq!(nan_max(&flat), 1.0);
        assert_eq!(map.prospectivity.dim(), (20, 20));
    }

    #[test]
    fn test_component_layers_are_retained() {
        let map = combine_prospectivity(&scattered(0.0), &[scattered(5.0)], &settings()).unwrap();

        assert_eq!(map.magnetic.dim(), map.prospectivity.dim());
        assert_eq!(map.indicator.dim(), map.prospectivity.dim());

        // The peak of the fused surface sits between the two bumps.
        let (mut best, mut best_val) = ((0, 0), f64::NEG_INFINITY);
        for ((row, col), &v) in map.prospectivity.indexed_iter() {
            if v > best_val {
                best = (row, col);
                best_val = v;
            }
        }

        let x = map.x_axis[best.1];
        assert!((40.0..=60.0).contains(&x), "peak at x = {}", x);
    }

    #[test]
    fn test_grid_layer_input() {
        let grid = Layer::Grid {
            values: Array2::from_shape_fn((10, 10), |(row, col)| (row + col) as f64),
            x_extent: (0.0, 90.0),
            y_extent: (0.0, 90.0),
        };

        let map = combine_prospectivity(&grid, &[scattered(0.0)], &settings()).unwrap();

        let flat = map.prospectivity.iter().copied().collect::<Vec<f64>>();
        assert_relative_eq!(nan_max(&flat), 1.0);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(matches!(
            combine_prospectivity(&scattered(0.0), &[], &settings()),
            Err(FuseError::NoIndicators)
        ));

        let ragged = Layer::Points {
            x: vec![0.0, 1.0],
            y: vec![0.0],
            values: vec![1.0, 2.0],
        };
        assert!(matches!(
            combine_prospectivity(&ragged, &[scattered(0.0)], &settings()),
            Err(FuseError::LengthMismatch(2, 1))
        ));

        let far = Layer::Points {
            x: vec![1000.0, 1100.0],
            y: vec![1000.0, 1100.0],
            values: vec![1.0, 2.0],
        };
        assert!(matches!(
            combine_prospectivity(&far, &[scattered(0.0)], &settings()),
            Err(FuseError::DisjointExtents)
        ));
    }

    #[test]
    fn test_weight_shift_moves_emphasis() {
        let magnetic = scattered(-20.0);
        let indicator = scattered(20.0);

        let mag_heavy = ProspectivitySettingsBuilder::default()
            .nx(20_usize)
            .ny(20_usize)
            .weight_magnetic(0.9)
            .weight_indicator(0.1)
            .build()
            .unwrap();

        let map = combine_prospectivity(&magnetic, &[indicator], &mag_heavy).unwrap();

        let (mut best, mut best_val) = ((0, 0), f64::NEG_INFINITY);
        for ((row, col), &v) in map.prospectivity.indexed_iter() {
            if v > best_val {
                best = (row, col);
                best_val = v;
            }
        }

        // Peak leans toward the magnetic bump (x ≈ 25).
        assert!(map.x_axis[best.1] < 45.0);
    }
}
