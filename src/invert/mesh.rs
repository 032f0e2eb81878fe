//! Regular 3D mesh construction for the susceptibility inversion.

use crate::{fXX, invert::InvertError, math::T, survey::SurveySeries};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Mesh and solver configuration for the susceptibility inversion.
#[derive(Builder, Clone, Debug, Deserialize, Serialize)]
pub struct MeshSpec<T>
where
    T: fXX,
{
    /// Number of cells along easting.
    #[builder(default = 10)]
    pub nx: usize,

    /// Number of cells along northing.
    #[builder(default = 10)]
    pub ny: usize,

    /// Number of cells along depth.
    #[builder(default = 5)]
    pub nz: usize,

    /// Cell size along easting.
    #[builder(default = T!(100.0))]
    pub dx: T,

    /// Cell size along northing.
    #[builder(default = T!(100.0))]
    pub dy: T,

    /// Cell size along depth.
    #[builder(default = T!(100.0))]
    pub dz: T,

    /// Depth of the shallowest cell layer (positive down).
    #[builder(default = T!(50.0))]
    pub z_top: T,

    /// Tikhonov damping parameter.
    #[builder(default = T::one())]
    pub alpha: T,

    /// Reserved for iterative solvers; unused by the direct solve.
    #[builder(default = 50)]
    pub max_iterations: usize,
}

/// The inversion domain: cell centers of a regular 3D mesh.
///
/// Created once per inversion call from the observation bounds and a
/// [`MeshSpec`]; horizontal cell centers span the survey bounds inclusively,
/// depth layers start at `z_top` with spacing derived from `nz · dz`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Mesh3<T> {
    /// Cells along each axis `(nx, ny, nz)`.
    pub shape: (usize, usize, usize),
    /// Cell sizes `(dx, dy, dz)`.
    pub cell_size: (T, T, T),
    /// Depth of the shallowest layer.
    pub z_top: T,
    /// Cell centers in `(x, y, z)` with z (depth) varying fastest, then y.
    pub cell_centers: Vec<[T; 3]>,
}

impl<T> Mesh3<T>
where
    T: fXX,
{
    /// Build the mesh over the planar bounds of a survey.
    pub fn from_bounds(series: &SurveySeries<T>, spec: &MeshSpec<T>) -> Result<Self, InvertError<T>> {
        if spec.nx == 0 || spec.ny == 0 || spec.nz == 0 {
            return Err(InvertError::EmptyMesh {
                nx: spec.nx,
                ny: spec.ny,
                nz: spec.nz,
            });
        }

        for (name, value) in [
            ("dx", spec.dx),
            ("dy", spec.dy),
            ("dz", spec.dz),
        ] {
            if !(value > T::zero()) || !value.is_finite() {
                return Err(InvertError::InvalidMeshParameter { name, value });
            }
        }

        if !spec.z_top.is_finite() || spec.z_top < T::zero() {
            return Err(InvertError::InvalidMeshParameter {
                name: "z_top",
                value: spec.z_top,
            });
        }

        let (x_min, x_max, y_min, y_max) = series
            .bounds()
            .map_err(|_| InvertError::NoValidObservations)?;

        let axis = |lo: T, hi: T, n: usize| {
            (0..n)
                .map(move |idx| match n {
                    1 => lo,
                    _ => lo + (hi - lo) * T::from_usize(idx).unwrap() / T::from_usize(n - 1).unwrap(),
                })
                .collect::<Vec<T>>()
        };

        let xs = axis(x_min, x_max, spec.nx);
        let ys = axis(y_min, y_max, spec.ny);
        let zs = axis(
            spec.z_top,
            spec.z_top + T::from_usize(spec.nz).unwrap() * spec.dz,
            spec.nz,
        );

        let mut cell_centers = Vec::with_capacity(spec.nx * spec.ny * spec.nz);

        for &x in &xs {
            for &y in &ys {
                for &z in &zs {
                    cell_centers.push([x, y, z]);
                }
            }
        }

        Ok(Self {
            shape: (spec.nx, spec.ny, spec.nz),
            cell_size: (spec.dx, spec.dy, spec.dz),
            z_top: spec.z_top,
            cell_centers,
        })
    }

    /// Total number of cells.
    pub fn n_cells(&self) -> usize {
        self.cell_centers.len()
    }

    /// Volume of a single cell.
    pub fn cell_volume(&self) -> T {
        self.cell_size.0 * self.cell_size.1 * self.cell_size.2
    }

    /// Flat index of the cell at `(ix, iy, iz)`.
    pub fn flat_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        (ix * self.shape.1 + iy) * self.shape.2 + iz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::SurveyObs;
    use approx::assert_relative_eq;

    fn series() -> SurveySeries<f64> {
        SurveySeries::from_iterator([
            SurveyObs::new(-100.0, -200.0, 1.0),
            SurveyObs::new(100.0, 200.0, 2.0),
        ])
    }

    #[test]
    fn test_mesh_spans_bounds() {
        let spec = MeshSpecBuilder::default()
            .nx(3_usize)
            .ny(3_usize)
            .nz(2_usize)
            .dz(100.0)
            .z_top(50.0)
            .build()
            .unwrap();

        let mesh = Mesh3::from_bounds(&series(), &spec).unwrap();

        assert_eq!(mesh.n_cells(), 18);
        assert_relative_eq!(mesh.cell_centers[0][0], -100.0);
        assert_relative_eq!(mesh.cell_centers[0][2], 50.0);

        let last = mesh.cell_centers.last().unwrap();
        assert_relative_eq!(last[0], 100.0);
        assert_relative_eq!(last[1], 200.0);
        assert_relative_eq!(last[2], 250.0);
    }

    #[test]
    fn test_flat_index_matches_center_order() {
        let spec = MeshSpecBuilder::default()
            .nx(4_usize)
            .ny(3_usize)
            .nz(2_usize)
            .build()
            .unwrap();

        let mesh = Mesh3::from_bounds(&series(), &spec).unwrap();

        let idx = mesh.flat_index(2, 1, 1);
        let by_loop = (2 * 3 + 1) * 2 + 1;

        assert_eq!(idx, by_loop);
        assert_eq!(mesh.n_cells(), 24);
    }

    #[test]
    fn test_rejects_degenerate_mesh() {
        let spec = MeshSpecBuilder::default().nx(0_usize).build().unwrap();
        assert!(matches!(
            Mesh3::from_bounds(&series(), &spec),
            Err(InvertError::EmptyMesh { .. })
        ));

        let spec = MeshSpecBuilder::default().dx(-5.0).build().unwrap();
        assert!(matches!(
            Mesh3::from_bounds(&series(), &spec),
            Err(InvertError::InvalidMeshParameter { name: "dx", .. })
        ));
    }
}
