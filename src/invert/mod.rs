//! Inverse methods: Euler deconvolution and regularized susceptibility
//! inversion.
//!
//! Both methods consume an immutable [`SurveySeries`](crate::survey::SurveySeries)
//! snapshot and return owned result records. Per-window numerical degeneracy
//! drops that window only; configuration errors (shape mismatches, oversized
//! meshes) fail fast before any allocation or computation.

pub mod euler;
pub mod mesh;
pub mod tikhonov;

use thiserror::Error;

/// Errors associated with the [`invert`](crate::invert) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum InvertError<T> {
    #[error("window of {window} samples does not fit a series of {len}")]
    WindowTooLarge { window: usize, len: usize },
    #[error("window of {0} samples cannot constrain 4 unknowns")]
    WindowTooSmall(usize),
    #[error("invalid depth bounds [{z_min}, {z_max}]")]
    InvalidDepthBounds { z_min: T, z_max: T },
    #[error("invalid cluster radius {0}")]
    InvalidClusterRadius(T),
    #[error("mesh dimensions must be positive, got {nx}x{ny}x{nz}")]
    EmptyMesh { nx: usize, ny: usize, nz: usize },
    #[error("invalid cell size or mesh top: {name} = {value}")]
    InvalidMeshParameter { name: &'static str, value: T },
    #[error(
        "sensitivity kernel of {n_obs} x {n_cells} (~{est_mb} MB) exceeds the {limit_mb} MB limit"
    )]
    KernelTooLarge {
        n_obs: usize,
        n_cells: usize,
        est_mb: usize,
        limit_mb: usize,
    },
    #[error("series contains no valid observations")]
    NoValidObservations,
    #[error("damped normal equations are singular; raise alpha or shrink the mesh")]
    SingularSystem,
}
