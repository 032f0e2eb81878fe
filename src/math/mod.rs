//! Mathematical data types, functions and routines.
//!
//! # Contents
//!
//! - NaN-aware descriptive statistics and normalization routines
//!   ([`descriptive_stats`], [`normalize`]).
//! - Complete-linkage agglomerative clustering with a distance cutoff
//!   ([`complete_linkage`]), used to collapse overlapping source estimates.
//! - Interpolation primitives: inverse-distance weighting of scattered
//!   samples onto a regular grid ([`idw_to_grid`]) and bilinear sampling of
//!   grids ([`bilinear_sample`]).
//!
//! The macros defined here disambiguate float intrinsics for the generic
//! scalar type `T`, which implements both [`num_traits::Float`] and
//! [`nalgebra::RealField`].

mod interp;
mod linkage;
mod stats;

pub use interp::{bilinear_sample, idw_to_grid};
pub use linkage::complete_linkage;
pub use stats::{
    DescriptiveStats, NormalizeMethod, SigmaScreen, descriptive_stats, gaussian_smooth, nan_max,
    nan_mean, nan_min, nan_std, normalize, rms, sigma_screen,
};

use thiserror::Error;

/// Errors associated with the [`math`](crate::math) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum MathError<T> {
    #[error("input arrays have mismatched lengths ({0} vs {1})")]
    LengthMismatch(usize, usize),
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: T },
    #[error("input contains no valid (finite) samples")]
    NoValidSamples,
}

/// A shorthand for converting constants to type `T`.
macro_rules! T {
    ($value: expr) => {
        T::from_f64($value).unwrap()
    };
}

macro_rules! abs {
    ($value: expr) => {
        num_traits::Float::abs($value)
    };
}

macro_rules! atan2 {
    ($value_y: expr, $value_x: expr) => {
        num_traits::Float::atan2($value_y, $value_x)
    };
}

macro_rules! cos {
    ($value: expr) => {
        num_traits::Float::cos($value)
    };
}

macro_rules! exp {
    ($value: expr) => {
        num_traits::Float::exp($value)
    };
}

macro_rules! powf {
    ($value: expr, $float: expr) => {
        num_traits::Float::powf($value, $float)
    };
}

macro_rules! powi {
    ($value: expr, $integer: expr) => {
        num_traits::Float::powi($value, $integer)
    };
}

macro_rules! sin {
    ($value: expr) => {
        num_traits::Float::sin($value)
    };
}

macro_rules! sqrt {
    ($value: expr) => {
        num_traits::Float::sqrt($value)
    };
}

macro_rules! tan {
    ($value: expr) => {
        num_traits::Float::tan($value)
    };
}

pub(crate) use T;
pub(crate) use abs;
pub(crate) use atan2;
pub(crate) use cos;
pub(crate) use exp;
pub(crate) use powf;
pub(crate) use powi;
pub(crate) use sin;
pub(crate) use sqrt;
pub(crate) use tan;
