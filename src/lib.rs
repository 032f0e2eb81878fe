#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

pub mod deriv;
pub mod forward;
pub mod fuse;
pub mod invert;
pub mod math;
pub mod survey;
pub mod trend;

use deriv::DerivError;
use fuse::FuseError;
use invert::InvertError;
use math::MathError;
use nalgebra::{RealField, Scalar};
use num_traits::{AsPrimitive, Float, FromPrimitive, float::TotalOrder};
use std::{
    fmt::{Debug, Display},
    iter::Sum,
};
use survey::SurveyError;
use thiserror::Error;
use trend::TrendError;

/// Generic container type for errors.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum MaglithError<T> {
    #[error("derivative error")]
    Deriv(#[from] DerivError<T>),
    #[error("fusion error")]
    Fuse(#[from] FuseError),
    #[error("inversion error")]
    Invert(#[from] InvertError<T>),
    #[error("math error")]
    Math(#[from] MathError<T>),
    #[error("survey error")]
    Survey(#[from] SurveyError),
    #[error("trend error")]
    Trend(#[from] TrendError),
}

/// A trait that describes the generic floating point numbers used throughout the **maglith**
/// crate. In practical terms this trait is only used for the f32/f64 types.
#[allow(non_camel_case_types)]
pub trait fXX:
    'static
    + AsPrimitive<usize>
    + Copy
    + Debug
    + Default
    + Display
    + Float
    + FromPrimitive
    + RealField
    + Scalar
    + Send
    + Sum
    + for<'x> Sum<&'x Self>
    + Sync
    + TotalOrder
{
    /// Returns 4π.
    fn four_pi() -> Self {
        Self::two_pi() + Self::two_pi()
    }

    /// Returns π/2.
    fn half_pi() -> Self {
        RealField::frac_pi_2()
    }
}

impl fXX for f32 {}
impl fXX for f64 {}
