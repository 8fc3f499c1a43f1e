//! The [`Real`] element trait for snapshot tensors.

use std::fmt::{Debug, Display};

use ndarray::ScalarOperand;
use num_traits::{Float, FromPrimitive, ToPrimitive};

/// Floating-point element type a snapshot can be materialised in.
///
/// Implemented for `f32` and `f64`. Stored data is decoded in the run's
/// own precision and cast element-wise to the requested `Real`.
pub trait Real:
    Float + FromPrimitive + ToPrimitive + ScalarOperand + Default + Debug + Display + Send + Sync + 'static
{
    /// Cast from `f64`, rounding to the nearest representable value.
    fn from_f64_lossy(v: f64) -> Self {
        <Self as FromPrimitive>::from_f64(v).unwrap_or_else(Self::nan)
    }

    /// Widen to `f64`.
    fn to_f64_lossless(self) -> f64 {
        <Self as ToPrimitive>::to_f64(&self).unwrap_or(f64::NAN)
    }
}

impl Real for f32 {}
impl Real for f64 {}
