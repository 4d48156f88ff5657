use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars by the expression VM.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A real function of one variable that may be undefined at some points.
///
/// Implementors must be total: `None` is returned for NaN, infinite results,
/// or any input the function cannot handle. Scanners and the differentiator
/// treat `None` as "no data at this sample".
pub trait RealFunction {
    /// Evaluates the function at `x`.
    fn value_at(&self, x: f64) -> Option<f64>;
}

impl<F: RealFunction + ?Sized> RealFunction for &F {
    fn value_at(&self, x: f64) -> Option<f64> {
        (**self).value_at(x)
    }
}
