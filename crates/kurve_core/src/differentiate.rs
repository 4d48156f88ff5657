//! Central finite-difference derivative estimates.
//!
//! The step `h` is fixed per call (0.001 by default, see `ScanConfig`).
//! Values close to the scanner thresholds are approximate.

use crate::traits::RealFunction;

/// `(f(x+h) - f(x-h)) / 2h`, or `None` if either sample is undefined.
pub fn first_derivative<F: RealFunction + ?Sized>(f: &F, x: f64, h: f64) -> Option<f64> {
    let ahead = f.value_at(x + h)?;
    let behind = f.value_at(x - h)?;
    let slope = (ahead - behind) / (2.0 * h);
    slope.is_finite().then_some(slope)
}

/// `(f(x+h) - 2f(x) + f(x-h)) / h²`, or `None` if any sample is undefined.
pub fn second_derivative<F: RealFunction + ?Sized>(f: &F, x: f64, h: f64) -> Option<f64> {
    let center = f.value_at(x)?;
    let ahead = f.value_at(x + h)?;
    let behind = f.value_at(x - h)?;
    let curvature = (ahead - 2.0 * center + behind) / (h * h);
    curvature.is_finite().then_some(curvature)
}
