//! Evenly spaced samples of a curve for the canvas renderer.

use crate::traits::RealFunction;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on samples per curve; far more than any screen has columns.
pub const MAX_VIEWPORT_SAMPLES: usize = 100_000;

/// Visible x-range and the number of samples to take across it, usually
/// one per pixel column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x_min: f64,
    pub x_max: f64,
    pub samples: usize,
}

impl Viewport {
    pub fn validate(&self) -> Result<()> {
        if !self.x_min.is_finite() || !self.x_max.is_finite() {
            bail!("Viewport bounds must be finite.");
        }
        if self.x_max <= self.x_min {
            bail!("Viewport x_max must be greater than x_min.");
        }
        if self.samples < 2 {
            bail!("Viewport needs at least 2 samples, got {}.", self.samples);
        }
        if self.samples > MAX_VIEWPORT_SAMPLES {
            bail!(
                "Viewport allows at most {} samples, got {}.",
                MAX_VIEWPORT_SAMPLES,
                self.samples
            );
        }
        Ok(())
    }
}

/// `ys[i]` is `None` where the curve is undefined; the renderer lifts the
/// pen there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSamples {
    pub xs: Vec<f64>,
    pub ys: Vec<Option<f64>>,
}

pub fn sample_curve<F: RealFunction + ?Sized>(f: &F, viewport: &Viewport) -> Result<CurveSamples> {
    viewport.validate()?;
    let last = (viewport.samples - 1) as f64;
    let width = viewport.x_max - viewport.x_min;

    let xs: Vec<f64> = (0..viewport.samples)
        .map(|i| viewport.x_min + width * (i as f64 / last))
        .collect();
    let ys = xs.iter().map(|&x| f.value_at(x)).collect();
    Ok(CurveSamples { xs, ys })
}
