use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on the samples a single sweep may take.
pub const MAX_SWEEP_SAMPLES: usize = 1_000_000;

/// Numerical settings shared by the scanner passes and the orchestrator.
///
/// The defaults are the fixed values the analysis has always used; the
/// browser may override individual fields, missing ones keep their default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub x_min: f64,
    pub x_max: f64,
    /// Finite-difference step `h`.
    pub derivative_step: f64,
    pub zero_step: f64,
    pub extrema_step: f64,
    pub inflection_step: f64,
    pub newton_iterations: usize,
    /// Newton updates are skipped where `|f'(x)|` is not above this.
    pub newton_min_slope: f64,
    /// A refined root must satisfy `|f(root)| <= root_tolerance * max(1, |f(lo)|, |f(hi)|)`.
    pub root_tolerance: f64,
    /// Samples with `|f(x)| < tolerance` count as roots before the
    /// sign-change test. Disabled when `None`.
    pub exact_zero_tolerance: Option<f64>,
    pub zero_separation: f64,
    /// A sample is a critical point candidate when `|f'(x)|` is below this.
    pub critical_slope: f64,
    /// Minimum `|f''(x)|` for classifying extrema and bracketing inflections.
    pub curvature_threshold: f64,
    pub feature_separation: f64,
    pub bisection_iterations: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            x_min: -10.0,
            x_max: 10.0,
            derivative_step: 0.001,
            zero_step: 0.1,
            extrema_step: 0.2,
            inflection_step: 0.2,
            newton_iterations: 20,
            newton_min_slope: 0.001,
            root_tolerance: 1e-4,
            exact_zero_tolerance: None,
            zero_separation: 0.5,
            critical_slope: 0.05,
            curvature_threshold: 0.1,
            feature_separation: 1.0,
            bisection_iterations: 30,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.x_min.is_finite() || !self.x_max.is_finite() {
            bail!("Domain bounds must be finite.");
        }
        if self.x_max <= self.x_min {
            bail!(
                "x_max ({}) must be greater than x_min ({}).",
                self.x_max,
                self.x_min
            );
        }
        for (name, value) in [
            ("derivative_step", self.derivative_step),
            ("zero_step", self.zero_step),
            ("extrema_step", self.extrema_step),
            ("inflection_step", self.inflection_step),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("{} must be positive.", name);
            }
        }
        for (name, step) in [
            ("zero_step", self.zero_step),
            ("extrema_step", self.extrema_step),
            ("inflection_step", self.inflection_step),
        ] {
            let samples = (self.x_max - self.x_min) / step;
            if samples > MAX_SWEEP_SAMPLES as f64 {
                bail!(
                    "{} ({}) would take {:.0} samples, the limit is {}.",
                    name,
                    step,
                    samples,
                    MAX_SWEEP_SAMPLES
                );
            }
        }
        for (name, value) in [
            ("newton_min_slope", self.newton_min_slope),
            ("root_tolerance", self.root_tolerance),
            ("zero_separation", self.zero_separation),
            ("critical_slope", self.critical_slope),
            ("curvature_threshold", self.curvature_threshold),
            ("feature_separation", self.feature_separation),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                bail!("{} must be finite and non-negative.", name);
            }
        }
        if let Some(tolerance) = self.exact_zero_tolerance {
            if !(tolerance.is_finite() && tolerance > 0.0) {
                bail!("exact_zero_tolerance must be positive when set.");
            }
        }
        Ok(())
    }

    /// Abscissae of a sweep over `[x_min, x_max]` with the given step.
    ///
    /// Samples are `x_min + i * step`; the last one never exceeds `x_max`
    /// by more than rounding noise.
    pub fn sweep(&self, step: f64) -> impl Iterator<Item = f64> {
        let x_min = self.x_min;
        let count = ((self.x_max - self.x_min) / step + 1e-9).floor() as usize;
        (0..=count).map(move |i| x_min + i as f64 * step)
    }
}

#[cfg(test)]
mod tests {
    use super::{ScanConfig, MAX_SWEEP_SAMPLES};

    #[test]
    fn default_config_is_valid() {
        ScanConfig::default()
            .validate()
            .expect("defaults should validate");
    }

    #[test]
    fn validate_rejects_inverted_domain() {
        let config = ScanConfig {
            x_min: 5.0,
            x_max: -5.0,
            ..ScanConfig::default()
        };
        let err = config.validate().expect_err("inverted domain should fail");
        assert!(err.to_string().contains("x_max"), "unexpected error: {err}");
    }

    #[test]
    fn validate_rejects_non_positive_step() {
        let config = ScanConfig {
            extrema_step: 0.0,
            ..ScanConfig::default()
        };
        let err = config.validate().expect_err("zero step should fail");
        assert!(err.to_string().contains("extrema_step"));
    }

    #[test]
    fn validate_rejects_runaway_sweeps() {
        let config = ScanConfig {
            zero_step: 1e-300,
            ..ScanConfig::default()
        };
        let err = config.validate().expect_err("tiny step should fail");
        assert!(err.to_string().contains("zero_step"), "unexpected error: {err}");

        let fine = ScanConfig {
            inflection_step: 21.0 / MAX_SWEEP_SAMPLES as f64,
            ..ScanConfig::default()
        };
        fine.validate().expect("steps under the limit are allowed");
    }

    #[test]
    fn validate_rejects_bad_exact_zero_tolerance() {
        let config = ScanConfig {
            exact_zero_tolerance: Some(-1.0),
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sweep_covers_both_bounds_without_drift() {
        let config = ScanConfig::default();
        let samples: Vec<f64> = config.sweep(0.1).collect();
        assert_eq!(samples.len(), 201);
        assert_eq!(samples[0], -10.0);
        assert!((samples[200] - 10.0).abs() < 1e-12);
        assert!(samples[100].abs() < 1e-12);

        let coarse: Vec<f64> = config.sweep(0.2).collect();
        assert_eq!(coarse.len(), 101);
    }
}
