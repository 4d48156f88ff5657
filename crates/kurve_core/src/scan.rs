//! Grid sweeps locating zeros, local extrema and inflection points.
//!
//! Each pass samples `[x_min, x_max]` at its own step. An undefined sample
//! is treated as a discontinuity and resets whatever the pass was tracking,
//! so no feature is ever bracketed across a pole or a gap in the domain.

use crate::config::ScanConfig;
use crate::differentiate::{first_derivative, second_derivative};
use crate::traits::RealFunction;
use serde::{Deserialize, Serialize};

/// Slack allowed when checking that a refined root stayed in its bracket.
const BRACKET_SLACK: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extrema {
    pub maxima: Vec<Point>,
    pub minima: Vec<Point>,
}

/// Zero crossings in ascending order.
///
/// A sign flip between consecutive non-zero samples is refined with Newton's
/// method from the bracket midpoint. The result is kept only if it lies in
/// the bracket and `|f(root)|` is within `root_tolerance` of the larger of 1
/// and the bracket ends' magnitudes; sign flips across poles fail that test.
pub fn find_zeros<F: RealFunction + ?Sized>(f: &F, config: &ScanConfig) -> Vec<f64> {
    let mut zeros: Vec<f64> = Vec::new();
    // Last sample with a non-zero value: (x, sign).
    let mut previous: Option<(f64, f64)> = None;

    for x in config.sweep(config.zero_step) {
        let Some(y) = f.value_at(x) else {
            previous = None;
            continue;
        };

        if let Some(tolerance) = config.exact_zero_tolerance {
            if y.abs() < tolerance {
                push_separated(&mut zeros, x, config.zero_separation);
            }
        }

        if y == 0.0 {
            continue;
        }
        let sign = y.signum();
        if let Some((previous_x, previous_sign)) = previous {
            if previous_sign != sign {
                if let Some(root) = refine_root(f, previous_x, x, config) {
                    push_separated(&mut zeros, root, config.zero_separation);
                }
            }
        }
        previous = Some((x, sign));
    }

    log::debug!("zero scan found {} roots", zeros.len());
    zeros
}

/// Grid points where `|f'(x)| < critical_slope`, classified by the sign of
/// `f''(x)`. Points with flat curvature are neither.
pub fn find_extrema<F: RealFunction + ?Sized>(f: &F, config: &ScanConfig) -> Extrema {
    let h = config.derivative_step;
    let mut extrema = Extrema::default();

    for x in config.sweep(config.extrema_step) {
        let Some(y) = f.value_at(x) else {
            continue;
        };
        let Some(slope) = first_derivative(f, x, h) else {
            continue;
        };
        if slope.abs() >= config.critical_slope {
            continue;
        }
        let Some(curvature) = second_derivative(f, x, h) else {
            continue;
        };

        let list = if curvature < -config.curvature_threshold {
            &mut extrema.maxima
        } else if curvature > config.curvature_threshold {
            &mut extrema.minima
        } else {
            continue;
        };
        if list
            .last()
            .map_or(true, |last| (x - last.x).abs() > config.feature_separation)
        {
            list.push(Point { x, y });
        }
    }

    log::debug!(
        "extrema scan found {} maxima, {} minima",
        extrema.maxima.len(),
        extrema.minima.len()
    );
    extrema
}

/// Points where the curvature changes sign, in ascending order.
///
/// Only samples with `|f''(x)| > curvature_threshold` take part in the
/// bracketing, so a sample sitting right on the inflection does not hide it.
pub fn find_inflections<F: RealFunction + ?Sized>(f: &F, config: &ScanConfig) -> Vec<Point> {
    let h = config.derivative_step;
    let mut inflections: Vec<Point> = Vec::new();
    let mut previous: Option<(f64, f64)> = None;

    for x in config.sweep(config.inflection_step) {
        let Some(curvature) = second_derivative(f, x, h) else {
            previous = None;
            continue;
        };
        if curvature.abs() <= config.curvature_threshold {
            continue;
        }
        let sign = curvature.signum();

        if let Some((previous_x, previous_sign)) = previous {
            if previous_sign != sign {
                let refined = bisect_curvature(f, previous_x, x, previous_sign, config);
                if let Some((inflection_x, y)) = refined {
                    if inflections.last().map_or(true, |last| {
                        (inflection_x - last.x).abs() > config.feature_separation
                    }) {
                        inflections.push(Point { x: inflection_x, y });
                    }
                }
            }
        }
        previous = Some((x, sign));
    }

    log::debug!("inflection scan found {} points", inflections.len());
    inflections
}

fn push_separated(values: &mut Vec<f64>, x: f64, separation: f64) {
    if values
        .last()
        .map_or(true, |last| (x - last).abs() > separation)
    {
        values.push(x);
    }
}

fn refine_root<F: RealFunction + ?Sized>(
    f: &F,
    lo: f64,
    hi: f64,
    config: &ScanConfig,
) -> Option<f64> {
    let mut x = 0.5 * (lo + hi);
    for _ in 0..config.newton_iterations {
        let Some(y) = f.value_at(x) else {
            break;
        };
        if y == 0.0 {
            break;
        }
        let Some(slope) = first_derivative(f, x, config.derivative_step) else {
            break;
        };
        if slope.abs() <= config.newton_min_slope {
            break;
        }
        x -= y / slope;
        if !x.is_finite() {
            return None;
        }
    }

    if x < lo - BRACKET_SLACK || x > hi + BRACKET_SLACK {
        return None;
    }
    // Residual relative to the bracket ends, so scaling f keeps its roots.
    let scale = [f.value_at(lo)?, f.value_at(hi)?]
        .into_iter()
        .fold(1.0_f64, |scale, y| scale.max(y.abs()));
    let residual = f.value_at(x)?;
    (residual.abs() <= config.root_tolerance * scale).then_some(x)
}

/// Bisection on the sign of `f''` between two samples of opposite curvature.
///
/// Returns `None` when `f''` is undefined inside the bracket or does not
/// settle near zero, which is what a curvature flip across a pole looks like.
fn bisect_curvature<F: RealFunction + ?Sized>(
    f: &F,
    a: f64,
    b: f64,
    a_sign: f64,
    config: &ScanConfig,
) -> Option<(f64, f64)> {
    let h = config.derivative_step;
    let (mut lo, mut hi) = (a, b);
    for _ in 0..config.bisection_iterations {
        let mid = 0.5 * (lo + hi);
        let curvature = second_derivative(f, mid, h)?;
        if curvature == 0.0 {
            return Some((mid, f.value_at(mid)?));
        }
        if curvature.signum() == a_sign {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let settled = [lo, hi]
        .into_iter()
        .filter_map(|x| second_derivative(f, x, h))
        .any(|curvature| curvature.abs() <= config.curvature_threshold);
    if !settled {
        return None;
    }
    let x = 0.5 * (lo + hi);
    Some((x, f.value_at(x)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::CompiledExpression;
    use std::f64::consts::PI;

    fn compiled(canonical: &str) -> CompiledExpression {
        CompiledExpression::compile(canonical).expect("expression should compile")
    }

    #[test]
    fn zeros_of_shifted_parabola() {
        let zeros = find_zeros(&compiled("x^2-4"), &ScanConfig::default());
        assert_eq!(zeros.len(), 2, "zeros: {zeros:?}");
        assert!((zeros[0] + 2.0).abs() < 0.01);
        assert!((zeros[1] - 2.0).abs() < 0.01);
    }

    #[test]
    fn parabola_above_axis_has_no_zeros() {
        assert!(find_zeros(&compiled("x^2+5"), &ScanConfig::default()).is_empty());
    }

    #[test]
    fn zeros_of_sine_include_origin() {
        let zeros = find_zeros(&compiled("sin(x)"), &ScanConfig::default());
        assert_eq!(zeros.len(), 7, "zeros: {zeros:?}");
        for (zero, k) in zeros.iter().zip(-3..=3) {
            assert!((zero - k as f64 * PI).abs() < 1e-6, "{zero} vs {k}π");
        }
    }

    #[test]
    fn nearby_roots_collapse_into_one() {
        let zeros = find_zeros(&compiled("(x-1.04)*(x-1.26)"), &ScanConfig::default());
        assert_eq!(zeros.len(), 1, "zeros: {zeros:?}");
        assert!((zeros[0] - 1.04).abs() < 0.01);
    }

    #[test]
    fn steep_functions_keep_their_roots() {
        for canonical in ["x^2-4.01", "100000000*(x^2-4.01)", "1000000000000*(x^2-4.01)"] {
            let zeros = find_zeros(&compiled(canonical), &ScanConfig::default());
            assert_eq!(zeros.len(), 2, "{canonical}: {zeros:?}");
            assert!((zeros[0] + 2.0025).abs() < 1e-4, "{canonical}: {zeros:?}");
            assert!((zeros[1] - 2.0025).abs() < 1e-4, "{canonical}: {zeros:?}");
        }
    }

    #[test]
    fn flat_slope_root_stays_at_bracket_midpoint() {
        // f' = 1e-5 is below newton_min_slope, so no Newton step is taken.
        let zeros = find_zeros(&compiled("0.00001*(x-2.03)"), &ScanConfig::default());
        assert_eq!(zeros.len(), 1, "zeros: {zeros:?}");
        assert!((zeros[0] - 2.05).abs() < 1e-9, "zeros: {zeros:?}");
    }

    #[test]
    fn poles_are_not_reported_as_roots() {
        let config = ScanConfig::default();
        assert!(find_zeros(&compiled("1/x"), &config).is_empty());

        let zeros = find_zeros(&compiled("tan(x)"), &config);
        for zero in &zeros {
            let nearest = (zero / PI).round() * PI;
            assert!((zero - nearest).abs() < 1e-6, "{zero} is not a root of tan");
        }
        assert_eq!(zeros.len(), 7, "zeros: {zeros:?}");
    }

    #[test]
    fn exact_zero_check_catches_touching_roots() {
        let f = compiled("x^2");
        assert!(find_zeros(&f, &ScanConfig::default()).is_empty());

        let config = ScanConfig {
            exact_zero_tolerance: Some(1e-3),
            ..ScanConfig::default()
        };
        let zeros = find_zeros(&f, &config);
        assert_eq!(zeros.len(), 1, "zeros: {zeros:?}");
        assert!(zeros[0].abs() < 1e-9);
    }

    #[test]
    fn parabola_has_single_minimum() {
        let extrema = find_extrema(&compiled("x^2"), &ScanConfig::default());
        assert!(extrema.maxima.is_empty());
        assert_eq!(extrema.minima.len(), 1);
        assert!(extrema.minima[0].x.abs() < 1e-9);
        assert!(extrema.minima[0].y.abs() < 1e-9);
    }

    #[test]
    fn inverted_parabola_has_single_maximum() {
        let extrema = find_extrema(&compiled("3-(x-1)^2"), &ScanConfig::default());
        assert!(extrema.minima.is_empty());
        assert_eq!(extrema.maxima.len(), 1);
        assert!((extrema.maxima[0].x - 1.0).abs() < 1e-9);
        assert!((extrema.maxima[0].y - 3.0).abs() < 1e-9);
    }

    #[test]
    fn neighbouring_candidates_collapse_into_one_minimum() {
        // |f'| < 0.05 at -0.2, 0 and 0.2; only the first is kept.
        let extrema = find_extrema(&compiled("0.1*x^2"), &ScanConfig::default());
        assert!(extrema.maxima.is_empty());
        assert_eq!(extrema.minima.len(), 1, "minima: {:?}", extrema.minima);
        assert!((extrema.minima[0].x + 0.2).abs() < 1e-9);
        assert!((extrema.minima[0].y - 0.004).abs() < 1e-9);
    }

    #[test]
    fn flat_critical_points_are_not_extrema() {
        let extrema = find_extrema(&compiled("x^3"), &ScanConfig::default());
        assert!(extrema.maxima.is_empty());
        assert!(extrema.minima.is_empty());
    }

    #[test]
    fn cubic_inflection_at_origin() {
        let inflections = find_inflections(&compiled("x^3"), &ScanConfig::default());
        assert_eq!(inflections.len(), 1, "inflections: {inflections:?}");
        assert!(inflections[0].x.abs() < 1e-3);
        assert!(inflections[0].y.abs() < 1e-6);
    }

    #[test]
    fn sine_inflections_sit_on_its_zeros() {
        let inflections = find_inflections(&compiled("sin(x)"), &ScanConfig::default());
        assert_eq!(inflections.len(), 7, "inflections: {inflections:?}");
        for (point, k) in inflections.iter().zip(-3..=3) {
            assert!((point.x - k as f64 * PI).abs() < 1e-3);
        }
    }

    #[test]
    fn close_inflections_collapse_into_one() {
        // f'' = 12x^2 - 1.08 changes sign at -0.3 and 0.3.
        let f = compiled("x^4-0.54*x^2");
        let inflections = find_inflections(&f, &ScanConfig::default());
        assert_eq!(inflections.len(), 1, "inflections: {inflections:?}");
        assert!((inflections[0].x + 0.3).abs() < 1e-3);
        assert!((inflections[0].y + 0.0405).abs() < 1e-3);

        let config = ScanConfig {
            feature_separation: 0.5,
            ..ScanConfig::default()
        };
        let inflections = find_inflections(&f, &config);
        assert_eq!(inflections.len(), 2, "inflections: {inflections:?}");
        assert!((inflections[1].x - 0.3).abs() < 1e-3);
    }

    #[test]
    fn curvature_flip_across_pole_is_ignored() {
        let inflections = find_inflections(&compiled("1/x"), &ScanConfig::default());
        assert!(inflections.is_empty(), "inflections: {inflections:?}");
    }

    #[test]
    fn tan_inflections_skip_its_poles() {
        let inflections = find_inflections(&compiled("tan(x)"), &ScanConfig::default());
        assert!(!inflections.is_empty());
        for point in &inflections {
            let nearest = (point.x / PI).round() * PI;
            assert!((point.x - nearest).abs() < 1e-3, "{point:?} is a pole");
        }
    }

    #[test]
    fn narrower_domain_limits_the_sweep() {
        let config = ScanConfig {
            x_min: 0.5,
            x_max: 10.0,
            ..ScanConfig::default()
        };
        let zeros = find_zeros(&compiled("x^2-4"), &config);
        assert_eq!(zeros.len(), 1);
        assert!((zeros[0] - 2.0).abs() < 0.01);
    }
}
