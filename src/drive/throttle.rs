// Operator throttle shaping: deadband, gain curve, saturation
//
// The gain curve is built once from a handful of control points, sampled on a
// fixed grid over [0, 1] and then evaluated by linear interpolation between
// samples. Inputs are always clamped into the grid, never extrapolated.

use serde::{Deserialize, Serialize};

/// Number of grid intervals the curve is sampled on
const CURVE_RESOLUTION: usize = 100;

/// How the control points are joined before sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Straight segments between control points
    Linear,
    /// Smooth Hermite spline that never overshoots (Fritsch-Carlson)
    #[default]
    MonotoneCubic,
}

/// Error types for building a throttle map
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThrottleError {
    #[error("Throttle curve needs at least 2 control points, got {0}")]
    TooFewPoints(usize),

    #[error("Throttle curve has {x} x values but {y} y values")]
    LengthMismatch { x: usize, y: usize },

    #[error("Throttle curve must span input 0.0 to 1.0, got {first} to {last}")]
    DomainNotUnit { first: f64, last: f64 },

    #[error("Throttle curve x values must be strictly increasing (index {0})")]
    NotIncreasing(usize),

    #[error("Throttle curve y values must be finite, non-negative and non-decreasing (index {0})")]
    NotMonotonic(usize),

    #[error("Deadband must be in [0, 1), got {0}")]
    InvalidDeadband(f64),
}

/// Non-decreasing gain curve over [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleCurve {
    samples: Vec<f64>,
}

impl ThrottleCurve {
    /// Build a curve through the given control points
    ///
    /// `x` must start at 0.0, end at 1.0 and be strictly increasing; `y` must
    /// be non-negative and non-decreasing.
    pub fn new(x: &[f64], y: &[f64], interpolation: Interpolation) -> Result<Self, ThrottleError> {
        validate_points(x, y)?;

        let tangents = match interpolation {
            Interpolation::Linear => None,
            Interpolation::MonotoneCubic => Some(monotone_tangents(x, y)),
        };

        let samples = (0..=CURVE_RESOLUTION)
            .map(|i| {
                let input = i as f64 / CURVE_RESOLUTION as f64;
                evaluate_piecewise(x, y, tangents.as_deref(), input)
            })
            .collect();

        Ok(Self { samples })
    }

    /// Shorthand for a linear curve
    pub fn linear(x: &[f64], y: &[f64]) -> Result<Self, ThrottleError> {
        Self::new(x, y, Interpolation::Linear)
    }

    /// Evaluate the curve; the input is clamped to [0, 1] first
    pub fn value(&self, input: f64) -> f64 {
        let scaled = input.clamp(0.0, 1.0) * CURVE_RESOLUTION as f64;
        let lower = scaled.floor() as usize;
        if lower >= CURVE_RESOLUTION {
            return self.samples[CURVE_RESOLUTION];
        }
        let t = scaled - lower as f64;
        self.samples[lower] + (self.samples[lower + 1] - self.samples[lower]) * t
    }

    /// Curve value at full input
    pub fn max_value(&self) -> f64 {
        self.samples[CURVE_RESOLUTION]
    }
}

fn validate_points(x: &[f64], y: &[f64]) -> Result<(), ThrottleError> {
    if x.len() != y.len() {
        return Err(ThrottleError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(ThrottleError::TooFewPoints(x.len()));
    }

    let (first, last) = (x[0], x[x.len() - 1]);
    if first != 0.0 || last != 1.0 {
        return Err(ThrottleError::DomainNotUnit { first, last });
    }

    for i in 1..x.len() {
        if !(x[i] > x[i - 1]) {
            return Err(ThrottleError::NotIncreasing(i));
        }
    }
    for i in 0..y.len() {
        let bad = !y[i].is_finite() || y[i] < 0.0 || (i > 0 && y[i] < y[i - 1]);
        if bad {
            return Err(ThrottleError::NotMonotonic(i));
        }
    }

    Ok(())
}

/// Fritsch-Carlson tangents, limited so every segment stays monotonic
fn monotone_tangents(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let secants: Vec<f64> = (0..n - 1)
        .map(|k| (y[k + 1] - y[k]) / (x[k + 1] - x[k]))
        .collect();

    let mut m = vec![0.0; n];
    m[0] = secants[0];
    m[n - 1] = secants[n - 2];
    for k in 1..n - 1 {
        m[k] = if secants[k - 1] * secants[k] <= 0.0 {
            0.0
        } else {
            (secants[k - 1] + secants[k]) / 2.0
        };
    }

    for k in 0..n - 1 {
        if secants[k] == 0.0 {
            m[k] = 0.0;
            m[k + 1] = 0.0;
            continue;
        }
        let alpha = m[k] / secants[k];
        let beta = m[k + 1] / secants[k];
        let magnitude = alpha * alpha + beta * beta;
        if magnitude > 9.0 {
            let tau = 3.0 / magnitude.sqrt();
            m[k] = tau * alpha * secants[k];
            m[k + 1] = tau * beta * secants[k];
        }
    }

    m
}

fn evaluate_piecewise(x: &[f64], y: &[f64], tangents: Option<&[f64]>, input: f64) -> f64 {
    // Segment containing the input; the last segment includes x = 1.0
    let k = x
        .windows(2)
        .position(|w| input <= w[1])
        .unwrap_or(x.len() - 2);
    let h = x[k + 1] - x[k];
    let t = ((input - x[k]) / h).clamp(0.0, 1.0);

    match tangents {
        None => y[k] + (y[k + 1] - y[k]) * t,
        Some(m) => {
            let t2 = t * t;
            let t3 = t2 * t;
            let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
            let h10 = t3 - 2.0 * t2 + t;
            let h01 = -2.0 * t3 + 3.0 * t2;
            let h11 = t3 - t2;
            h00 * y[k] + h10 * h * m[k] + h01 * y[k + 1] + h11 * h * m[k + 1]
        }
    }
}

/// Maps raw operator input to a shaped command
///
/// Inputs inside the deadband produce 0, everything else is looked up on the
/// curve by magnitude and given back its sign. Inputs beyond +/-1 saturate at
/// +/-`max_gain`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleMap {
    curve: ThrottleCurve,
    deadband: f64,
    max_gain: f64,
}

impl ThrottleMap {
    pub fn new(curve: ThrottleCurve, deadband: f64) -> Result<Self, ThrottleError> {
        if !(0.0..1.0).contains(&deadband) {
            return Err(ThrottleError::InvalidDeadband(deadband));
        }
        let max_gain = curve.max_value();
        Ok(Self {
            curve,
            deadband,
            max_gain,
        })
    }

    /// Shape one raw input sample
    pub fn throttle_lookup(&self, input: f64) -> f64 {
        if input.is_nan() || input.abs() < self.deadband {
            return 0.0;
        }
        let magnitude = self.curve.value(input.abs()).min(self.max_gain);
        magnitude.copysign(input)
    }

    pub fn max_gain(&self) -> f64 {
        self.max_gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELTA: f64 = 1e-5;
    const ALT_DELTA: f64 = 0.15;
    const CONTROLLER_DEADBAND: f64 = 0.10;
    const CURVE_X: [f64; 11] = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
    const CURVE_Y: [f64; 11] = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0, 1.2, 1.4, 1.6, 1.8, 2.0];

    fn throttle_map(interpolation: Interpolation) -> ThrottleMap {
        let curve = ThrottleCurve::new(&CURVE_X, &CURVE_Y, interpolation).unwrap();
        ThrottleMap::new(curve, CONTROLLER_DEADBAND).unwrap()
    }

    #[test]
    fn test_returns_zero() {
        let map = throttle_map(Interpolation::MonotoneCubic);
        assert!((map.throttle_lookup(0.0)).abs() < DELTA);
    }

    #[test]
    fn test_ignores_deadband() {
        let map = throttle_map(Interpolation::MonotoneCubic);
        assert_eq!(map.throttle_lookup(0.05), 0.0);
        assert_eq!(map.throttle_lookup(-0.0999), 0.0);
    }

    #[test]
    fn test_deadband_boundary_is_evaluated() {
        let map = throttle_map(Interpolation::Linear);
        assert!((map.throttle_lookup(CONTROLLER_DEADBAND) - 0.2).abs() < DELTA);
    }

    #[test]
    fn test_negative_input() {
        let map = throttle_map(Interpolation::MonotoneCubic);
        assert!((map.throttle_lookup(-0.5) - -1.0).abs() < ALT_DELTA);
    }

    #[test]
    fn test_positive_input() {
        let map = throttle_map(Interpolation::MonotoneCubic);
        assert!((map.throttle_lookup(0.5) - 1.0).abs() < ALT_DELTA);
    }

    #[test]
    fn test_illegal_input_saturates() {
        let map = throttle_map(Interpolation::MonotoneCubic);
        assert!((map.throttle_lookup(-1.5) - -2.0).abs() < DELTA);
        assert!((map.throttle_lookup(1.5) - 2.0).abs() < DELTA);
        assert_eq!(map.max_gain(), 2.0);
    }

    #[test]
    fn test_nan_input_is_zero() {
        let map = throttle_map(Interpolation::Linear);
        assert_eq!(map.throttle_lookup(f64::NAN), 0.0);
    }

    #[test]
    fn test_cubic_curve_does_not_overshoot() {
        // Flat then steep: an unconstrained spline would dip below 0 and
        // overshoot 1.0 here
        let x = [0.0, 0.4, 0.5, 1.0];
        let y = [0.0, 0.0, 1.0, 1.0];
        let curve = ThrottleCurve::new(&x, &y, Interpolation::MonotoneCubic).unwrap();

        let mut previous = curve.value(0.0);
        for i in 0..=1000 {
            let v = curve.value(i as f64 / 1000.0);
            assert!(v >= previous - 1e-12, "curve decreased at {}", i);
            assert!((0.0..=1.0 + 1e-12).contains(&v));
            previous = v;
        }
    }

    #[test]
    fn test_rejects_bad_curves() {
        assert_eq!(
            ThrottleCurve::linear(&[0.0], &[0.0]),
            Err(ThrottleError::TooFewPoints(1))
        );
        assert_eq!(
            ThrottleCurve::linear(&[0.0, 1.0], &[0.0]),
            Err(ThrottleError::LengthMismatch { x: 2, y: 1 })
        );
        assert_eq!(
            ThrottleCurve::linear(&[0.0, 0.8], &[0.0, 1.0]),
            Err(ThrottleError::DomainNotUnit {
                first: 0.0,
                last: 0.8
            })
        );
        assert_eq!(
            ThrottleCurve::linear(&[0.0, 0.5, 0.5, 1.0], &[0.0, 0.1, 0.2, 1.0]),
            Err(ThrottleError::NotIncreasing(2))
        );
        assert_eq!(
            ThrottleCurve::linear(&[0.0, 0.5, 1.0], &[0.0, 0.6, 0.4]),
            Err(ThrottleError::NotMonotonic(2))
        );
    }

    #[test]
    fn test_rejects_bad_deadband() {
        let curve = ThrottleCurve::linear(&[0.0, 1.0], &[0.0, 1.0]).unwrap();
        assert_eq!(
            ThrottleMap::new(curve.clone(), 1.0),
            Err(ThrottleError::InvalidDeadband(1.0))
        );
        assert_eq!(
            ThrottleMap::new(curve, -0.1),
            Err(ThrottleError::InvalidDeadband(-0.1))
        );
    }
}
