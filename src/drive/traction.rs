// Slip-ratio traction control
//
// Caps the commanded wheel speed so the wheel surface never runs ahead of the
// ground by more than the target slip ratio.

use tracing::{info, trace};

/// Ground speed below which slip is measured against this floor instead
///
/// Units: meters/second
pub const MIN_GROUND_SPEED: f64 = 0.1;

/// Error types for traction control setup
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TractionError {
    #[error("Target slip ratio must be positive, got {0}")]
    InvalidSlipRatio(f64),

    #[error("Max linear speed must be positive, got {0} m/s")]
    InvalidMaxSpeed(f64),
}

/// Limits wheel speed from measured vs. true ground speed
#[derive(Debug, Clone)]
pub struct TractionControlController {
    max_linear_speed: f64,
    optimal_slip_ratio: f64,
    enabled: bool,
    slipping: bool,
}

impl TractionControlController {
    /// Create an enabled controller
    ///
    /// # Arguments
    /// * `max_linear_speed` - Fastest the wheel may be commanded, m/s
    /// * `slip_ratio` - Target slip ratio, e.g. 0.08 for 8%
    pub fn new(max_linear_speed: f64, slip_ratio: f64) -> Result<Self, TractionError> {
        if !(slip_ratio.is_finite() && slip_ratio > 0.0) {
            return Err(TractionError::InvalidSlipRatio(slip_ratio));
        }
        if !(max_linear_speed.is_finite() && max_linear_speed > 0.0) {
            return Err(TractionError::InvalidMaxSpeed(max_linear_speed));
        }

        Ok(Self {
            max_linear_speed,
            optimal_slip_ratio: slip_ratio,
            enabled: true,
            slipping: false,
        })
    }

    /// Compute the speed to actually command
    ///
    /// # Arguments
    /// * `velocity_request` - Desired wheel speed, m/s
    /// * `ground_speed` - True ground speed at the wheel, m/s
    /// * `wheel_speed` - Measured wheel surface speed, m/s
    pub fn calculate(&mut self, velocity_request: f64, ground_speed: f64, wheel_speed: f64) -> f64 {
        if !self.enabled {
            return velocity_request;
        }

        let reference = ground_speed.abs().max(MIN_GROUND_SPEED);
        let slip_ratio = (wheel_speed - ground_speed) / reference;

        let mut limit = self.max_linear_speed;
        self.slipping = slip_ratio.abs() > self.optimal_slip_ratio;
        if self.slipping {
            limit = limit.min(ground_speed.abs() + self.optimal_slip_ratio * reference);
        }

        let magnitude = velocity_request.abs().min(limit);
        if magnitude < velocity_request.abs() {
            trace!(
                "Traction control limited {:.3} m/s to {:.3} m/s (slip {:.3})",
                velocity_request, magnitude, slip_ratio
            );
        }
        magnitude.copysign(velocity_request)
    }

    /// Whether the last enabled `calculate` saw excess slip
    pub fn is_slipping(&self) -> bool {
        self.slipping
    }

    pub fn enable(&mut self) {
        info!("Traction control enabled");
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        info!("Traction control disabled");
        self.enabled = false;
        self.slipping = false;
    }

    pub fn toggle(&mut self) {
        if self.enabled {
            self.disable();
        } else {
            self.enable();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_SPEED: f64 = 4.5;
    const SLIP_RATIO: f64 = 0.08;
    const DELTA: f64 = 1e-9;

    fn controller() -> TractionControlController {
        TractionControlController::new(MAX_SPEED, SLIP_RATIO).unwrap()
    }

    #[test]
    fn test_disabled_passes_through() {
        let mut tc = controller();
        tc.disable();
        assert_eq!(tc.calculate(3.0, 0.0, 10.0), 3.0);
        assert_eq!(tc.calculate(-7.0, 1.0, 1.0), -7.0);
        assert!(!tc.is_slipping());
    }

    #[test]
    fn test_no_slip_keeps_request() {
        let mut tc = controller();
        let out = tc.calculate(2.0, 1.5, 1.55);
        assert!((out - 2.0).abs() < DELTA);
        assert!(!tc.is_slipping());
    }

    #[test]
    fn test_spinning_wheel_is_limited() {
        let mut tc = controller();
        // Wheel at 3 m/s while the chassis moves at 1 m/s
        let out = tc.calculate(4.0, 1.0, 3.0);
        assert!(tc.is_slipping());
        assert!((out - 1.08).abs() < DELTA);
    }

    #[test]
    fn test_limit_preserves_sign() {
        let mut tc = controller();
        let out = tc.calculate(-4.0, -1.0, -3.0);
        assert!((out - -1.08).abs() < DELTA);
    }

    #[test]
    fn test_standstill_uses_floor() {
        let mut tc = controller();
        // Chassis not moving, wheel spinning: the floor keeps the ratio finite
        let out = tc.calculate(2.0, 0.0, 1.0);
        assert!((out - SLIP_RATIO * MIN_GROUND_SPEED).abs() < DELTA);
        assert!(out.is_finite());
    }

    #[test]
    fn test_never_exceeds_max_speed() {
        let mut tc = controller();
        assert!((tc.calculate(10.0, 4.4, 4.4) - MAX_SPEED).abs() < DELTA);
    }

    #[test]
    fn test_toggle() {
        let mut tc = controller();
        assert!(tc.is_enabled());
        tc.toggle();
        assert!(!tc.is_enabled());
        tc.toggle();
        assert!(tc.is_enabled());
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert_eq!(
            TractionControlController::new(MAX_SPEED, 0.0).unwrap_err(),
            TractionError::InvalidSlipRatio(0.0)
        );
        assert_eq!(
            TractionControlController::new(-1.0, SLIP_RATIO).unwrap_err(),
            TractionError::InvalidMaxSpeed(-1.0)
        );
        assert!(TractionControlController::new(MAX_SPEED, f64::NAN).is_err());
    }
}
