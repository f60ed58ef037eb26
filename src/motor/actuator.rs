// Actuator and sensor handles consumed by a swerve module
//
// Hardware bindings (motor controllers, absolute encoders) live outside this
// crate. They plug in by implementing these traits. Configuration calls are
// fallible and only made at setup; per-tick calls never fail.

use serde::{Deserialize, Serialize};

/// Brushless motor families a module can be built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorKind {
    Neo,
    NeoVortex,
    Neo550,
}

impl MotorKind {
    /// Free speed of the motor
    ///
    /// Units: rotations/minute
    pub fn max_rpm(&self) -> f64 {
        match self {
            MotorKind::Neo => 5676.0,
            MotorKind::NeoVortex => 6784.0,
            MotorKind::Neo550 => 11000.0,
        }
    }
}

/// Closed-loop mode for a motor command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Position setpoint, in the units of the position conversion factor
    Position,
    /// Velocity setpoint, in the units of the velocity conversion factor
    Velocity,
}

/// Motor behaviour when no output is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleMode {
    Brake,
    Coast,
}

/// Closed-loop gains (proportional, integral, derivative, feedforward)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidConstants {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kf: f64,
}

impl PidConstants {
    pub const fn new(kp: f64, ki: f64, kd: f64, kf: f64) -> Self {
        Self { kp, ki, kd, kf }
    }
}

/// Full closed-loop configuration for one motor controller
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidConfig {
    pub constants: PidConstants,
    pub sensor_phase: bool,
    pub invert_motor: bool,
    pub tolerance: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub soft_limits: bool,
}

/// Latest feedback sampled from a motor's integrated encoder
///
/// Values are already scaled by the configured conversion factors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActuatorInputs {
    pub encoder_position: f64,
    pub encoder_velocity: f64,
}

/// Error types for actuator configuration
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Actuator {name} rejected configuration: {reason}")]
    Configuration { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ActuatorError>;

/// A closed-loop motor handle (drive or rotate)
pub trait Actuator {
    /// Motor family behind this handle
    fn kind(&self) -> MotorKind;

    fn set_position_conversion_factor(&mut self, factor: f64) -> Result<()>;

    fn set_velocity_conversion_factor(&mut self, factor: f64) -> Result<()>;

    fn initialize_pid(&mut self, config: &PidConfig) -> Result<()>;

    fn set_idle_mode(&mut self, mode: IdleMode) -> Result<()>;

    /// Units: amps
    fn set_current_limit(&mut self, limit: u32) -> Result<()>;

    /// Persist settings across power cycles
    fn burn_flash(&mut self) -> Result<()>;

    /// Refresh cached inputs; call once per tick before reading them
    fn periodic(&mut self);

    fn inputs(&self) -> ActuatorInputs;

    /// Issue a setpoint; the latest call wins
    fn set(&mut self, value: f64, mode: ControlMode);

    /// Overwrite the integrated encoder position
    fn reset_encoder(&mut self, position: f64);

    /// Cut output immediately
    fn stop(&mut self);
}

/// A motor handle whose closed position loop can wrap around
pub trait RotateActuator: Actuator {
    /// Treat `min` and `max` as the same point for the position loop
    fn enable_position_wrapping(&mut self, min: f64, max: f64) -> Result<()>;
}

/// Absolute angle sensor on the steering axis
pub trait AbsoluteEncoder {
    /// Refresh the cached reading
    fn periodic(&mut self);

    /// Units: radians
    fn absolute_position(&self) -> f64;
}
