// Motor and sensor handles for a swerve module
//
// Provides:
// - Actuator / rotate actuator / absolute encoder traits that hardware
//   bindings implement
// - Ideal in-memory implementations for running without hardware

pub mod actuator;
pub mod sim;

pub use actuator::{
    AbsoluteEncoder, Actuator, ActuatorError, ActuatorInputs, ControlMode, IdleMode, MotorKind,
    PidConfig, PidConstants, RotateActuator,
};
pub use sim::{SimAbsoluteEncoder, SimMotor};
