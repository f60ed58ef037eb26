// In-memory actuators for running a module without hardware
//
// Ideal response: a position setpoint is reached within one tick and a
// velocity setpoint is tracked exactly and integrated over the loop period.
// Handles are cheap clones sharing one state, so a caller can keep a copy to
// observe commands or inject feedback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::actuator::{
    AbsoluteEncoder, Actuator, ActuatorError, ActuatorInputs, ControlMode, IdleMode, MotorKind,
    PidConfig, Result, RotateActuator,
};

/// Everything a simulated motor controller remembers
#[derive(Debug, Clone, Default)]
pub struct SimMotorState {
    pub inputs: ActuatorInputs,
    pub command: Option<(f64, ControlMode)>,
    pub position_factor: f64,
    pub velocity_factor: f64,
    pub pid: Option<PidConfig>,
    pub idle_mode: Option<IdleMode>,
    pub current_limit: Option<u32>,
    pub wrapping: Option<(f64, f64)>,
    pub encoder_resets: usize,
    pub flash_burns: usize,
    pub stopped: bool,
    /// When set, every configuration call fails with this reason
    pub rejection: Option<String>,
}

/// Simulated closed-loop motor controller
#[derive(Debug, Clone)]
pub struct SimMotor {
    name: String,
    kind: MotorKind,
    period: Duration,
    state: Arc<Mutex<SimMotorState>>,
}

impl SimMotor {
    /// Create a simulated motor stepped once every `period`
    pub fn new(name: impl Into<String>, kind: MotorKind, period: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            period,
            state: Arc::new(Mutex::new(SimMotorState::default())),
        }
    }

    /// Snapshot of the shared state
    pub fn snapshot(&self) -> SimMotorState {
        self.state().clone()
    }

    /// Overwrite the measured feedback, e.g. to model an external push
    pub fn inject_inputs(&self, inputs: ActuatorInputs) {
        self.state().inputs = inputs;
    }

    /// Make every later configuration call fail, e.g. to model a dead bus
    pub fn reject_configuration(&self, reason: impl Into<String>) {
        self.state().rejection = Some(reason.into());
    }

    fn state(&self) -> MutexGuard<'_, SimMotorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn configure(&self, apply: impl FnOnce(&mut SimMotorState)) -> Result<()> {
        let mut state = self.state();
        if let Some(reason) = &state.rejection {
            return Err(ActuatorError::Configuration {
                name: self.name.clone(),
                reason: reason.clone(),
            });
        }
        apply(&mut *state);
        Ok(())
    }
}

impl Actuator for SimMotor {
    fn kind(&self) -> MotorKind {
        self.kind
    }

    fn set_position_conversion_factor(&mut self, factor: f64) -> Result<()> {
        self.configure(|state| state.position_factor = factor)
    }

    fn set_velocity_conversion_factor(&mut self, factor: f64) -> Result<()> {
        self.configure(|state| state.velocity_factor = factor)
    }

    fn initialize_pid(&mut self, config: &PidConfig) -> Result<()> {
        self.configure(|state| state.pid = Some(*config))
    }

    fn set_idle_mode(&mut self, mode: IdleMode) -> Result<()> {
        debug!("{}: idle mode {:?}", self.name, mode);
        self.configure(|state| state.idle_mode = Some(mode))
    }

    fn set_current_limit(&mut self, limit: u32) -> Result<()> {
        self.configure(|state| state.current_limit = Some(limit))
    }

    fn burn_flash(&mut self) -> Result<()> {
        self.configure(|state| state.flash_burns += 1)
    }

    fn periodic(&mut self) {
        let dt = self.period.as_secs_f64();
        let mut state = self.state();
        let command = if state.stopped { None } else { state.command };
        match command {
            Some((velocity, ControlMode::Velocity)) => {
                state.inputs.encoder_velocity = velocity;
                state.inputs.encoder_position += velocity * dt;
            }
            Some((position, ControlMode::Position)) => {
                let delta = position - state.inputs.encoder_position;
                state.inputs.encoder_velocity = if dt > 0.0 { delta / dt } else { 0.0 };
                state.inputs.encoder_position = position;
            }
            None => state.inputs.encoder_velocity = 0.0,
        }
    }

    fn inputs(&self) -> ActuatorInputs {
        self.state().inputs
    }

    fn set(&mut self, value: f64, mode: ControlMode) {
        let mut state = self.state();
        state.command = Some((value, mode));
        state.stopped = false;
    }

    fn reset_encoder(&mut self, position: f64) {
        let mut state = self.state();
        state.inputs.encoder_position = position;
        state.encoder_resets += 1;
    }

    fn stop(&mut self) {
        let mut state = self.state();
        state.stopped = true;
        state.command = None;
        state.inputs.encoder_velocity = 0.0;
    }
}

impl RotateActuator for SimMotor {
    fn enable_position_wrapping(&mut self, min: f64, max: f64) -> Result<()> {
        self.configure(|state| state.wrapping = Some((min, max)))
    }
}

/// Simulated absolute encoder
///
/// Either reports a settable reading or tracks the position of the rotate
/// motor it is mounted with.
#[derive(Debug, Clone)]
pub struct SimAbsoluteEncoder {
    reading: Arc<Mutex<f64>>,
    mounted_on: Option<SimMotor>,
    cached: f64,
}

impl SimAbsoluteEncoder {
    pub fn new(position: f64) -> Self {
        Self {
            reading: Arc::new(Mutex::new(position)),
            mounted_on: None,
            cached: position,
        }
    }

    /// Encoder that follows `motor`'s encoder position on every refresh
    pub fn mounted_on(motor: SimMotor) -> Self {
        let position = motor.inputs().encoder_position;
        Self {
            reading: Arc::new(Mutex::new(position)),
            mounted_on: Some(motor),
            cached: position,
        }
    }

    /// Set the value the next `periodic` call will latch
    pub fn set_position(&self, position: f64) {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner) = position;
    }
}

impl AbsoluteEncoder for SimAbsoluteEncoder {
    fn periodic(&mut self) {
        let mut reading = self.reading.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(motor) = &self.mounted_on {
            *reading = motor.inputs().encoder_position;
        }
        self.cached = *reading;
    }

    fn absolute_position(&self) -> f64 {
        self.cached
    }
}
