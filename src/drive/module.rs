// Swerve module controller
//
// Turns a desired module state into drive/rotate setpoints once per tick:
// - auto-lock: an idle module holds its heading, then turns to the lock
//   orientation once the timeout passes
// - angle optimization: never rotate more than 90 degrees
// - optional slip-ratio traction control
// - drift resync of the rotate encoder from the absolute encoder while the
//   module is not steering

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::geometry::{
    GearRatio, ModuleCoordinate, ModuleLocation, ModulePosition, ModuleState, NUM_MODULES,
    Rotation,
};
use super::traction::{TractionControlController, TractionError};
use crate::clock::{Clock, MonotonicClock};
use crate::motor::{
    AbsoluteEncoder, Actuator, ActuatorError, ControlMode, IdleMode, MotorKind, PidConfig,
    PidConstants, RotateActuator,
};

/// Speeds and steering rates below this count as zero
const EPSILON: f64 = 5e-3;

/// Units: amps
const DRIVE_MOTOR_CURRENT_LIMIT: u32 = 50;
const ROTATE_MOTOR_CURRENT_LIMIT: u32 = 30;

/// Motor-frame heading every module turns to when locked
const LOCK_POSITION: f64 = FRAC_PI_4;

/// 4 inch wheels
const DRIVE_WHEEL_DIAMETER_METERS: f64 = 4.0 * 0.0254;
const DRIVETRAIN_EFFICIENCY: f64 = 0.90;

/// Longest allowed auto-lock timeout
pub const MAX_AUTO_LOCK_TIME: Duration = Duration::from_secs(10);

/// Stationary ticks tolerated before the rotate encoder is resynced
const DRIFT_SYNC_TICKS: u32 = 5;

// Drive velocity loop
const DRIVE_VELOCITY_KP: f64 = 0.04;
const DRIVE_VELOCITY_TOLERANCE: f64 = 0.01;
const DRIVE_VELOCITY_SENSOR_PHASE: bool = false;
const DRIVE_INVERT_MOTOR: bool = false;

// Rotate position loop
const ROTATE_PID: PidConstants = PidConstants::new(1.0, 0.0, 0.0, 0.0);
const ROTATE_TOLERANCE: f64 = 0.01;
const ROTATE_SENSOR_PHASE: bool = true;
const ROTATE_INVERT_MOTOR: bool = false;

/// Error types for module setup
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Drive motor must be a NEO or a NEO Vortex, got {0:?}")]
    UnsupportedDriveMotor(MotorKind),

    #[error("Auto-lock time must be a non-negative number of seconds, got {0}")]
    InvalidAutoLockTime(f64),

    #[error("Traction control: {0}")]
    Traction(#[from] TractionError),

    #[error("Actuator setup failed: {0}")]
    Actuator(#[from] ActuatorError),
}

/// Hardware handles a module takes ownership of
pub struct ModuleHardware<D, R, E> {
    pub drive_motor: D,
    pub rotate_motor: R,
    pub absolute_encoder: E,
}

impl<D, R, E> ModuleHardware<D, R, E> {
    pub fn new(drive_motor: D, rotate_motor: R, absolute_encoder: E) -> Self {
        Self {
            drive_motor,
            rotate_motor,
            absolute_encoder,
        }
    }
}

/// Construction-time settings for one module
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleSettings {
    pub location: ModuleLocation,
    pub drive_gear_ratio: GearRatio,
    /// Units: meters
    pub wheelbase: f64,
    /// Units: meters
    pub track_width: f64,
    /// Idle time before locking, clamped to [0, 10]
    ///
    /// Units: seconds
    pub auto_lock_time: f64,
    pub slip_ratio: f64,
}

/// Where the auto-lock state machine is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoLockPhase {
    /// A non-zero speed was commanded this tick
    Driving,
    /// Idle, holding the last heading until the timeout passes
    ApproachingLock,
    /// Idle past the timeout, turned to the lock orientation
    Locked,
}

#[derive(Debug, Clone, Copy)]
struct AutoLockState {
    enabled: bool,
    timeout: Duration,
    last_drive_command: Duration,
    previous_angle: Rotation,
    phase: AutoLockPhase,
}

/// One independently steered and driven wheel
pub struct SwerveModule<D, R, E, C = MonotonicClock>
where
    D: Actuator,
    R: RotateActuator,
    E: AbsoluteEncoder,
    C: Clock,
{
    drive_motor: D,
    rotate_motor: R,
    absolute_encoder: E,
    clock: C,
    location: ModuleLocation,
    coordinate: ModuleCoordinate,
    radius: f64,
    drive_gear_ratio: GearRatio,
    max_linear_speed: f64,
    auto_lock: AutoLockState,
    traction_control: TractionControlController,
    drift_counter: u32,
}

impl<D, R, E> SwerveModule<D, R, E, MonotonicClock>
where
    D: Actuator,
    R: RotateActuator,
    E: AbsoluteEncoder,
{
    /// Create a module timed by the system monotonic clock
    pub fn new(hardware: ModuleHardware<D, R, E>, settings: ModuleSettings) -> Result<Self, ModuleError> {
        Self::with_clock(hardware, settings, MonotonicClock::new())
    }
}

impl<D, R, E, C> SwerveModule<D, R, E, C>
where
    D: Actuator,
    R: RotateActuator,
    E: AbsoluteEncoder,
    C: Clock,
{
    /// Create a module, configure its motors and seed the rotate encoder
    pub fn with_clock(
        hardware: ModuleHardware<D, R, E>,
        settings: ModuleSettings,
        clock: C,
    ) -> Result<Self, ModuleError> {
        let ModuleHardware {
            mut drive_motor,
            mut rotate_motor,
            mut absolute_encoder,
        } = hardware;

        let drive_kind = drive_motor.kind();
        if !matches!(drive_kind, MotorKind::Neo | MotorKind::NeoVortex) {
            return Err(ModuleError::UnsupportedDriveMotor(drive_kind));
        }
        let auto_lock_time = auto_lock_timeout(settings.auto_lock_time)?;

        let drive_conversion_factor =
            DRIVE_WHEEL_DIAMETER_METERS * PI / settings.drive_gear_ratio.value();
        let rotate_conversion_factor = 2.0 * PI / GearRatio::Steer.value();
        let max_linear_speed =
            (drive_kind.max_rpm() / 60.0) * drive_conversion_factor * DRIVETRAIN_EFFICIENCY;

        let traction_control = TractionControlController::new(max_linear_speed, settings.slip_ratio)?;

        drive_motor.set_position_conversion_factor(drive_conversion_factor)?;
        drive_motor.set_velocity_conversion_factor(drive_conversion_factor / 60.0)?;
        rotate_motor.set_position_conversion_factor(rotate_conversion_factor)?;
        rotate_motor.set_velocity_conversion_factor(rotate_conversion_factor / 60.0)?;

        rotate_motor
            .enable_position_wrapping(-rotate_conversion_factor / 2.0, rotate_conversion_factor / 2.0)?;

        let drive_pid = PidConfig {
            constants: PidConstants::new(
                DRIVE_VELOCITY_KP,
                0.0,
                0.0,
                1.0 / ((drive_kind.max_rpm() / 60.0) * drive_conversion_factor),
            ),
            sensor_phase: DRIVE_VELOCITY_SENSOR_PHASE,
            invert_motor: DRIVE_INVERT_MOTOR,
            tolerance: DRIVE_VELOCITY_TOLERANCE,
            ..PidConfig::default()
        };
        let rotate_pid = PidConfig {
            constants: ROTATE_PID,
            sensor_phase: ROTATE_SENSOR_PHASE,
            invert_motor: ROTATE_INVERT_MOTOR,
            tolerance: ROTATE_TOLERANCE,
            ..PidConfig::default()
        };
        drive_motor.initialize_pid(&drive_pid)?;
        rotate_motor.initialize_pid(&rotate_pid)?;

        // Traction control starts enabled, which wants a coasting drive motor
        drive_motor.set_idle_mode(IdleMode::Coast)?;
        rotate_motor.set_idle_mode(IdleMode::Brake)?;

        drive_motor.set_current_limit(DRIVE_MOTOR_CURRENT_LIMIT)?;
        rotate_motor.set_current_limit(ROTATE_MOTOR_CURRENT_LIMIT)?;

        drive_motor.reset_encoder(0.0);
        absolute_encoder.periodic();
        rotate_motor.reset_encoder(absolute_encoder.absolute_position());

        let coordinate = settings
            .location
            .coordinate(settings.wheelbase, settings.track_width);
        let radius = coordinate.norm();

        drive_motor.burn_flash()?;
        rotate_motor.burn_flash()?;

        info!(
            "{:?} module ready: gear {:?}, max speed {:.2} m/s, radius {:.3} m, auto-lock {:?}",
            settings.location, settings.drive_gear_ratio, max_linear_speed, radius, auto_lock_time
        );

        let now = clock.now();
        Ok(Self {
            drive_motor,
            rotate_motor,
            absolute_encoder,
            clock,
            location: settings.location,
            coordinate,
            radius,
            drive_gear_ratio: settings.drive_gear_ratio,
            max_linear_speed,
            auto_lock: AutoLockState {
                enabled: true,
                timeout: auto_lock_time,
                last_drive_command: now,
                previous_angle: Rotation::from_radians(LOCK_POSITION),
                phase: AutoLockPhase::Driving,
            },
            traction_control,
            drift_counter: 0,
        })
    }

    /// Refresh sensor inputs and resync the rotate encoder if stationary
    ///
    /// Call once per tick, before `set`.
    pub fn periodic(&mut self) {
        self.drive_motor.periodic();
        self.rotate_motor.periodic();
        self.absolute_encoder.periodic();

        if self.rotation_velocity().abs() > EPSILON {
            self.drift_counter = 0;
            return;
        }

        self.drift_counter += 1;
        if self.drift_counter > DRIFT_SYNC_TICKS {
            let absolute = self.absolute_encoder.absolute_position();
            debug!(
                "{:?} module: resyncing rotate encoder {:.4} -> {:.4} rad",
                self.location,
                self.rotate_motor.inputs().encoder_position,
                absolute
            );
            self.rotate_motor.reset_encoder(absolute);
            self.drift_counter = 0;
        }
    }

    /// Command speed and heading
    pub fn set(&mut self, state: ModuleState) {
        let state = self.apply_auto_lock(state);
        self.command(state);
    }

    /// Command speed and heading with traction control applied to the speed
    ///
    /// # Arguments
    /// * `inertial_velocity` - Chassis speed over ground, m/s
    /// * `rotation_rate` - Chassis yaw rate, deg/s
    pub fn set_with_traction(&mut self, mut state: ModuleState, inertial_velocity: f64, rotation_rate: f64) {
        let ground_speed = self.calculate_real_speed(inertial_velocity, rotation_rate);
        let wheel_speed = self.wheel_speed_along(state.angle);
        state.speed = self
            .traction_control
            .calculate(state.speed, ground_speed, wheel_speed);
        self.set(state);
    }

    /// Pick this module's entry from a per-platform state array
    pub fn set_from_states(&mut self, states: &[ModuleState; NUM_MODULES]) {
        self.set(states[self.location.index()]);
    }

    /// `set_from_states` with traction control
    pub fn set_from_states_with_traction(
        &mut self,
        states: &[ModuleState; NUM_MODULES],
        inertial_velocity: f64,
        rotation_rate: f64,
    ) {
        self.set_with_traction(states[self.location.index()], inertial_velocity, rotation_rate);
    }

    /// Measured speed and heading
    pub fn state(&self) -> ModuleState {
        ModuleState::new(self.drive_velocity(), self.rotate_angle() - self.location.offset())
    }

    /// Distance driven and heading
    pub fn position(&self) -> ModulePosition {
        ModulePosition {
            distance: self.drive_motor.inputs().encoder_position,
            angle: self.rotate_angle() - self.location.offset(),
        }
    }

    /// Turn to the lock orientation right away, ignoring the auto-lock timer
    pub fn lock(&mut self) {
        let offset = self.location.offset();
        self.auto_lock.phase = AutoLockPhase::Locked;
        self.command(ModuleState::new(0.0, Rotation::from_radians(LOCK_POSITION) - offset));
    }

    /// Turn to 0 degrees with no speed and restart the auto-lock timer
    pub fn reset(&mut self) {
        self.auto_lock.last_drive_command = self.clock.now();
        self.auto_lock.phase = AutoLockPhase::Driving;
        self.command(ModuleState::new(0.0, Rotation::ZERO));
    }

    pub fn reset_drive_encoder(&mut self) {
        self.drive_motor.reset_encoder(0.0);
    }

    /// Cut both motors, bypassing auto-lock
    pub fn stop(&mut self) {
        self.rotate_motor.stop();
        self.drive_motor.stop();
    }

    /// Units: meters/second
    pub fn drive_velocity(&self) -> f64 {
        self.drive_motor.inputs().encoder_velocity
    }

    /// Units: radians/second
    pub fn rotation_velocity(&self) -> f64 {
        self.rotate_motor.inputs().encoder_velocity
    }

    pub fn enable_traction_control(&mut self) {
        self.traction_control.enable();
        self.set_drive_idle_mode(IdleMode::Coast);
    }

    pub fn disable_traction_control(&mut self) {
        self.traction_control.disable();
        self.set_drive_idle_mode(IdleMode::Brake);
    }

    pub fn toggle_traction_control(&mut self) {
        if self.traction_control.is_enabled() {
            self.disable_traction_control();
        } else {
            self.enable_traction_control();
        }
    }

    pub fn is_traction_control_enabled(&self) -> bool {
        self.traction_control.is_enabled()
    }

    pub fn is_slipping(&self) -> bool {
        self.traction_control.is_slipping()
    }

    pub fn set_auto_lock(&mut self, enabled: bool) {
        self.auto_lock.enabled = enabled;
    }

    pub fn is_auto_lock_enabled(&self) -> bool {
        self.auto_lock.enabled
    }

    pub fn auto_lock_phase(&self) -> AutoLockPhase {
        self.auto_lock.phase
    }

    pub fn auto_lock_time(&self) -> Duration {
        self.auto_lock.timeout
    }

    /// Units: meters/second
    pub fn max_linear_speed(&self) -> f64 {
        self.max_linear_speed
    }

    pub fn module_coordinate(&self) -> ModuleCoordinate {
        self.coordinate
    }

    /// Distance from the platform centre, meters
    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn drive_gear_ratio(&self) -> GearRatio {
        self.drive_gear_ratio
    }

    pub fn location(&self) -> ModuleLocation {
        self.location
    }

    /// True ground speed at the wheel: chassis speed plus the yaw-rate term
    fn calculate_real_speed(&self, inertial_velocity: f64, rotation_rate: f64) -> f64 {
        inertial_velocity + rotation_rate.to_radians() * self.radius
    }

    /// Measured drive velocity signed along `heading` rather than the motor
    ///
    /// A module driving backwards reports a negative motor velocity while
    /// rolling forwards along the requested heading.
    fn wheel_speed_along(&self, heading: Rotation) -> f64 {
        let target = heading + self.location.offset();
        if (target - self.rotate_angle()).radians().abs() > FRAC_PI_2 {
            -self.drive_velocity()
        } else {
            self.drive_velocity()
        }
    }

    fn rotate_angle(&self) -> Rotation {
        Rotation::from_radians(self.rotate_motor.inputs().encoder_position)
    }

    /// Replace an idle command with the hold or lock heading
    fn apply_auto_lock(&mut self, mut state: ModuleState) -> ModuleState {
        let now = self.clock.now();
        let offset = self.location.offset();

        let phase = if self.auto_lock.enabled && state.speed.abs() < EPSILON {
            state.speed = 0.0;
            if now.saturating_sub(self.auto_lock.last_drive_command) > self.auto_lock.timeout {
                state.angle = Rotation::from_radians(LOCK_POSITION) - offset;
                AutoLockPhase::Locked
            } else {
                state.angle = self.auto_lock.previous_angle - offset;
                AutoLockPhase::ApproachingLock
            }
        } else {
            self.auto_lock.last_drive_command = now;
            AutoLockPhase::Driving
        };

        if phase != self.auto_lock.phase {
            debug!("{:?} module: auto-lock {:?} -> {:?}", self.location, self.auto_lock.phase, phase);
            self.auto_lock.phase = phase;
        }
        state
    }

    /// Apply the mounting offset, optimize and send both setpoints
    fn command(&mut self, state: ModuleState) {
        let desired = ModuleState::new(state.speed, state.angle + self.location.offset())
            .optimize(self.rotate_angle());

        self.rotate_motor
            .set(desired.angle.radians(), ControlMode::Position);
        self.drive_motor.set(desired.speed, ControlMode::Velocity);

        self.auto_lock.previous_angle = desired.angle;
    }

    fn set_drive_idle_mode(&mut self, mode: IdleMode) {
        if let Err(e) = self.drive_motor.set_idle_mode(mode) {
            warn!("{:?} module: failed to set drive idle mode {:?}: {}", self.location, mode, e);
        }
    }
}

impl<D, R, E, C> Drop for SwerveModule<D, R, E, C>
where
    D: Actuator,
    R: RotateActuator,
    E: AbsoluteEncoder,
    C: Clock,
{
    fn drop(&mut self) {
        self.stop();
    }
}

/// Validate the auto-lock time and clamp it to the allowed maximum
fn auto_lock_timeout(seconds: f64) -> Result<Duration, ModuleError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ModuleError::InvalidAutoLockTime(seconds));
    }
    let max = MAX_AUTO_LOCK_TIME.as_secs_f64();
    if seconds > max {
        warn!("Auto-lock time {}s exceeds {}s, clamping", seconds, max);
    }
    Ok(Duration::from_secs_f64(seconds.min(max)))
}
