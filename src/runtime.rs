// 50 Hz loop with watchdog
// Drives four swerve modules from the latest command. If commands stop
// arriving for longer than CMD_TIMEOUT every module is stopped until a fresh
// command shows up.

use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::config::{CMD_TIMEOUT, LOOP_HZ, RuntimeConfig, TOPIC_CMD_MODULES, TOPIC_HEALTH, TOPIC_RT_MODULES};
use crate::drive::{ModuleError, ModuleHardware, ModuleLocation, SwerveModule};
use crate::messages::{ModuleCommand, ModuleTelemetry, RuntimeHealth};
use crate::motor::{AbsoluteEncoder, Actuator, MotorKind, RotateActuator, SimAbsoluteEncoder, SimMotor};

pub struct Runtime<D, R, E, C>
where
    D: Actuator,
    R: RotateActuator,
    E: AbsoluteEncoder,
    C: Clock,
{
    modules: Vec<SwerveModule<D, R, E, C>>,
    clock: C,
    latest_cmd: Option<ModuleCommand>,
    cmd_received_at: Duration,
    health: RuntimeHealth,
}

impl<D, R, E, C> Runtime<D, R, E, C>
where
    D: Actuator,
    R: RotateActuator,
    E: AbsoluteEncoder,
    C: Clock,
{
    pub fn new(modules: Vec<SwerveModule<D, R, E, C>>, clock: C) -> Self {
        let cmd_received_at = clock.now();
        Self {
            modules,
            clock,
            latest_cmd: None,
            cmd_received_at,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: ModuleCommand) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = self.clock.now();
    }

    /// Run one control tick and return telemetry for every module
    pub fn tick(&mut self) -> Vec<ModuleTelemetry> {
        for module in &mut self.modules {
            module.periodic();
        }

        let cmd_age = self.clock.now().saturating_sub(self.cmd_received_at);
        match &self.latest_cmd {
            Some(cmd) if cmd_age <= CMD_TIMEOUT => {
                if self.health != RuntimeHealth::Ok {
                    info!("Commands flowing, driving modules");
                }
                self.health = RuntimeHealth::Ok;
                for module in &mut self.modules {
                    if cmd.lock {
                        module.lock();
                    } else if let Some((velocity, rate)) = cmd.chassis_motion() {
                        module.set_from_states_with_traction(&cmd.states, velocity, rate);
                    } else {
                        module.set_from_states(&cmd.states);
                    }
                }
            }
            _ => {
                // Watchdog triggered (or no command ever received) - stop the modules
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping modules", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                for module in &mut self.modules {
                    module.stop();
                }
            }
        }

        self.telemetry()
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn modules(&self) -> &[SwerveModule<D, R, E, C>] {
        &self.modules
    }

    fn telemetry(&self) -> Vec<ModuleTelemetry> {
        self.modules
            .iter()
            .map(|module| ModuleTelemetry {
                location: module.location(),
                state: module.state(),
                position: module.position(),
                auto_lock: module.auto_lock_phase(),
                traction_control: module.is_traction_control_enabled(),
                slipping: module.is_slipping(),
            })
            .collect()
    }
}

pub type SimModule<C> = SwerveModule<SimMotor, SimMotor, SimAbsoluteEncoder, C>;

/// Build one module on simulated hardware
///
/// The absolute encoder follows the rotate motor, so drift resync is a no-op.
pub fn sim_module<C: Clock>(
    config: &RuntimeConfig,
    location: ModuleLocation,
    clock: C,
) -> Result<SimModule<C>, ModuleError> {
    let period = Duration::from_millis(1000 / LOOP_HZ);
    let name = format!("{:?}", location).to_lowercase();
    let drive = SimMotor::new(format!("{}_drive", name), config.drive_motor, period);
    let rotate = SimMotor::new(format!("{}_rotate", name), MotorKind::Neo, period);
    let encoder = SimAbsoluteEncoder::mounted_on(rotate.clone());

    let hardware = ModuleHardware::new(drive, rotate, encoder);
    let mut module = SwerveModule::with_clock(hardware, config.module_settings(location), clock)?;
    apply_defaults(&mut module, config);
    Ok(module)
}

/// Apply the configured traction-control and auto-lock defaults
pub fn apply_defaults<D, R, E, C>(module: &mut SwerveModule<D, R, E, C>, config: &RuntimeConfig)
where
    D: Actuator,
    R: RotateActuator,
    E: AbsoluteEncoder,
    C: Clock,
{
    module.set_auto_lock(config.auto_lock);
    if !config.traction_control {
        module.disable_traction_control();
    }
}

pub async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let clock = MonotonicClock::new();
    let modules = ModuleLocation::ALL
        .iter()
        .map(|&location| sim_module(&config, location, clock))
        .collect::<Result<Vec<_>, _>>()?;
    info!("Built {} simulated modules", modules.len());

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MODULES).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_RT_MODULES).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(modules, clock);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_MODULES);
    info!("Publishing to: {}, {}", TOPIC_RT_MODULES, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ModuleCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Refresh inputs and drive the modules (includes watchdog logic)
        let telemetry = runtime.tick();

        // 3. Publish telemetry
        let telemetry_json = serde_json::to_string(&telemetry)?;
        pub_telemetry.put(telemetry_json).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::drive::{AutoLockPhase, ModuleState, Rotation};

    fn runtime(config: &RuntimeConfig) -> (Runtime<SimMotor, SimMotor, SimAbsoluteEncoder, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let modules = ModuleLocation::ALL
            .iter()
            .map(|&location| sim_module(config, location, clock.clone()).unwrap())
            .collect();
        (Runtime::new(modules, clock.clone()), clock)
    }

    fn step(clock: &ManualClock) {
        clock.advance(Duration::from_millis(1000 / LOOP_HZ));
    }

    #[test]
    fn test_starts_stale_and_stopped() {
        let (mut rt, _clock) = runtime(&RuntimeConfig::default());
        let telemetry = rt.tick();
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        assert_eq!(telemetry.len(), 4);
        assert!(telemetry.iter().all(|t| t.state.speed == 0.0));
    }

    #[test]
    fn test_fresh_command_drives_modules() {
        let (mut rt, clock) = runtime(&RuntimeConfig::default());
        let mut cmd = ModuleCommand::uniform(ModuleState::new(1.0, Rotation::ZERO));
        cmd.states[2].speed = 0.5;
        rt.on_command(cmd);

        rt.tick();
        step(&clock);
        let telemetry = rt.tick();

        assert_eq!(rt.health(), RuntimeHealth::Ok);
        let speeds: Vec<f64> = telemetry.iter().map(|t| t.state.speed.abs()).collect();
        assert_eq!(speeds, vec![1.0, 1.0, 0.5, 1.0]);
        assert!(telemetry.iter().all(|t| t.auto_lock == AutoLockPhase::Driving));
    }

    #[test]
    fn test_watchdog_stops_modules() {
        let (mut rt, clock) = runtime(&RuntimeConfig::default());
        rt.on_command(ModuleCommand::uniform(ModuleState::new(1.0, Rotation::ZERO)));
        rt.tick();
        assert_eq!(rt.health(), RuntimeHealth::Ok);

        clock.advance(CMD_TIMEOUT + Duration::from_millis(1));
        rt.tick();
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);

        let telemetry = rt.tick();
        assert!(telemetry.iter().all(|t| t.state.speed == 0.0));
    }

    #[test]
    fn test_lock_command_locks_every_module() {
        let (mut rt, clock) = runtime(&RuntimeConfig::default());
        rt.on_command(ModuleCommand {
            lock: true,
            ..ModuleCommand::default()
        });
        rt.tick();
        step(&clock);
        let telemetry = rt.tick();

        assert!(telemetry.iter().all(|t| t.auto_lock == AutoLockPhase::Locked));
        // Every wheel points at the chassis centre
        let angles: Vec<f64> = telemetry.iter().map(|t| t.state.angle.degrees()).collect();
        let expected = [45.0, -45.0, 135.0, -135.0];
        for (angle, expected) in angles.iter().zip(expected) {
            assert!((angle - expected).abs() < 1e-6, "{:?}", angles);
        }
    }

    #[test]
    fn test_traction_applied_with_chassis_motion() {
        let (mut rt, clock) = runtime(&RuntimeConfig::default());
        // Chassis reported stationary while the wheels are asked for 2 m/s
        let mut cmd = ModuleCommand::uniform(ModuleState::new(2.0, Rotation::ZERO));
        cmd.inertial_velocity = Some(0.0);
        cmd.rotation_rate = Some(0.0);
        rt.on_command(cmd);

        // Wheels at rest: no slip, full request goes out
        let telemetry = rt.tick();
        assert!(telemetry.iter().all(|t| !t.slipping));

        // Wheels now spin at 2 m/s over stationary ground
        step(&clock);
        let telemetry = rt.tick();
        assert!(telemetry.iter().all(|t| (t.state.speed.abs() - 2.0).abs() < 1e-9));
        assert!(telemetry.iter().all(|t| t.slipping));

        step(&clock);
        let telemetry = rt.tick();
        assert!(telemetry.iter().all(|t| t.state.speed.abs() < 0.1));
    }

    #[test]
    fn test_config_defaults_applied() {
        let config = RuntimeConfig {
            traction_control: false,
            auto_lock: false,
            ..RuntimeConfig::default()
        };
        let (rt, _clock) = runtime(&config);
        assert!(rt.modules().iter().all(|m| !m.is_traction_control_enabled()));
        assert!(rt.modules().iter().all(|m| !m.is_auto_lock_enabled()));
    }
}
