// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::drive::{AutoLockPhase, ModuleLocation, ModulePosition, ModuleState, NUM_MODULES};

/// Command from teleop/scripts -> runtime
///
/// `states` is indexed by module location (left front, right front, left
/// rear, right rear). When both chassis measurements are present the runtime
/// applies traction control.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModuleCommand {
    pub states: [ModuleState; NUM_MODULES],
    /// Chassis speed over ground, m/s
    #[serde(default)]
    pub inertial_velocity: Option<f64>,
    /// Chassis yaw rate, deg/s
    #[serde(default)]
    pub rotation_rate: Option<f64>,
    /// Turn every module to the lock orientation now
    #[serde(default)]
    pub lock: bool,
}

impl ModuleCommand {
    /// Same speed and heading on every module
    pub fn uniform(state: ModuleState) -> Self {
        Self {
            states: [state; NUM_MODULES],
            ..Self::default()
        }
    }

    /// Chassis measurements for traction control, if both were sent
    pub fn chassis_motion(&self) -> Option<(f64, f64)> {
        self.inertial_velocity.zip(self.rotation_rate)
    }
}

/// Per-module telemetry published by runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleTelemetry {
    pub location: ModuleLocation,
    pub state: ModuleState,
    pub position: ModulePosition,
    pub auto_lock: AutoLockPhase,
    pub traction_control: bool,
    pub slipping: bool,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::Rotation;

    #[test]
    fn test_command_optional_fields_default() {
        let json = r#"{"states": [
            {"speed": 1.0, "angle": 0.0},
            {"speed": 1.0, "angle": 0.0},
            {"speed": 1.0, "angle": 0.0},
            {"speed": 1.0, "angle": 0.0}
        ]}"#;
        let cmd: ModuleCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.states[3].speed, 1.0);
        assert_eq!(cmd.chassis_motion(), None);
        assert!(!cmd.lock);
    }

    #[test]
    fn test_chassis_motion_needs_both() {
        let mut cmd = ModuleCommand::uniform(ModuleState::new(0.5, Rotation::ZERO));
        cmd.inertial_velocity = Some(0.4);
        assert_eq!(cmd.chassis_motion(), None);
        cmd.rotation_rate = Some(10.0);
        assert_eq!(cmd.chassis_motion(), Some((0.4, 10.0)));
    }

    #[test]
    fn test_command_round_trips_as_json() {
        let cmd = ModuleCommand::uniform(ModuleState::new(-0.25, Rotation::from_radians(1.0)));
        let json = serde_json::to_string(&cmd).unwrap();
        let parsed: ModuleCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn test_health_names() {
        assert_eq!(serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(), "\"cmd_stale\"");
    }
}
