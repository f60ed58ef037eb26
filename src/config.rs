// Timeouts, topics, platform configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::drive::{
    GearRatio, Interpolation, ModuleLocation, ModuleSettings, ThrottleCurve, ThrottleError,
    ThrottleMap,
};
use crate::motor::MotorKind;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_MODULES: &str = "swerve/cmd/modules"; // commands
pub const TOPIC_RT_MODULES: &str = "swerve/rt/modules"; // telemetry
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid throttle curve: {0}")]
    Throttle(#[from] ThrottleError),
}

/// Throttle curve control points, as fractions of full speed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub deadband: f64,
    pub interpolation: Interpolation,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // Quadratic response: fine control near zero, full speed at full stick
        let x: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
        let y = x.iter().map(|v| v * v).collect();
        Self {
            x,
            y,
            deadband: 0.05,
            interpolation: Interpolation::MonotoneCubic,
        }
    }
}

impl ThrottleConfig {
    pub fn build(&self) -> Result<ThrottleMap, ThrottleError> {
        let curve = ThrottleCurve::new(&self.x, &self.y, self.interpolation)?;
        ThrottleMap::new(curve, self.deadband)
    }
}

/// Platform configuration shared by every module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Units: meters
    pub wheelbase: f64,
    /// Units: meters
    pub track_width: f64,
    pub drive_gear_ratio: GearRatio,
    pub drive_motor: MotorKind,
    /// Units: seconds
    pub auto_lock_time: f64,
    pub slip_ratio: f64,
    pub traction_control: bool,
    pub auto_lock: bool,
    pub throttle: ThrottleConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            wheelbase: 0.6,
            track_width: 0.6,
            drive_gear_ratio: GearRatio::L3,
            drive_motor: MotorKind::Neo,
            auto_lock_time: 3.0,
            slip_ratio: 0.08,
            traction_control: true,
            auto_lock: true,
            throttle: ThrottleConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load from a JSON file, or use defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                info!("Loading config from {}", path.display());
                let text = std::fs::read_to_string(path)?;
                Self::from_json(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("wheelbase", self.wheelbase), ("track_width", self.track_width)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)));
            }
        }
        if !matches!(self.drive_motor, MotorKind::Neo | MotorKind::NeoVortex) {
            return Err(ConfigError::Invalid(format!(
                "drive_motor must be neo or neo_vortex, got {:?}",
                self.drive_motor
            )));
        }
        if self.drive_gear_ratio == GearRatio::Steer {
            return Err(ConfigError::Invalid("drive_gear_ratio cannot be the steering ratio".into()));
        }
        self.throttle.build()?;
        Ok(())
    }

    /// Construction settings for the module at `location`
    pub fn module_settings(&self, location: ModuleLocation) -> ModuleSettings {
        ModuleSettings {
            location,
            drive_gear_ratio: self.drive_gear_ratio,
            wheelbase: self.wheelbase,
            track_width: self.track_width,
            auto_lock_time: self.auto_lock_time,
            slip_ratio: self.slip_ratio,
        }
    }
}
