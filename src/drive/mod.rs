// Swerve drive control
//
// Provides:
// - Geometry and state types (headings, module states, locations)
// - Throttle input shaping
// - Slip-ratio traction control
// - The per-module controller

pub mod geometry;
pub mod module;
pub mod throttle;
pub mod traction;

pub use geometry::{
    GearRatio, ModuleCoordinate, ModuleLocation, ModulePosition, ModuleState, NUM_MODULES,
    Rotation,
};
pub use module::{
    AutoLockPhase, MAX_AUTO_LOCK_TIME, ModuleError, ModuleHardware, ModuleSettings, SwerveModule,
};
pub use throttle::{Interpolation, ThrottleCurve, ThrottleError, ThrottleMap};
pub use traction::{TractionControlController, TractionError};
