// Module geometry and state types
//
// Angles are stored as radians normalized to (-pi, pi], so every comparison
// between two headings works on the short way round.

use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Number of modules on the platform
pub const NUM_MODULES: usize = 4;

/// A planar heading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Rotation(f64);

impl Rotation {
    pub const ZERO: Rotation = Rotation(0.0);

    pub fn from_radians(radians: f64) -> Self {
        Self(normalize(radians))
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self::from_radians(degrees.to_radians())
    }

    /// Units: radians, in (-pi, pi]
    pub fn radians(&self) -> f64 {
        self.0
    }

    /// Units: degrees, in (-180, 180]
    pub fn degrees(&self) -> f64 {
        self.0.to_degrees()
    }
}

impl From<f64> for Rotation {
    fn from(radians: f64) -> Self {
        Self::from_radians(radians)
    }
}

impl From<Rotation> for f64 {
    fn from(rotation: Rotation) -> Self {
        rotation.0
    }
}

impl Add for Rotation {
    type Output = Rotation;

    fn add(self, rhs: Rotation) -> Rotation {
        Rotation::from_radians(self.0 + rhs.0)
    }
}

impl Sub for Rotation {
    type Output = Rotation;

    fn sub(self, rhs: Rotation) -> Rotation {
        Rotation::from_radians(self.0 - rhs.0)
    }
}

impl Neg for Rotation {
    type Output = Rotation;

    fn neg(self) -> Rotation {
        Rotation::from_radians(-self.0)
    }
}

/// Wrap an angle into (-pi, pi]
fn normalize(radians: f64) -> f64 {
    if !radians.is_finite() {
        return radians;
    }
    let wrapped = radians.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// Desired or measured speed and heading of one module
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleState {
    /// Units: meters/second
    pub speed: f64,
    pub angle: Rotation,
}

impl ModuleState {
    pub fn new(speed: f64, angle: Rotation) -> Self {
        Self { speed, angle }
    }

    /// Pick the equivalent state needing at most a quarter turn from `current`
    ///
    /// Driving backwards at the opposite heading is the same motion, so a
    /// heading more than 90 degrees away is flipped and the speed negated.
    pub fn optimize(self, current: Rotation) -> Self {
        let delta = self.angle - current;
        if delta.radians().abs() > FRAC_PI_2 {
            Self {
                speed: -self.speed,
                angle: self.angle + Rotation(PI),
            }
        } else {
            self
        }
    }
}

/// Distance travelled and heading of one module, for odometry
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModulePosition {
    /// Units: meters
    pub distance: f64,
    pub angle: Rotation,
}

/// 2D point relative to the platform centre
///
/// Units: meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleCoordinate {
    pub x: f64,
    pub y: f64,
}

impl ModuleCoordinate {
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Corner a module is mounted at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleLocation {
    LeftFront,
    RightFront,
    LeftRear,
    RightRear,
}

/// (index, mounting offset in radians, x sign, y sign) for each corner
///
/// Offsets are a quarter turn apart so the single motor-frame lock heading
/// points every wheel at the chassis centre.
const LOCATION_TABLE: [(usize, f64, f64, f64); NUM_MODULES] = [
    (0, 0.0, 1.0, 1.0),
    (1, FRAC_PI_2, 1.0, -1.0),
    (2, -FRAC_PI_2, -1.0, 1.0),
    (3, PI, -1.0, -1.0),
];

impl ModuleLocation {
    pub const ALL: [ModuleLocation; NUM_MODULES] = [
        ModuleLocation::LeftFront,
        ModuleLocation::RightFront,
        ModuleLocation::LeftRear,
        ModuleLocation::RightRear,
    ];

    fn entry(&self) -> (usize, f64, f64, f64) {
        match self {
            ModuleLocation::LeftFront => LOCATION_TABLE[0],
            ModuleLocation::RightFront => LOCATION_TABLE[1],
            ModuleLocation::LeftRear => LOCATION_TABLE[2],
            ModuleLocation::RightRear => LOCATION_TABLE[3],
        }
    }

    /// Position of this module in per-platform state arrays
    pub fn index(&self) -> usize {
        self.entry().0
    }

    /// Rotation of the module's steering frame relative to the chassis
    pub fn offset(&self) -> Rotation {
        Rotation::from_radians(self.entry().1)
    }

    /// Where the module sits for the given wheelbase and track width (m)
    pub fn coordinate(&self, wheelbase: f64, track_width: f64) -> ModuleCoordinate {
        let (_, _, x_sign, y_sign) = self.entry();
        ModuleCoordinate {
            x: x_sign * wheelbase / 2.0,
            y: y_sign * track_width / 2.0,
        }
    }
}

/// Reduction ratios available for the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GearRatio {
    /// 8.14:1
    L1,
    /// 6.75:1
    L2,
    /// 6.12:1
    L3,
    /// 5.14:1
    L4,
    /// Steering, 12.8:1
    Steer,
}

impl GearRatio {
    pub fn value(&self) -> f64 {
        match self {
            GearRatio::L1 => 8.14,
            GearRatio::L2 => 6.75,
            GearRatio::L3 => 6.12,
            GearRatio::L4 => 5.14,
            GearRatio::Steer => 12.8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_rotation_normalizes_into_half_open_range() {
        assert!((Rotation::from_degrees(270.0).degrees() - -90.0).abs() < EPS);
        assert_eq!(Rotation::from_radians(-PI).radians(), PI);
        assert_eq!(Rotation::from_radians(PI).radians(), PI);
        assert!((Rotation::from_degrees(-540.0).degrees().abs() - 180.0).abs() < EPS);
        assert!((Rotation::from_degrees(725.0).degrees() - 5.0).abs() < EPS);
    }

    #[test]
    fn test_rotation_arithmetic_wraps() {
        let a = Rotation::from_degrees(170.0);
        let b = Rotation::from_degrees(20.0);
        assert!(((a + b).degrees() - -170.0).abs() < EPS);
        assert!(((b - a).degrees() - -150.0).abs() < EPS);
        assert!(((-a).degrees() - -170.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_keeps_small_turns() {
        let state = ModuleState::new(1.5, Rotation::from_degrees(60.0));
        let optimized = state.optimize(Rotation::from_degrees(0.0));
        assert_eq!(optimized, state);
    }

    #[test]
    fn test_optimize_flips_large_turns() {
        let state = ModuleState::new(1.5, Rotation::from_degrees(170.0));
        let optimized = state.optimize(Rotation::from_degrees(0.0));
        assert_eq!(optimized.speed, -1.5);
        assert!((optimized.angle.degrees() - -10.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_across_the_seam() {
        // 179 deg and -179 deg are only 2 deg apart
        let state = ModuleState::new(1.0, Rotation::from_degrees(-179.0));
        let optimized = state.optimize(Rotation::from_degrees(179.0));
        assert_eq!(optimized.speed, 1.0);
        assert!((optimized.angle.degrees() - -179.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_exactly_ninety_does_not_flip() {
        let state = ModuleState::new(1.0, Rotation::from_radians(FRAC_PI_2));
        let optimized = state.optimize(Rotation::ZERO);
        assert_eq!(optimized.speed, 1.0);
    }

    #[test]
    fn test_location_table() {
        let indices: Vec<usize> = ModuleLocation::ALL.iter().map(|l| l.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(ModuleLocation::LeftFront.offset(), Rotation::ZERO);
        assert!((ModuleLocation::RightFront.offset().degrees() - 90.0).abs() < EPS);
        assert!((ModuleLocation::LeftRear.offset().degrees() - -90.0).abs() < EPS);
        assert!((ModuleLocation::RightRear.offset().degrees() - 180.0).abs() < EPS);
    }

    #[test]
    fn test_coordinates_and_radius() {
        let rf = ModuleLocation::RightFront.coordinate(0.6, 0.8);
        assert_eq!(rf, ModuleCoordinate { x: 0.3, y: -0.4 });
        assert!((rf.norm() - 0.5).abs() < EPS);

        let lr = ModuleLocation::LeftRear.coordinate(0.6, 0.8);
        assert_eq!(lr, ModuleCoordinate { x: -0.3, y: 0.4 });
    }

    #[test]
    fn test_rotation_serializes_as_radians() {
        let json = serde_json::to_string(&Rotation::from_radians(0.5)).unwrap();
        assert_eq!(json, "0.5");
        let parsed: Rotation = serde_json::from_str("7.0").unwrap();
        assert!((parsed.radians() - (7.0 - TAU)).abs() < EPS);
    }
}
