//! # Telemetry records

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One row of lane following telemetry, produced once per control cycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct LaneTm {
    /// Session elapsed time at the end of the cycle
    pub time: f64,

    /// Normalised lateral offset of the lane centre
    pub offset: f64,

    /// Lane heading estimate in radians
    pub heading: f64,

    /// Steering angle demand in degrees
    pub steer_angle: f64,

    /// Normalised motor speed demand
    pub motor_speed: f64,

    /// Perception confidence
    pub confidence: f64,

    /// Whether the run interlock allowed actuation this cycle
    pub enabled: bool,
}
