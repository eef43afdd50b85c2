//! # Mechanisms Equipment Demands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Demands produced by trajectory control each cycle and actuated by the mechanisms.
///
/// These are requests, not physical outputs: the actuation layer clamps both values to the
/// hardware's safe ranges before anything is written.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MechDems {
    /// The demanded steering angle of the front wheels.
    ///
    /// Units: degrees, positive steers right
    pub steer_angle_deg: f64,

    /// The demanded drive motor speed.
    ///
    /// Units: normalised, -1 (full reverse) to +1 (full forward)
    pub motor_speed: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MechDems {
    /// Demands which stop the vehicle with the wheels pointing straight ahead.
    pub fn stop() -> Self {
        Self {
            steer_angle_deg: 0.0,
            motor_speed: 0.0,
        }
    }

    /// Returns true if these demands stop the vehicle.
    pub fn is_stop(&self) -> bool {
        self.motor_speed == 0.0
    }
}

impl Default for MechDems {
    fn default() -> Self {
        Self::stop()
    }
}
