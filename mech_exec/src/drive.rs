//! # Drive motor conversions
//!
//! Converts a signed, normalised speed demand into the pair of PWM signals driving the H-bridge.
//! The forward and reverse channels are mutually exclusive: at most one carries a nonzero duty,
//! and a zero demand writes zero to both so no previous duty is left latched.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use util::maths::clamp_finite;

use crate::params::DriveParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// PWM signal for the drive motor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotorSignal {
    /// Which channel of the bridge is driven
    pub direction: Direction,

    /// Duty of the driven channel, between 0 and `duty_scale`
    pub duty: u32,

    /// Duty value corresponding to 100 %
    pub duty_scale: u32,

    /// PWM frequency.
    ///
    /// Units: hertz
    pub frequency_hz: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Direction of the drive motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Forward,
    Reverse,
    Stop,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotorSignal {
    /// Build the signal for a normalised speed in [-1, 1].
    ///
    /// Speeds outside the range are clamped and non-finite speeds stop the motor.
    pub fn from_speed(speed: f64, params: &DriveParams) -> Self {
        Self::from_speed_at(speed, params, params.pwm_freq_hz)
    }

    /// As [`MotorSignal::from_speed`] but with an explicit PWM frequency.
    pub fn from_speed_at(speed: f64, params: &DriveParams, frequency_hz: f64) -> Self {
        let speed = clamp_finite(speed, -1.0, 1.0, 0.0);
        let scale = params.duty_scale as f64;

        let duty = clamp_finite((speed.abs() * scale).round(), 0.0, scale, 0.0) as u32;

        let direction = if duty == 0 {
            Direction::Stop
        } else if speed > 0.0 {
            Direction::Forward
        } else {
            Direction::Reverse
        };

        Self {
            direction,
            duty: if direction == Direction::Stop { 0 } else { duty },
            duty_scale: params.duty_scale,
            frequency_hz,
        }
    }

    /// A signal with both channels at zero duty.
    pub fn stop(params: &DriveParams) -> Self {
        Self {
            direction: Direction::Stop,
            duty: 0,
            duty_scale: params.duty_scale,
            frequency_hz: params.pwm_freq_hz,
        }
    }

    /// The (forward, reverse) channel duties.
    pub fn channel_duties(&self) -> (u32, u32) {
        match self.direction {
            Direction::Forward => (self.duty, 0),
            Direction::Reverse => (0, self.duty),
            Direction::Stop => (0, 0),
        }
    }

    /// The (forward, reverse) channel duty cycles as fractions in [0, 1].
    pub fn channel_fractions(&self) -> (f64, f64) {
        let (fwd, rev) = self.channel_duties();
        let scale = self.duty_scale as f64;
        (fwd as f64 / scale, rev as f64 / scale)
    }
}
