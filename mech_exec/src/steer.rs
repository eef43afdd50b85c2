//! # Steering servo conversions
//!
//! Converts steering angle demands into servo pulse widths. The angle is always clamped to the
//! linkage's range before conversion and the resulting pulse is clamped again to the servo's
//! pulse range, so no demand can push the servo past its end stops.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use util::maths::{clamp_finite, lin_map};

use crate::params::SteerParams;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The signal sent to the steering servo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServoPulse {
    /// Pulse of the given width every period.
    ///
    /// Units: microseconds
    Width(u32),

    /// No pulse, the servo does not hold position.
    Off,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Clamp a steering angle to the range reachable by the linkage.
///
/// Non-finite angles are treated as straight ahead.
pub fn clamp_angle_deg(angle_deg: f64, params: &SteerParams) -> f64 {
    let max = params.max_wheel_angle_deg;
    clamp_finite(angle_deg, -max, max, 0.0)
}

/// Convert a steering angle into a servo pulse width.
///
/// `pulse = neutral + (clamp(angle) / max) * (max_us - neutral_us)`, rounded to the nearest
/// microsecond.
pub fn angle_to_pulse_us(angle_deg: f64, params: &SteerParams) -> u32 {
    let angle_deg = clamp_angle_deg(angle_deg, params);

    let pulse_us = lin_map(
        (0.0, params.max_wheel_angle_deg),
        (params.neutral_us as f64, params.max_us as f64),
        angle_deg,
    );

    clamp_pulse_us(pulse_us.round(), params)
}

/// Clamp a raw pulse width into the servo's safe range.
pub fn clamp_pulse_us(pulse_us: f64, params: &SteerParams) -> u32 {
    clamp_finite(
        pulse_us,
        params.min_us as f64,
        params.max_us as f64,
        params.neutral_us as f64,
    ) as u32
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::MechParams;

    fn params() -> SteerParams {
        MechParams::default().steer
    }

    #[test]
    fn test_reference_pulses() {
        let p = params();
        assert_eq!(angle_to_pulse_us(0.0, &p), 1500);
        assert_eq!(angle_to_pulse_us(30.0, &p), 2000);
        assert_eq!(angle_to_pulse_us(-30.0, &p), 1000);
        assert_eq!(angle_to_pulse_us(15.0, &p), 1750);
        assert_eq!(angle_to_pulse_us(-7.5, &p), 1375);
    }

    #[test]
    fn test_clamp_before_conversion() {
        let p = params();
        for &angle in &[30.001, 45.0, 90.0, 1e9, f64::INFINITY] {
            assert_eq!(angle_to_pulse_us(angle, &p), angle_to_pulse_us(30.0, &p));
            assert_eq!(angle_to_pulse_us(-angle, &p), angle_to_pulse_us(-30.0, &p));
        }
        assert_eq!(angle_to_pulse_us(f64::NAN, &p), 1500);
    }

    #[test]
    fn test_pulse_monotonic_and_bounded() {
        let p = params();
        let mut prev = 0;
        for i in -100..=100 {
            let pulse = angle_to_pulse_us(i as f64 * 0.5, &p);
            assert!(pulse >= prev);
            assert!(pulse >= p.min_us && pulse <= p.max_us);
            prev = pulse;
        }
    }

    #[test]
    fn test_asymmetric_range_is_clamped() {
        let mut p = params();
        p.min_us = 1100;
        assert_eq!(angle_to_pulse_us(-30.0, &p), 1100);
        assert_eq!(angle_to_pulse_us(30.0, &p), 2000);
    }
}
