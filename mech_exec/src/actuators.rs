//! # Actuators
//!
//! Owns the hardware driver and is the only way demands reach the steering servo and drive motor.
//! Every demand goes through the conversions in [`crate::steer`] and [`crate::drive`], so the
//! driver only ever sees values inside the hardware's safe range.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::mech::MechDems;
use log::{debug, info, warn};

use crate::{
    drive::MotorSignal,
    params::MechParams,
    servo_ctrl::{DriverError, MechDriver},
    steer::{self, ServoPulse},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to the vehicle's actuators.
///
/// Dropping the handle shuts the actuators down.
pub struct Actuators {
    params: MechParams,

    driver: Box<dyn MechDriver + Send>,

    /// Current drive PWM frequency, may be changed at runtime for motor testing
    pwm_freq_hz: f64,

    last_pulse: Option<ServoPulse>,
    last_motor: Option<MotorSignal>,

    shut_down: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Actuators {
    /// Wrap an already initialised driver.
    ///
    /// The parameters are expected to have been validated by the caller, see [`crate::init`].
    pub fn new(params: MechParams, driver: Box<dyn MechDriver + Send>) -> Self {
        let pwm_freq_hz = params.drive.pwm_freq_hz;

        Self {
            params,
            driver,
            pwm_freq_hz,
            last_pulse: None,
            last_motor: None,
            shut_down: false,
        }
    }

    pub fn params(&self) -> &MechParams {
        &self.params
    }

    /// Set the steering to the given wheel angle, in degrees. Positive angles steer right.
    ///
    /// The angle is clamped to the linkage range before conversion. Returns the pulse written.
    pub fn set_steering(&mut self, angle_deg: f64) -> ServoPulse {
        let pulse = ServoPulse::Width(steer::angle_to_pulse_us(angle_deg, &self.params.steer));
        self.write_servo(pulse);
        pulse
    }

    /// Write a raw pulse width to the servo, clamped to the configured pulse range.
    pub fn set_steering_pulse_us(&mut self, pulse_us: u32) -> ServoPulse {
        let pulse = ServoPulse::Width(steer::clamp_pulse_us(pulse_us as f64, &self.params.steer));
        self.write_servo(pulse);
        pulse
    }

    /// Switch the servo pulse off, the wheels are then free to move.
    pub fn disable_steering(&mut self) {
        self.write_servo(ServoPulse::Off);
    }

    /// Set the drive motor to the given normalised speed in [-1, 1]. Negative speeds reverse.
    ///
    /// Both bridge channels are written on every call. Returns the signal written.
    pub fn set_motor(&mut self, speed: f64) -> MotorSignal {
        let signal = MotorSignal::from_speed_at(speed, &self.params.drive, self.pwm_freq_hz);
        self.write_motor(signal);
        signal
    }

    /// Change the drive PWM frequency used by subsequent [`Actuators::set_motor`] calls.
    ///
    /// Non-positive or non-finite frequencies are ignored.
    pub fn set_pwm_frequency(&mut self, freq_hz: f64) {
        if freq_hz.is_finite() && freq_hz > 0.0 {
            self.pwm_freq_hz = freq_hz;
        } else {
            warn!("Ignoring invalid PWM frequency {} Hz", freq_hz);
        }
    }

    /// Apply a steering and speed demand pair.
    pub fn actuate(&mut self, dems: &MechDems) {
        self.set_steering(dems.steer_angle_deg);
        self.set_motor(dems.motor_speed);
    }

    /// Put the actuators into their safe state and release the hardware.
    ///
    /// The motor is stopped, the steering centred, the servo pulse optionally switched off, and
    /// finally the driver is released. Calling this more than once has no further effect.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        info!("Shutting down actuators");

        self.write_motor(MotorSignal::stop(&self.params.drive));
        self.set_steering(0.0);

        if self.params.steer.release_on_shutdown {
            self.disable_steering();
        }

        if let Err(e) = self.driver.release() {
            warn!("Error releasing the mechanisms driver: {}", e);
        }

        self.shut_down = true;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// The last servo signal written, if any.
    pub fn last_pulse(&self) -> Option<ServoPulse> {
        self.last_pulse
    }

    /// The last motor signal written, if any.
    pub fn last_motor(&self) -> Option<MotorSignal> {
        self.last_motor
    }

    fn write_servo(&mut self, pulse: ServoPulse) {
        if self.shut_down {
            debug!("Ignoring servo demand after shutdown");
            return;
        }

        self.last_pulse = Some(pulse);
        log_write_error("servo", self.driver.write_servo(pulse));
    }

    fn write_motor(&mut self, signal: MotorSignal) {
        if self.shut_down {
            debug!("Ignoring motor demand after shutdown");
            return;
        }

        self.last_motor = Some(signal);
        log_write_error("motor", self.driver.write_motor(&signal));
    }
}

impl Drop for Actuators {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn log_write_error(what: &str, result: Result<(), DriverError>) {
    if let Err(e) = result {
        warn!("Failed to write {} demand: {}", what, e);
    }
}
