//! # Servo Controller Module
//!
//! This module provides a unified driver interface for the vehicle's actuators, abstracting over
//! the hardware that produces the servo and motor signals.
//!
//! Drivers only write what they are given. All range checking happens in [`crate::steer`] and
//! [`crate::drive`] before a driver is called.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`MechDriver`] implementation which records the demanded signals in memory.
pub mod sim;

/// [`MechDriver`] implementation for the Raspberry Pi GPIO and PWM peripherals.
#[cfg(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64")))]
pub mod rpi;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::{drive::MotorSignal, steer::ServoPulse};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for the actuator hardware.
pub trait MechDriver {
    /// Write the steering servo signal.
    fn write_servo(&mut self, pulse: ServoPulse) -> Result<(), DriverError>;

    /// Write both drive motor channels.
    ///
    /// Implementations shall always write both channels, including when one of them is zero.
    fn write_motor(&mut self, signal: &MotorSignal) -> Result<(), DriverError>;

    /// Disable all outputs and release the underlying hardware.
    ///
    /// No other method will be called after this one.
    fn release(&mut self) -> Result<(), DriverError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("Could not initialise the {0} driver: {1}")]
    Init(&'static str, String),

    #[error("A GPIO error occured: {0}")]
    Gpio(String),

    #[error("A PWM error occured: {0}")]
    Pwm(String),

    #[error("The driver has already been released")]
    Released,
}
