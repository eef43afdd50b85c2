//! # Mechanisms Library
//!
//! Provides the actuation safety layer of the vehicle: conversion of steering and speed demands
//! into bounded servo and motor signals, the hardware drivers producing those signals, and the
//! [`Actuators`] handle which guarantees the hardware is left safe when it is shut down.
//!
//! Nothing in this crate touches hardware until [`init`] is called.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod actuators;
pub mod drive;
pub mod params;
pub mod servo_ctrl;
pub mod steer;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;

pub use actuators::Actuators;
use params::{DriverKind, MechParams, ParamsError};
use servo_ctrl::{sim::SimDriver, DriverError, MechDriver};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MechError {
    #[error("Invalid mechanisms parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("Failed to initialise the mechanisms driver: {0}")]
    DriverError(#[from] DriverError),

    #[error("The {0:?} driver is not available on this platform")]
    DriverUnavailable(DriverKind),
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Initialise the mechanisms.
///
/// Validates the parameters, opens the selected driver and centres the steering with the motor
/// stopped.
pub fn init(params: &MechParams) -> Result<Actuators, MechError> {
    params.are_valid()?;

    let driver: Box<dyn MechDriver + Send> = match params.driver {
        DriverKind::Sim => Box::new(SimDriver::new()),
        DriverKind::Rpi => open_rpi(params)?,
    };

    Ok(init_with_driver(params, driver))
}

/// Initialise the mechanisms with an already opened driver.
pub fn init_with_driver(params: &MechParams, driver: Box<dyn MechDriver + Send>) -> Actuators {
    let mut actuators = Actuators::new(params.clone(), driver);

    actuators.set_motor(0.0);
    actuators.set_steering(0.0);

    info!("Mechanisms initialised with the {:?} driver", params.driver);

    actuators
}

#[cfg(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64")))]
fn open_rpi(params: &MechParams) -> Result<Box<dyn MechDriver + Send>, MechError> {
    Ok(Box::new(servo_ctrl::rpi::RpiDriver::new(params)?))
}

#[cfg(not(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64"))))]
fn open_rpi(_params: &MechParams) -> Result<Box<dyn MechDriver + Send>, MechError> {
    Err(MechError::DriverUnavailable(DriverKind::Rpi))
}

#[cfg(test)]
mod test {
    use super::*;
    use steer::ServoPulse;

    #[test]
    fn test_init_sim_centres() {
        let act = init(&MechParams::default()).unwrap();
        assert_eq!(act.last_pulse(), Some(ServoPulse::Width(1500)));
        assert_eq!(act.last_motor().unwrap().channel_duties(), (0, 0));
    }

    #[test]
    fn test_init_rejects_invalid_params() {
        let mut params = MechParams::default();
        params.drive.duty_scale = 0;
        assert!(matches!(
            init(&params),
            Err(MechError::InvalidParams(ParamsError::ZeroDutyScale))
        ));
    }

    #[test]
    fn test_init_with_driver_records_centre() {
        let driver = SimDriver::new();
        let state = driver.state();
        let _act = init_with_driver(&MechParams::default(), Box::new(driver));

        let s = state.lock().unwrap();
        assert_eq!(s.servo, Some(ServoPulse::Width(1500)));
        assert_eq!(s.motor_duties, (0, 0));
    }
}
