//! [`MechDriver`] implementation which records signals instead of driving hardware

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use log::trace;

use super::{DriverError, MechDriver};
use crate::{drive::MotorSignal, steer::ServoPulse};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulated driver.
///
/// The recorded state is shared, so a handle obtained from [`SimDriver::state`] can still be
/// inspected after the driver has been moved into the actuators.
#[derive(Debug, Default)]
pub struct SimDriver {
    state: Arc<Mutex<SimState>>,
}

/// The outputs the simulated hardware is currently producing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimState {
    /// Last servo signal written, `None` if nothing has been written yet
    pub servo: Option<ServoPulse>,

    /// Current (forward, reverse) channel duties
    pub motor_duties: (u32, u32),

    /// Current PWM frequency of the motor channels
    pub motor_freq_hz: f64,

    /// Number of servo writes
    pub servo_writes: usize,

    /// Number of motor writes
    pub motor_writes: usize,

    /// Whether the driver has been released
    pub released: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a shared handle to the simulated hardware state.
    pub fn state(&self) -> Arc<Mutex<SimState>> {
        self.state.clone()
    }

    fn with_state<F>(&mut self, f: F) -> Result<(), DriverError>
    where
        F: FnOnce(&mut SimState),
    {
        let mut state = self.state.lock().map_err(|_| DriverError::Released)?;
        if state.released {
            return Err(DriverError::Released);
        }
        f(&mut state);
        Ok(())
    }
}

impl MechDriver for SimDriver {
    fn write_servo(&mut self, pulse: ServoPulse) -> Result<(), DriverError> {
        trace!("sim servo <- {:?}", pulse);
        self.with_state(|s| {
            s.servo = Some(pulse);
            s.servo_writes += 1;
        })
    }

    fn write_motor(&mut self, signal: &MotorSignal) -> Result<(), DriverError> {
        trace!("sim motor <- {:?}", signal);
        let duties = signal.channel_duties();
        let freq = signal.frequency_hz;
        self.with_state(|s| {
            s.motor_duties = duties;
            s.motor_freq_hz = freq;
            s.motor_writes += 1;
        })
    }

    fn release(&mut self) -> Result<(), DriverError> {
        self.with_state(|s| s.released = true)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::MechParams;

    #[test]
    fn test_records_writes() {
        let mut driver = SimDriver::new();
        let state = driver.state();
        let params = MechParams::default();

        driver.write_servo(ServoPulse::Width(1200)).unwrap();
        driver
            .write_motor(&MotorSignal::from_speed(-0.5, &params.drive))
            .unwrap();

        let s = state.lock().unwrap();
        assert_eq!(s.servo, Some(ServoPulse::Width(1200)));
        assert_eq!(s.motor_duties, (0, 500_000));
        assert_eq!(s.motor_freq_hz, 500.0);
        assert_eq!((s.servo_writes, s.motor_writes), (1, 1));
    }

    #[test]
    fn test_writes_rejected_after_release() {
        let mut driver = SimDriver::new();
        driver.release().unwrap();

        assert!(matches!(
            driver.write_servo(ServoPulse::Off),
            Err(DriverError::Released)
        ));
        assert!(matches!(driver.release(), Err(DriverError::Released)));
    }
}
