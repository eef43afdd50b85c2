//! # Lifecycle manager
//!
//! Owns the actuators for the whole run and guarantees that they end up stopped, centred and
//! released however the run ends: the loop finishing, a Ctrl-C from the user, an error leaving
//! the loop or a panic unwinding through it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::mech::MechDems;
use log::{info, warn};
use mech_lib::Actuators;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Owner of the actuators for the duration of a run.
///
/// Dropping the lifecycle shuts the actuators down.
pub struct Lifecycle {
    actuators: Actuators,

    /// Raised by the interrupt handler, the control loop exits at the end of its current cycle
    interrupted: Arc<AtomicBool>,

    shut_down: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Could not install the interrupt handler: {0}")]
    InterruptHandler(#[from] ctrlc::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Lifecycle {
    /// Take ownership of the actuators.
    pub fn new(actuators: Actuators) -> Self {
        Self {
            actuators,
            interrupted: Arc::new(AtomicBool::new(false)),
            shut_down: false,
        }
    }

    /// Raise the interrupt flag on Ctrl-C.
    ///
    /// Only one handler may be installed per process.
    pub fn install_interrupt_handler(&self) -> Result<(), LifecycleError> {
        let interrupted = self.interrupted.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        })?;

        Ok(())
    }

    /// Shared handle to the interrupt flag.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Send demands to the actuators. Ignored once shut down.
    pub fn actuate(&mut self, dems: &MechDems) {
        if self.shut_down {
            warn!("Demands received after shutdown, ignoring");
            return;
        }

        self.actuators.actuate(dems);
    }

    pub fn actuators(&self) -> &Actuators {
        &self.actuators
    }

    /// Run `body`, shutting down afterwards whether it succeeds or fails.
    pub fn run<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        let result = body(self);
        self.shutdown();
        result
    }

    /// Stop the motor, centre the steering and release the hardware.
    ///
    /// Only the first call has any effect.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        if self.is_interrupted() {
            info!("Shutting down after interrupt");
        }

        self.actuators.shutdown();
        self.shut_down = true;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use mech_lib::{
        params::MechParams,
        servo_ctrl::sim::{SimDriver, SimState},
        steer::ServoPulse,
    };
    use std::sync::Mutex;

    fn sim_lifecycle() -> (Lifecycle, Arc<Mutex<SimState>>) {
        let driver = SimDriver::new();
        let state = driver.state();
        let act = mech_lib::init_with_driver(&MechParams::default(), Box::new(driver));
        (Lifecycle::new(act), state)
    }

    fn capture() -> Result<(), String> {
        Err("capture failed".to_string())
    }

    fn assert_safe(state: &Arc<Mutex<SimState>>) {
        let s = state.lock().unwrap();
        assert_eq!(s.motor_duties, (0, 0));
        assert_eq!(s.servo, Some(ServoPulse::Off));
        assert!(s.released);
    }

    #[test]
    fn test_shutdown_twice() {
        let (mut lc, state) = sim_lifecycle();
        lc.actuate(&MechDems {
            steer_angle_deg: 10.0,
            motor_speed: 0.5,
        });

        lc.shutdown();
        let once = state.lock().unwrap().clone();
        lc.shutdown();
        let twice = state.lock().unwrap().clone();

        assert_eq!(once, twice);
        assert_safe(&state);
    }

    #[test]
    fn test_error_path_shuts_down() {
        let (mut lc, state) = sim_lifecycle();

        let result: Result<(), String> = lc.run(|lc| {
            lc.actuate(&MechDems {
                steer_angle_deg: -5.0,
                motor_speed: 0.3,
            });
            capture()?;
            Ok(())
        });

        assert!(result.is_err());
        assert!(lc.is_shut_down());
        assert_safe(&state);
    }

    #[test]
    fn test_panic_shuts_down() {
        let (lc, state) = sim_lifecycle();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut lc = lc;
            lc.actuate(&MechDems {
                steer_angle_deg: 20.0,
                motor_speed: 1.0,
            });
            panic!("fault in the control loop");
        }));

        assert!(result.is_err());
        assert_safe(&state);
    }

    #[test]
    fn test_demands_ignored_after_shutdown() {
        let (mut lc, state) = sim_lifecycle();
        lc.shutdown();

        let writes = state.lock().unwrap().motor_writes;
        lc.actuate(&MechDems {
            steer_angle_deg: 0.0,
            motor_speed: 1.0,
        });
        assert_eq!(state.lock().unwrap().motor_writes, writes);
    }
}
