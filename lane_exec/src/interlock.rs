//! # Run interlock
//!
//! The interlock is the single switch deciding whether trajectory control demands reach the
//! actuators. It is a debounced toggle: each honoured trigger flips the run state. Triggers come
//! from a push button wired to a GPIO pin, from lines typed on stdin, or from nowhere at all, in
//! which case the run state never changes from its initial value.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use serde::Deserialize;
use std::{
    io::BufRead,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Debounced run/pause toggle shared between the trigger source and the control loop.
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct RunInterlock {
    enabled: Arc<AtomicBool>,

    debounce: Duration,

    /// Instant of the last honoured trigger
    last_toggle: Arc<Mutex<Option<Instant>>>,
}

/// Keeps a trigger source alive. Dropping a GPIO handle stops its interrupt.
pub struct TriggerHandle {
    _thread: Option<JoinHandle<()>>,

    #[cfg(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64")))]
    _pin: Option<rppal::gpio::InputPin>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Where run/pause triggers come from.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSourceParams {
    /// A normally open push button between the given GPIO (BCM numbering) and ground
    Gpio { pin: u8 },

    /// Every line read from stdin is one trigger
    Stdin,

    /// No triggers, the run state stays at its initial value
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, thiserror::Error)]
pub enum InterlockError {
    #[error("GPIO triggers are not available on this platform")]
    GpioUnavailable,

    #[error("Could not set up the GPIO trigger: {0}")]
    GpioError(String),

    #[error("Could not start the trigger thread: {0}")]
    ThreadError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RunInterlock {
    /// Create a new interlock in the given initial state.
    pub fn new(start_enabled: bool, debounce: Duration) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(start_enabled)),
            debounce,
            last_toggle: Arc::new(Mutex::new(None)),
        }
    }

    /// Toggle the run state, unless the last honoured trigger was within the debounce interval.
    ///
    /// Returns true if the trigger was honoured.
    pub fn trigger(&self) -> bool {
        self.trigger_at(Instant::now())
    }

    /// As [`RunInterlock::trigger`] with the trigger occuring at `now`.
    pub fn trigger_at(&self, now: Instant) -> bool {
        let mut last = match self.last_toggle.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(t) = *last {
            if now.saturating_duration_since(t) < self.debounce {
                return false;
            }
        }

        let was_enabled = self.enabled.fetch_xor(true, Ordering::SeqCst);
        *last = Some(now);

        info!(
            "Run interlock {}",
            if was_enabled { "disabled" } else { "enabled" }
        );

        true
    }

    /// Whether actuation is currently allowed.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

impl Default for TriggerSourceParams {
    fn default() -> Self {
        TriggerSourceParams::Disabled
    }
}

impl TriggerHandle {
    fn none() -> Self {
        Self {
            _thread: None,
            #[cfg(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64")))]
            _pin: None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Start the configured trigger source, feeding the given interlock.
///
/// The returned handle must be kept alive for as long as triggers are wanted.
pub fn spawn_trigger_source(
    params: &TriggerSourceParams,
    interlock: &RunInterlock,
) -> Result<TriggerHandle, InterlockError> {
    match params {
        TriggerSourceParams::Disabled => {
            info!("No run trigger source, interlock stays {}", state_str(interlock));
            Ok(TriggerHandle::none())
        }
        TriggerSourceParams::Stdin => {
            let il = interlock.clone();
            let thread = thread::Builder::new()
                .name("stdin_trigger".into())
                .spawn(move || stdin_trigger(il))
                .map_err(InterlockError::ThreadError)?;

            info!("Press enter to toggle the run state");

            Ok(TriggerHandle {
                _thread: Some(thread),
                ..TriggerHandle::none()
            })
        }
        TriggerSourceParams::Gpio { pin } => gpio_trigger(*pin, interlock),
    }
}

fn state_str(interlock: &RunInterlock) -> &'static str {
    if interlock.is_enabled() {
        "enabled"
    } else {
        "disabled"
    }
}

fn stdin_trigger(interlock: RunInterlock) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(_) => {
                interlock.trigger();
            }
            Err(e) => {
                warn!("Stdin trigger stopped: {}", e);
                break;
            }
        }
    }
}

#[cfg(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64")))]
fn gpio_trigger(pin: u8, interlock: &RunInterlock) -> Result<TriggerHandle, InterlockError> {
    use rppal::gpio::{Gpio, Trigger};

    let gpio = Gpio::new().map_err(|e| InterlockError::GpioError(e.to_string()))?;
    let mut input = gpio
        .get(pin)
        .map_err(|e| InterlockError::GpioError(e.to_string()))?
        .into_input_pullup();

    let il = interlock.clone();
    input
        .set_async_interrupt(Trigger::FallingEdge, move |_| {
            il.trigger();
        })
        .map_err(|e| InterlockError::GpioError(e.to_string()))?;

    info!("Run trigger on GPIO {}", pin);

    Ok(TriggerHandle {
        _thread: None,
        _pin: Some(input),
    })
}

#[cfg(not(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64"))))]
fn gpio_trigger(_pin: u8, _interlock: &RunInterlock) -> Result<TriggerHandle, InterlockError> {
    Err(InterlockError::GpioUnavailable)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_first_trigger_honoured() {
        let il = RunInterlock::new(false, Duration::from_millis(300));
        assert!(!il.is_enabled());
        assert!(il.trigger_at(Instant::now()));
        assert!(il.is_enabled());
    }

    #[test]
    fn test_debounce() {
        let il = RunInterlock::new(false, Duration::from_millis(300));
        let t0 = Instant::now();

        assert!(il.trigger_at(t0));
        assert!(!il.trigger_at(t0 + Duration::from_millis(100)));
        assert!(il.is_enabled());

        assert!(il.trigger_at(t0 + Duration::from_millis(400)));
        assert!(!il.is_enabled());
    }

    #[test]
    fn test_clones_share_state() {
        let il = RunInterlock::new(true, Duration::from_millis(0));
        let handler = il.clone();

        let t = thread::spawn(move || handler.trigger());
        assert!(t.join().unwrap());
        assert!(!il.is_enabled());
    }

    #[test]
    fn test_trigger_source_params() {
        let p: TriggerSourceParams = util::params::from_str("kind = \"gpio\"\npin = 17").unwrap();
        assert_eq!(p, TriggerSourceParams::Gpio { pin: 17 });

        let p: TriggerSourceParams = util::params::from_str("kind = \"none\"").unwrap();
        assert_eq!(p, TriggerSourceParams::Disabled);
    }

    #[test]
    fn test_disabled_source() {
        let il = RunInterlock::new(true, Duration::from_millis(300));
        let _handle = spawn_trigger_source(&TriggerSourceParams::Disabled, &il).unwrap();
        assert!(il.is_enabled());
    }
}
