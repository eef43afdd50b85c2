//! [`MechDriver`] implementation for the Raspberry Pi
//!
//! The steering servo is driven with software PWM on a GPIO pin, the drive motor with the two
//! hardware PWM channels, and the H-bridge enable lines with plain GPIO outputs.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use log::{debug, info};
use rppal::{
    gpio::{Gpio, OutputPin},
    pwm::{Channel, Polarity, Pwm},
};

use super::{DriverError, MechDriver};
use crate::{
    drive::MotorSignal,
    params::{MechParams, PwmChannelId},
    steer::ServoPulse,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct RpiDriver {
    servo: OutputPin,
    servo_period: Duration,

    fwd: Pwm,
    rev: Pwm,

    enable: Vec<OutputPin>,

    released: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RpiDriver {
    /// Acquire the GPIO and PWM peripherals and drive the bridge enable pins high.
    ///
    /// Both motor channels start disabled with zero duty.
    pub fn new(params: &MechParams) -> Result<Self, DriverError> {
        let gpio = Gpio::new().map_err(|e| DriverError::Init("rpi", e.to_string()))?;

        let servo = gpio
            .get(params.steer.servo_pin)
            .map_err(|e| DriverError::Init("rpi", e.to_string()))?
            .into_output();

        let mut enable = Vec::with_capacity(params.drive.enable_pins.len());
        for &pin in params.drive.enable_pins.iter() {
            let mut out = gpio
                .get(pin)
                .map_err(|e| DriverError::Init("rpi", e.to_string()))?
                .into_output();
            out.set_high();
            enable.push(out);
        }

        let fwd = open_pwm(params.drive.fwd_channel, params.drive.pwm_freq_hz)?;
        let rev = open_pwm(params.drive.rev_channel, params.drive.pwm_freq_hz)?;

        info!(
            "Raspberry Pi driver initialised (servo on GPIO {}, enable pins {:?})",
            params.steer.servo_pin, params.drive.enable_pins
        );

        Ok(Self {
            servo,
            servo_period: Duration::from_micros(params.steer.period_us as u64),
            fwd,
            rev,
            enable,
            released: false,
        })
    }
}

impl MechDriver for RpiDriver {
    fn write_servo(&mut self, pulse: ServoPulse) -> Result<(), DriverError> {
        if self.released {
            return Err(DriverError::Released);
        }

        match pulse {
            ServoPulse::Width(us) => self
                .servo
                .set_pwm(self.servo_period, Duration::from_micros(us as u64))
                .map_err(|e| DriverError::Gpio(e.to_string())),
            ServoPulse::Off => {
                self.servo
                    .clear_pwm()
                    .map_err(|e| DriverError::Gpio(e.to_string()))?;
                self.servo.set_low();
                Ok(())
            }
        }
    }

    fn write_motor(&mut self, signal: &MotorSignal) -> Result<(), DriverError> {
        if self.released {
            return Err(DriverError::Released);
        }

        let (fwd, rev) = signal.channel_fractions();

        // Zero the idle channel first so both inputs are never driven together
        if fwd > 0.0 {
            write_channel(&self.rev, signal.frequency_hz, rev)?;
            write_channel(&self.fwd, signal.frequency_hz, fwd)
        } else {
            write_channel(&self.fwd, signal.frequency_hz, fwd)?;
            write_channel(&self.rev, signal.frequency_hz, rev)
        }
    }

    fn release(&mut self) -> Result<(), DriverError> {
        if self.released {
            return Ok(());
        }

        let mut result = Ok(());

        for pwm in [&self.fwd, &self.rev].iter() {
            if let Err(e) = pwm.disable() {
                result = Err(DriverError::Pwm(e.to_string()));
            }
        }

        if let Err(e) = self.servo.clear_pwm() {
            result = Err(DriverError::Gpio(e.to_string()));
        }
        self.servo.set_low();

        for pin in self.enable.iter_mut() {
            pin.set_low();
        }

        self.released = true;
        debug!("Raspberry Pi driver released");

        result
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn open_pwm(id: PwmChannelId, freq_hz: f64) -> Result<Pwm, DriverError> {
    let channel = match id {
        PwmChannelId::Pwm0 => Channel::Pwm0,
        PwmChannelId::Pwm1 => Channel::Pwm1,
    };

    Pwm::with_frequency(channel, freq_hz, 0.0, Polarity::Normal, true)
        .map_err(|e| DriverError::Init("rpi", e.to_string()))
}

fn write_channel(pwm: &Pwm, freq_hz: f64, duty: f64) -> Result<(), DriverError> {
    pwm.set_frequency(freq_hz, duty)
        .map_err(|e| DriverError::Pwm(e.to_string()))
}
