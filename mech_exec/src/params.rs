//! # Mechanisms Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the mechanisms, loaded from `mech_exec.toml`.
#[derive(Deserialize, Debug, Clone)]
pub struct MechParams {
    /// Which hardware driver to use.
    pub driver: DriverKind,

    /// Steering servo parameters.
    pub steer: SteerParams,

    /// Drive motor parameters.
    pub drive: DriveParams,
}

/// Steering servo parameters.
#[derive(Deserialize, Debug, Clone)]
pub struct SteerParams {
    /// GPIO (BCM numbering) connected to the servo signal line.
    pub servo_pin: u8,

    /// Largest wheel angle the steering linkage can reach either side of straight.
    ///
    /// Units: degrees
    pub max_wheel_angle_deg: f64,

    /// Pulse width at full left lock.
    ///
    /// Units: microseconds
    pub min_us: u32,

    /// Pulse width which points the wheels straight ahead.
    ///
    /// Units: microseconds
    pub neutral_us: u32,

    /// Pulse width at full right lock.
    ///
    /// Units: microseconds
    pub max_us: u32,

    /// Servo signal period, 20 ms for the usual 50 Hz hobby servo.
    ///
    /// Units: microseconds
    pub period_us: u32,

    /// If true the servo pulse is switched off after centring on shutdown, leaving the wheels
    /// free to move by hand and saving power.
    pub release_on_shutdown: bool,
}

/// Drive motor (H-bridge) parameters.
#[derive(Deserialize, Debug, Clone)]
pub struct DriveParams {
    /// Hardware PWM channel driving the forward input of the bridge.
    pub fwd_channel: PwmChannelId,

    /// Hardware PWM channel driving the reverse input of the bridge.
    pub rev_channel: PwmChannelId,

    /// Bridge enable pins (BCM numbering), driven high while the mechanisms are active.
    pub enable_pins: Vec<u8>,

    /// PWM frequency.
    ///
    /// Units: hertz
    pub pwm_freq_hz: f64,

    /// Integer duty value corresponding to a 100 % duty cycle.
    pub duty_scale: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Available hardware drivers.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// In-memory driver which only records the demanded outputs.
    Sim,

    /// Raspberry Pi GPIO and hardware PWM.
    Rpi,
}

/// The two hardware PWM channels of the Raspberry Pi.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmChannelId {
    /// PWM0, GPIO 12 or 18
    Pwm0,

    /// PWM1, GPIO 13 or 19
    Pwm1,
}

/// Errors found when validating [`MechParams`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParamsError {
    #[error("Pulse widths must satisfy min_us < neutral_us < max_us <= period_us")]
    InvalidPulseRange,

    #[error("The maximum wheel angle must be a positive number of degrees, found {0}")]
    InvalidMaxAngle(f64),

    #[error("The PWM frequency must be positive, found {0} Hz")]
    InvalidPwmFrequency(f64),

    #[error("The duty scale must be nonzero")]
    ZeroDutyScale,

    #[error("The forward and reverse motor channels must differ")]
    SharedMotorChannel,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MechParams {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        let s = &self.steer;
        if !(s.min_us < s.neutral_us && s.neutral_us < s.max_us && s.max_us <= s.period_us) {
            return Err(ParamsError::InvalidPulseRange)
        }

        if !(s.max_wheel_angle_deg.is_finite() && s.max_wheel_angle_deg > 0.0) {
            return Err(ParamsError::InvalidMaxAngle(s.max_wheel_angle_deg))
        }

        let d = &self.drive;
        if !(d.pwm_freq_hz.is_finite() && d.pwm_freq_hz > 0.0) {
            return Err(ParamsError::InvalidPwmFrequency(d.pwm_freq_hz))
        }

        if d.duty_scale == 0 {
            return Err(ParamsError::ZeroDutyScale)
        }

        if d.fwd_channel == d.rev_channel {
            return Err(ParamsError::SharedMotorChannel)
        }

        Ok(())
    }
}

impl Default for MechParams {
    fn default() -> Self {
        Self {
            driver: DriverKind::Sim,
            steer: SteerParams {
                servo_pin: 18,
                max_wheel_angle_deg: 30.0,
                min_us: 1000,
                neutral_us: 1500,
                max_us: 2000,
                period_us: 20_000,
                release_on_shutdown: true,
            },
            drive: DriveParams {
                fwd_channel: PwmChannelId::Pwm0,
                rev_channel: PwmChannelId::Pwm1,
                enable_pins: vec![6, 5],
                pwm_freq_hz: 500.0,
                duty_scale: 1_000_000,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        assert_eq!(MechParams::default().are_valid(), Ok(()));
    }

    #[test]
    fn test_invalid_params() {
        let mut p = MechParams::default();
        p.steer.neutral_us = 2100;
        assert_eq!(p.are_valid(), Err(ParamsError::InvalidPulseRange));

        let mut p = MechParams::default();
        p.steer.max_wheel_angle_deg = 0.0;
        assert_eq!(p.are_valid(), Err(ParamsError::InvalidMaxAngle(0.0)));

        let mut p = MechParams::default();
        p.drive.rev_channel = PwmChannelId::Pwm0;
        assert_eq!(p.are_valid(), Err(ParamsError::SharedMotorChannel));

        let mut p = MechParams::default();
        p.drive.duty_scale = 0;
        assert_eq!(p.are_valid(), Err(ParamsError::ZeroDutyScale));
    }

    #[test]
    fn test_params_from_toml() {
        let p: MechParams = util::params::from_str(
            r#"
            driver = "sim"

            [steer]
            servo_pin = 18
            max_wheel_angle_deg = 25.0
            min_us = 1100
            neutral_us = 1500
            max_us = 1900
            period_us = 20000
            release_on_shutdown = false

            [drive]
            fwd_channel = "Pwm0"
            rev_channel = "Pwm1"
            enable_pins = [6, 5]
            pwm_freq_hz = 8000.0
            duty_scale = 1000000
            "#,
        )
        .unwrap();

        assert_eq!(p.driver, DriverKind::Sim);
        assert_eq!(p.steer.max_wheel_angle_deg, 25.0);
        assert_eq!(p.drive.enable_pins, vec![6, 5]);
        assert!(p.are_valid().is_ok());
    }
}
