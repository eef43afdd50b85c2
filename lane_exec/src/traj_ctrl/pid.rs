//! # PID controller

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use std::time::Instant;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single input single output PID controller with optional output limits.
///
/// There is no reset, create a new controller to clear the accumulated state.
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Dervative gain
    k_d: f64,

    /// The integral accumulation
    integral: f64,

    /// Previous error
    last_error: f64,

    /// Previous instant that the error was passed in
    #[serde(skip)]
    last_time: Option<Instant>,

    /// Lower output limit
    output_min: Option<f64>,

    /// Upper output limit
    output_max: Option<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with the given gains and no output limits.
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            integral: 0.0,
            last_error: 0.0,
            last_time: None,
            output_min: None,
            output_max: None,
        }
    }

    /// Limit the output of the controller. Either limit may be left unset.
    pub fn with_limits(mut self, output_min: Option<f64>, output_max: Option<f64>) -> Self {
        self.output_min = output_min;
        self.output_max = output_max;
        self
    }

    /// Get the value of the controller for the given error.
    ///
    /// This function is time-aware so there is no need to pass in a delta-time value.
    pub fn update(&mut self, error: f64) -> f64 {
        self.update_at(error, Instant::now())
    }

    /// Get the value of the controller for the given error measured at `now`.
    ///
    /// On the first call the elapsed time is zero, so neither the integral nor the derivative
    /// contribute. A non-finite error is treated as zero.
    pub fn update_at(&mut self, error: f64, now: Instant) -> f64 {
        let error = if error.is_finite() { error } else { 0.0 };

        let dt = match self.last_time {
            Some(t0) => now.saturating_duration_since(t0).as_secs_f64(),
            None => 0.0,
        };

        self.integral += error * dt;

        let deriv = if dt > 0.0 {
            (error - self.last_error) / dt
        } else {
            0.0
        };

        let mut out = self.k_p * error + self.k_i * self.integral + self.k_d * deriv;

        if let Some(max) = self.output_max {
            out = out.min(max);
        }
        if let Some(min) = self.output_min {
            out = out.max(min);
        }

        self.last_error = error;
        self.last_time = Some(now);

        out
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    pub fn limits(&self) -> (Option<f64>, Option<f64>) {
        (self.output_min, self.output_max)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_update_is_proportional() {
        let mut pid = PidController::new(1.2, 0.5, 0.2);
        let out = pid.update_at(0.5, Instant::now());
        assert!((out - 0.6).abs() < 1e-12);
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn test_integral_and_derivative() {
        let t0 = Instant::now();
        let mut pid = PidController::new(1.0, 2.0, 0.5);

        pid.update_at(1.0, t0);
        let out = pid.update_at(3.0, t0 + Duration::from_millis(500));

        // integral = 3 * 0.5, derivative = (3 - 1) / 0.5
        assert!((pid.integral() - 1.5).abs() < 1e-9);
        assert!((out - (3.0 + 2.0 * 1.5 + 0.5 * 4.0)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_dt_has_no_derivative() {
        let t0 = Instant::now();
        let mut pid = PidController::new(0.0, 0.0, 1.0);

        pid.update_at(1.0, t0);
        assert_eq!(pid.update_at(5.0, t0), 0.0);
    }

    #[test]
    fn test_output_within_limits() {
        let t0 = Instant::now();
        let mut pid = PidController::new(1.2, 0.0, 0.2).with_limits(Some(-30.0), Some(30.0));

        let errors = [100.0, -250.0, 0.3, 1e9, -1e9, 0.0, 42.0];
        for (i, e) in errors.iter().enumerate() {
            let out = pid.update_at(*e, t0 + Duration::from_millis(10 * i as u64));
            assert!(out >= -30.0 && out <= 30.0, "output {} out of bounds", out);
        }
    }

    #[test]
    fn test_one_sided_limit() {
        let mut pid = PidController::new(1.0, 0.0, 0.0).with_limits(None, Some(1.0));
        assert_eq!(pid.update_at(5.0, Instant::now()), 1.0);
        assert_eq!(pid.update_at(-5.0, Instant::now()), -5.0);
    }

    #[test]
    fn test_non_finite_error_ignored() {
        let t0 = Instant::now();
        let mut pid = PidController::new(1.0, 1.0, 1.0);

        pid.update_at(1.0, t0);
        let out = pid.update_at(f64::NAN, t0 + Duration::from_secs(1));

        assert!(out.is_finite());
        assert!(pid.integral().is_finite());
        assert_eq!(pid.last_error(), 0.0);
    }
}
