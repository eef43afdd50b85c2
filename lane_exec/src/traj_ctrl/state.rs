//! Implementations for the TrajCtrl state structure

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, trace};
use serde::Serialize;
use std::time::Instant;

// Internal
use super::{Params, PidController, TrajCtrlError};
use crate::lane_det::LaneGeometry;
use comms_if::eqpt::mech::MechDems;
use util::{
    archive::{ArchiveError, Archived, Archiver},
    maths::clamp_finite,
    module::State,
    params,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Trajectory control module state
#[derive(Default)]
pub struct TrajCtrl {
    pub(crate) params: Params,

    controller: Option<PidController>,

    pub(crate) report: StatusReport,
    arch_report: Archiver,
}

/// Input to trajectory control processing.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputData {
    /// The current estimate of the lane geometry
    pub geometry: LaneGeometry,

    /// Whether the run interlock currently allows the vehicle to move
    pub enabled: bool,
}

/// Status report for TrajCtrl processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// Weighted sum of offset and heading fed to the controller
    pub composite_error: f64,

    /// Output of the controller before inversion and clamping
    pub pid_output: f64,

    /// True if the steering demand is at the maximum wheel angle
    pub steer_saturated: bool,

    /// True if the run interlock allowed the vehicle to move
    pub enabled: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrajCtrl {
    /// Create trajectory control directly from parameters, without archiving.
    pub fn from_params(params: Params) -> Result<Self, TrajCtrlError> {
        params.are_valid()?;

        Ok(Self {
            controller: Some(build_controller(&params)),
            params,
            ..Default::default()
        })
    }

    /// Limit steering demands to `max_wheel_angle_deg` either side of straight.
    ///
    /// The limit belongs to the steering mechanism, so it is set from the mechanisms parameters
    /// after initialisation rather than configured alongside the controller.
    pub fn limit_steering(&mut self, max_wheel_angle_deg: f64) -> Result<(), TrajCtrlError> {
        if !(max_wheel_angle_deg.is_finite() && max_wheel_angle_deg > 0.0) {
            return Err(TrajCtrlError::InvalidParams(format!(
                "max_wheel_angle_deg must be positive, found {}",
                max_wheel_angle_deg
            )));
        }

        self.params.max_wheel_angle_deg = max_wheel_angle_deg;
        Ok(())
    }

    /// Process the input as if it was measured at `now`.
    pub fn proc_at(
        &mut self,
        input_data: &InputData,
        now: Instant,
    ) -> Result<(MechDems, StatusReport), TrajCtrlError> {
        let controller = self
            .controller
            .as_mut()
            .ok_or(TrajCtrlError::NotInitialised)?;
        let p = &self.params;

        // The controller keeps running while disabled so that its timing stays current, but only
        // ever sees zero error.
        let composite_error = if input_data.enabled {
            composite_error(&input_data.geometry, p)
        } else {
            0.0
        };

        let pid_output = controller.update_at(composite_error, now);

        self.report = StatusReport {
            composite_error,
            pid_output,
            steer_saturated: false,
            enabled: input_data.enabled,
        };

        if !input_data.enabled {
            trace!("TrajCtrl disabled, demanding stop");
            return Ok((MechDems::stop(), self.report));
        }

        let steer_raw = if p.invert_steer {
            -pid_output
        } else {
            pid_output
        };
        let max_angle = p.max_wheel_angle_deg;
        let steer_angle_deg = clamp_finite(steer_raw, -max_angle, max_angle, 0.0);

        self.report.steer_saturated = steer_angle_deg.abs() >= max_angle;

        let motor_speed = speed_demand(steer_angle_deg, input_data.geometry.confidence, p);

        debug!(
            "TrajCtrl error {:.4} -> steer {:.2} deg, speed {:.3}",
            composite_error, steer_angle_deg, motor_speed
        );

        Ok((
            MechDems {
                steer_angle_deg,
                motor_speed,
            },
            self.report,
        ))
    }
}

impl State for TrajCtrl {
    type InitData = &'static str;
    type InitError = TrajCtrlError;

    type InputData = InputData;
    type OutputData = MechDems;
    type StatusReport = StatusReport;
    type ProcError = TrajCtrlError;

    /// Initialise the TrajCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::InitError> {
        let params: Params = params::load(init_data)?;
        params.are_valid()?;

        debug!("TrajCtrl parameters: {:#?}", params);

        self.controller = Some(build_controller(&params));
        self.params = params;

        self.arch_report = Archiver::from_path(session, "traj_ctrl/status_report.csv")?;

        Ok(())
    }

    /// Calculate the steering and speed demands for the current lane geometry.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        self.proc_at(input_data, Instant::now())
    }
}

impl Archived for TrajCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(self.report)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn build_controller(params: &Params) -> PidController {
    PidController::new(params.k_p, params.k_i, params.k_d)
        .with_limits(params.output_min, params.output_max)
}

/// Weighted combination of the lane offset and heading.
pub fn composite_error(geometry: &LaneGeometry, params: &Params) -> f64 {
    params.offset_weight * (geometry.offset_norm * params.offset_scale)
        + params.heading_weight * (geometry.heading_rad * params.heading_scale)
}

/// Speed demand for the given steering angle and perception confidence.
///
/// Never more than `max_speed * confidence`, reduced linearly with the steering angle.
pub fn speed_demand(steer_angle_deg: f64, confidence: f64, params: &Params) -> f64 {
    let confidence = clamp_finite(confidence, 0.0, 1.0, 0.0);
    let base = params.max_speed * confidence;
    let lock_frac = (steer_angle_deg.abs() / params.max_wheel_angle_deg).min(1.0);

    base * (1.0 - lock_frac * params.speed_reduction)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lane_det::{CONFIDENCE_FULL, CONFIDENCE_NONE};
    use std::time::Duration;

    fn input(offset_norm: f64, heading_rad: f64, confidence: f64, enabled: bool) -> InputData {
        InputData {
            geometry: LaneGeometry::new(offset_norm, heading_rad, confidence),
            enabled,
        }
    }

    #[test]
    fn test_composite_error() {
        let p = Params::default();
        let g = LaneGeometry::new(0.5, 0.1, 1.0);
        assert!((composite_error(&g, &p) - (0.35 + 0.03)).abs() < 1e-12);
    }

    #[test]
    fn test_steer_and_speed() {
        let mut tc = TrajCtrl::from_params(Params::default()).unwrap();

        let (dems, report) = tc.proc_at(&input(0.5, 0.0, 1.0, true), Instant::now()).unwrap();

        // error 0.35, first update is purely proportional
        assert!((report.composite_error - 0.35).abs() < 1e-12);
        assert!((dems.steer_angle_deg - 0.42).abs() < 1e-9);
        assert!(!report.steer_saturated);

        let expected_speed = 0.5 * (1.0 - (0.42 / 30.0) * 0.5);
        assert!((dems.motor_speed - expected_speed).abs() < 1e-9);
    }

    #[test]
    fn test_invert_steer() {
        let params = Params {
            invert_steer: true,
            ..Default::default()
        };
        let mut tc = TrajCtrl::from_params(params).unwrap();

        let (dems, _) = tc.proc_at(&input(0.5, 0.0, 1.0, true), Instant::now()).unwrap();
        assert!((dems.steer_angle_deg + 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_saturation() {
        let params = Params {
            k_p: 1000.0,
            output_min: None,
            output_max: None,
            ..Default::default()
        };
        let mut tc = TrajCtrl::from_params(params).unwrap();

        let (dems, report) = tc.proc_at(&input(-1.0, 0.0, 1.0, true), Instant::now()).unwrap();
        assert_eq!(dems.steer_angle_deg, -30.0);
        assert!(report.steer_saturated);
        assert!((dems.motor_speed - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_zero_confidence_no_propulsion() {
        let mut tc = TrajCtrl::from_params(Params::default()).unwrap();
        let t0 = Instant::now();

        for i in 0..5 {
            let (dems, _) = tc
                .proc_at(
                    &input(0.0, 0.0, CONFIDENCE_NONE, true),
                    t0 + Duration::from_millis(50 * i),
                )
                .unwrap();
            assert_eq!(dems.motor_speed, 0.0);
        }
    }

    #[test]
    fn test_steering_never_increases_speed() {
        let p = Params::default();
        let straight = speed_demand(0.0, CONFIDENCE_FULL, &p);

        let mut prev = straight;
        for i in 0..=40 {
            let s = speed_demand(i as f64, CONFIDENCE_FULL, &p);
            assert!(s <= straight);
            assert!(s <= prev);
            assert_eq!(s, speed_demand(-(i as f64), CONFIDENCE_FULL, &p));
            prev = s;
        }
    }

    #[test]
    fn test_disabled_mid_run_stops() {
        let mut tc = TrajCtrl::from_params(Params::default()).unwrap();
        let t0 = Instant::now();

        let (dems, _) = tc.proc_at(&input(0.8, 0.2, 1.0, true), t0).unwrap();
        assert!(dems.motor_speed > 0.0);
        assert!(dems.steer_angle_deg != 0.0);

        let (dems, report) = tc
            .proc_at(&input(0.8, 0.2, 1.0, false), t0 + Duration::from_millis(50))
            .unwrap();
        assert_eq!(dems, MechDems::stop());
        assert_eq!(report.composite_error, 0.0);
        assert!(!report.enabled);
    }

    #[test]
    fn test_uninitialised() {
        let mut tc = TrajCtrl::default();
        assert!(matches!(
            tc.proc(&input(0.0, 0.0, 1.0, true)),
            Err(TrajCtrlError::NotInitialised)
        ));
    }

    #[test]
    fn test_steering_limit() {
        let mut tc = TrajCtrl::from_params(Params {
            k_p: 100.0,
            ..Default::default()
        })
        .unwrap();
        tc.limit_steering(10.0).unwrap();

        let (dems, report) = tc.proc_at(&input(1.0, 0.5, 1.0, true), Instant::now()).unwrap();
        assert_eq!(dems.steer_angle_deg, 10.0);
        assert!(report.steer_saturated);

        // Full lock removes the whole speed reduction fraction
        assert!((dems.motor_speed - 0.5 * (1.0 - 0.5)).abs() < 1e-12);

        assert!(tc.limit_steering(0.0).is_err());
        assert!(tc.limit_steering(f64::NAN).is_err());
        assert!(tc.limit_steering(f64::INFINITY).is_err());
        assert_eq!(tc.params.max_wheel_angle_deg, 10.0);
    }
}
