//! Trajectory control parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use super::TrajCtrlError;
use mech_lib::params::MechParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for trajectory control, loaded from `traj_ctrl.toml`.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Params {
    /// Steering controller proportional gain
    pub k_p: f64,

    /// Steering controller integral gain
    pub k_i: f64,

    /// Steering controller derivative gain
    pub k_d: f64,

    /// Lower limit of the controller output.
    ///
    /// Units: degrees
    pub output_min: Option<f64>,

    /// Upper limit of the controller output.
    ///
    /// Units: degrees
    pub output_max: Option<f64>,

    /// Weight of the lateral offset in the composite error
    pub offset_weight: f64,

    /// Weight of the lane heading in the composite error
    pub heading_weight: f64,

    /// Scale applied to the normalised offset before weighting
    pub offset_scale: f64,

    /// Scale applied to the heading before weighting
    pub heading_scale: f64,

    /// Largest steering angle demand either side of straight. Not read from `traj_ctrl.toml`,
    /// the steering limit of the mechanisms parameters is applied with
    /// [`TrajCtrl::limit_steering`](super::TrajCtrl::limit_steering).
    ///
    /// Units: degrees
    #[serde(skip)]
    pub max_wheel_angle_deg: f64,

    /// If true the sign of the controller output is flipped before it becomes a steering demand
    pub invert_steer: bool,

    /// Speed demand at full confidence when driving straight.
    ///
    /// Units: normalised, 0 to 1
    pub max_speed: f64,

    /// Fraction of the speed removed at full steering lock
    pub speed_reduction: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Params {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), TrajCtrlError> {
        let all_finite = [
            self.k_p,
            self.k_i,
            self.k_d,
            self.offset_weight,
            self.heading_weight,
            self.offset_scale,
            self.heading_scale,
        ]
        .iter()
        .all(|v| v.is_finite());

        if !all_finite {
            return Err(invalid("gains, weights and scales must be finite"));
        }

        if let (Some(min), Some(max)) = (self.output_min, self.output_max) {
            if !(min < max) {
                return Err(invalid("output_min must be less than output_max"));
            }
        }

        if !(self.max_wheel_angle_deg.is_finite() && self.max_wheel_angle_deg > 0.0) {
            return Err(invalid("max_wheel_angle_deg must be positive"));
        }

        if !(self.max_speed >= 0.0 && self.max_speed <= 1.0) {
            return Err(invalid("max_speed must be in [0, 1]"));
        }

        if !(self.speed_reduction >= 0.0 && self.speed_reduction <= 1.0) {
            return Err(invalid("speed_reduction must be in [0, 1]"));
        }

        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            k_p: 1.2,
            k_i: 0.0,
            k_d: 0.2,
            output_min: Some(-30.0),
            output_max: Some(30.0),
            offset_weight: 0.7,
            heading_weight: 0.3,
            offset_scale: 1.0,
            heading_scale: 1.0,
            max_wheel_angle_deg: MechParams::default().steer.max_wheel_angle_deg,
            invert_steer: false,
            max_speed: 0.5,
            speed_reduction: 0.5,
        }
    }
}

fn invalid(msg: &str) -> TrajCtrlError {
    TrajCtrlError::InvalidParams(msg.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(Params::default().are_valid().is_ok());
    }

    #[test]
    fn test_invalid() {
        let mut p = Params::default();
        p.output_min = Some(10.0);
        p.output_max = Some(-10.0);
        assert!(p.are_valid().is_err());

        let mut p = Params::default();
        p.max_wheel_angle_deg = 0.0;
        assert!(p.are_valid().is_err());

        let mut p = Params::default();
        p.max_speed = 1.5;
        assert!(p.are_valid().is_err());
    }

    #[test]
    fn test_unbounded_output_from_toml() {
        let p: Params = util::params::from_str("k_i = 0.05\noutput_max = 25.0").unwrap();
        assert_eq!(p.k_i, 0.05);
        assert_eq!(p.output_max, Some(25.0));
        assert_eq!(p.output_min, Some(-30.0));
    }

    #[test]
    fn test_steering_limit_not_read_from_toml() {
        let p: Params = util::params::from_str("max_wheel_angle_deg = 5.0").unwrap();
        assert_eq!(
            p.max_wheel_angle_deg,
            MechParams::default().steer.max_wheel_angle_deg
        );
    }
}
