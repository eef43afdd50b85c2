//! # Lane Executable Parameters
//!
//! This module provide parameters for the lane following executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use std::time::Duration;

use crate::{cam::FrameSourceParams, interlock::TriggerSourceParams};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest minimum cycle period honoured.
pub const MAX_CYCLE_PERIOD: Duration = Duration::from_secs(3600);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the lane following executable, loaded from `lane_exec.toml`.
#[derive(Deserialize, Debug, Clone)]
pub struct LaneExecParams {
    /// Minimum log level, one of `info`, `debug` or `trace`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where frames come from
    pub frame_source: FrameSourceParams,

    /// Where run/pause triggers come from
    #[serde(default)]
    pub trigger_source: TriggerSourceParams,

    /// If true the vehicle may move as soon as the loop starts, otherwise it waits for a trigger
    #[serde(default)]
    pub start_enabled: bool,

    /// Minimum time between two honoured run/pause triggers.
    ///
    /// Units: milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Save the lane detection overlay every this many cycles, zero to never save it
    #[serde(default)]
    pub overlay_save_period: u64,

    /// Minimum duration of one cycle, the loop sleeps off any time left over.
    ///
    /// Units: seconds
    #[serde(default)]
    pub min_cycle_period_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LaneExecParams {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Minimum cycle period, non-positive or invalid values mean no minimum. Periods too long to
    /// represent are capped at [`MAX_CYCLE_PERIOD`].
    pub fn min_cycle_period(&self) -> Duration {
        if self.min_cycle_period_s > 0.0 {
            Duration::try_from_secs_f64(self.min_cycle_period_s)
                .map(|d| d.min(MAX_CYCLE_PERIOD))
                .unwrap_or(MAX_CYCLE_PERIOD)
        } else {
            Duration::from_secs(0)
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_debounce_ms() -> u64 {
    300
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::cam::FrameSource;

    #[test]
    fn test_load_minimal() {
        let p: LaneExecParams = util::params::from_str(
            r#"
            [frame_source]
            kind = "image_dir"
            path = "data/track"
            "#,
        )
        .unwrap();

        assert_eq!(p.log_level, "info");
        assert_eq!(p.trigger_source, TriggerSourceParams::Disabled);
        assert!(!p.start_enabled);
        assert_eq!(p.debounce(), Duration::from_millis(300));
        assert_eq!(p.overlay_save_period, 0);
        assert_eq!(p.min_cycle_period(), Duration::from_secs(0));
    }

    #[test]
    fn test_load_full() {
        let p: LaneExecParams = util::params::from_str(
            r#"
            log_level = "debug"
            start_enabled = true
            debounce_ms = 500
            overlay_save_period = 10
            min_cycle_period_s = 0.05

            [frame_source]
            kind = "v4l"
            device = "/dev/video0"
            width = 640
            height = 480
            fps = 30

            [trigger_source]
            kind = "gpio"
            pin = 17
            "#,
        )
        .unwrap();

        assert_eq!(p.trigger_source, TriggerSourceParams::Gpio { pin: 17 });
        assert_eq!(p.debounce(), Duration::from_millis(500));
        assert_eq!(p.min_cycle_period(), Duration::from_millis(50));
    }

    #[test]
    fn test_extreme_cycle_periods() {
        let with_period = |s: f64| LaneExecParams {
            min_cycle_period_s: s,
            ..util::params::from_str::<LaneExecParams>(
                "[frame_source]\nkind = \"image_dir\"\npath = \"x\"",
            )
            .unwrap()
        };

        assert_eq!(with_period(1e300).min_cycle_period(), MAX_CYCLE_PERIOD);
        assert_eq!(with_period(f64::INFINITY).min_cycle_period(), MAX_CYCLE_PERIOD);
        assert_eq!(with_period(f64::NAN).min_cycle_period(), Duration::from_secs(0));
        assert_eq!(with_period(-1.0).min_cycle_period(), Duration::from_secs(0));
        assert_eq!(with_period(7200.0).min_cycle_period(), MAX_CYCLE_PERIOD);
    }

    #[test]
    fn test_shipped_params_valid() {
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let dir = root.join("params");

        let exec: LaneExecParams = util::params::load_from_path(dir.join("lane_exec.toml")).unwrap();

        // The shipped frame source opens with the default features
        let frame_source = match exec.frame_source.clone() {
            FrameSourceParams::ImageDir { path } => FrameSourceParams::ImageDir {
                path: root.join(path),
            },
            other => other,
        };
        let mut source = crate::cam::open_frame_source(&frame_source).unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!((frame.image.width(), frame.image.height()), (640, 480));
        assert!(exec.min_cycle_period() < Duration::from_secs(1));

        let lane_det: crate::lane_det::Params =
            util::params::load_from_path(dir.join("lane_det.toml")).unwrap();
        assert!(lane_det.are_valid().is_ok());

        let traj_ctrl: crate::traj_ctrl::Params =
            util::params::load_from_path(dir.join("traj_ctrl.toml")).unwrap();
        assert!(traj_ctrl.are_valid().is_ok());

        let mech: mech_lib::params::MechParams =
            util::params::load_from_path(dir.join("mech_exec.toml")).unwrap();
        assert!(mech.are_valid().is_ok());
    }
}
