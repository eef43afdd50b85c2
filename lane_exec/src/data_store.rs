//! # Data Store
//!
//! Holds the module states and the data passed between them during a cycle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::mech::MechDems;
use image::RgbImage;
use log::trace;
use std::time::Instant;
use util::module::State;

use crate::{
    control_loop::LoopError,
    lane_det::{self, LaneDet, LaneGeometry},
    traj_ctrl::{self, TrajCtrl},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    /// Number of cycles already executed
    pub num_cycles: u64,

    // LaneDet
    pub lane_det: LaneDet,
    pub lane_det_output: LaneGeometry,
    pub lane_det_overlay: Option<RgbImage>,
    pub lane_det_status_rpt: lane_det::StatusReport,

    // TrajCtrl
    pub traj_ctrl: TrajCtrl,
    pub traj_ctrl_input: traj_ctrl::InputData,
    pub traj_ctrl_output: MechDems,
    pub traj_ctrl_status_rpt: traj_ctrl::StatusReport,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DataStore {
    /// Create a data store from already initialised modules.
    pub fn new(lane_det: LaneDet, traj_ctrl: TrajCtrl) -> Self {
        Self {
            lane_det,
            traj_ctrl,
            ..Default::default()
        }
    }

    /// Clear the items produced during a cycle.
    pub fn cycle_start(&mut self) {
        self.lane_det_output = LaneGeometry::none();
        self.lane_det_overlay = None;
        self.lane_det_status_rpt = lane_det::StatusReport::default();

        self.traj_ctrl_input = traj_ctrl::InputData::default();
        self.traj_ctrl_output = MechDems::stop();
        self.traj_ctrl_status_rpt = traj_ctrl::StatusReport::default();
    }

    /// Run lane detection and trajectory control on one frame.
    ///
    /// Returns the demands to actuate, which stop the vehicle whenever `enabled` is false.
    pub fn proc_frame(
        &mut self,
        image: &RgbImage,
        enabled: bool,
        now: Instant,
    ) -> Result<MechDems, LoopError> {
        let (estimate, lane_det_rpt) = self.lane_det.proc(image)?;
        self.lane_det_output = estimate.geometry;
        self.lane_det_overlay = estimate.overlay;
        self.lane_det_status_rpt = lane_det_rpt;

        self.traj_ctrl_input = traj_ctrl::InputData {
            geometry: self.lane_det_output,
            enabled,
        };

        let (dems, traj_ctrl_rpt) = self.traj_ctrl.proc_at(&self.traj_ctrl_input, now)?;
        self.traj_ctrl_output = dems;
        self.traj_ctrl_status_rpt = traj_ctrl_rpt;

        trace!(
            "Cycle {}: {:?} -> {:?}",
            self.num_cycles,
            self.lane_det_output,
            self.traj_ctrl_output
        );

        Ok(dems)
    }
}
