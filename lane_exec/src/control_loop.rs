//! # Control loop
//!
//! Each cycle pulls a frame, estimates the lane, computes the demands and actuates them, gated by
//! the run interlock. The loop ends when the frame source is exhausted, when the user interrupts
//! it, or with an error. Shutting the actuators down afterwards is left to the
//! [`Lifecycle`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::cam::{CamError, FrameSource};
use chrono::Utc;
use log::{debug, info, trace, warn};
use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};
use util::archive::{ArchiveError, Archived};

use crate::{
    data_store::DataStore, interlock::RunInterlock, lane_det::LaneDetError,
    lifecycle::Lifecycle, tm::TmArchive, traj_ctrl::TrajCtrlError,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Options of the control loop.
#[derive(Debug, Clone, Default)]
pub struct LoopConfig {
    /// If true the module status reports are archived every cycle
    pub archive_modules: bool,

    /// Save the lane detection overlay every this many cycles, zero to never save it
    pub overlay_save_period: u64,

    /// Directory overlays are saved into
    pub overlay_dir: Option<PathBuf>,

    /// Minimum duration of one cycle
    pub min_cycle_period: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Reason the control loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The frame source has no more frames
    SourceExhausted,

    /// The user interrupted the run
    Interrupted,
}

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("Frame acquisition failed: {0}")]
    CamError(#[from] CamError),

    #[error("Lane detection failed: {0}")]
    LaneDetError(#[from] LaneDetError),

    #[error("Trajectory control failed: {0}")]
    TrajCtrlError(#[from] TrajCtrlError),
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run the control loop until the source is exhausted, the user interrupts, or an error occurs.
pub fn run(
    ds: &mut DataStore,
    source: &mut dyn FrameSource,
    interlock: &RunInterlock,
    lifecycle: &mut Lifecycle,
    tm: &mut TmArchive,
    config: &LoopConfig,
) -> Result<LoopExit, LoopError> {
    let loop_start = Instant::now();

    info!("Begining main loop\n");

    loop {
        if lifecycle.is_interrupted() {
            info!("Interrupted after {} cycles", ds.num_cycles);
            return Ok(LoopExit::Interrupted);
        }

        let cycle_start_instant = Instant::now();

        // ---- DATA INPUT ----

        // Outputs of the last completed cycle are kept if no frame arrives
        let frame = match source.next_frame()? {
            Some(f) => f,
            None => {
                info!("Frame source exhausted after {} cycles", ds.num_cycles);
                return Ok(LoopExit::SourceExhausted);
            }
        };

        ds.cycle_start();

        trace!(
            "Frame {}x{} acquired {} ms ago",
            frame.width(),
            frame.height(),
            (Utc::now() - frame.timestamp).num_milliseconds()
        );

        // Sampled once so the whole cycle sees the same state
        let enabled = interlock.is_enabled();

        // ---- PROCESSING ----

        let dems = ds.proc_frame(&frame.image, enabled, cycle_start_instant)?;

        // ---- ACTUATION ----

        lifecycle.actuate(&dems);

        // ---- TELEMETRY ----

        let time = util::session::try_get_elapsed_seconds()
            .unwrap_or_else(|| loop_start.elapsed().as_secs_f64());
        tm.record(time, &ds.lane_det_output, &dems, enabled);
        log_archive_error("telemetry", tm.write());

        if config.archive_modules {
            log_archive_error("LaneDet", ds.lane_det.write());
            log_archive_error("TrajCtrl", ds.traj_ctrl.write());
        }

        if config.overlay_save_period > 0 && ds.num_cycles % config.overlay_save_period == 0 {
            save_overlay(ds, config);
        }

        // ---- CYCLE MANAGEMENT ----

        ds.num_cycles += 1;

        let cycle_dur = cycle_start_instant.elapsed();
        if let Some(d) = config.min_cycle_period.checked_sub(cycle_dur) {
            thread::sleep(d);
        }
    }
}

fn save_overlay(ds: &DataStore, config: &LoopConfig) {
    let (overlay, dir) = match (&ds.lane_det_overlay, &config.overlay_dir) {
        (Some(o), Some(d)) => (o, d),
        _ => return,
    };

    let path = dir.join(format!("overlay_{:06}.png", ds.num_cycles));
    match overlay.save(&path) {
        Ok(_) => debug!("Overlay saved to {:?}", path),
        Err(e) => warn!("Could not save the overlay to {:?}: {}", path, e),
    }
}

fn log_archive_error(what: &str, result: Result<(), ArchiveError>) {
    if let Err(e) = result {
        warn!("Could not archive {}: {}", what, e);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        lane_det::{self, LaneDet},
        traj_ctrl::{self, TrajCtrl},
    };
    use comms_if::eqpt::cam::CamImage;
    use image::{Rgb, RgbImage};
    use mech_lib::{
        params::MechParams,
        servo_ctrl::sim::{SimDriver, SimState},
        steer::ServoPulse,
    };
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    struct VecSource {
        frames: VecDeque<RgbImage>,
        fail_when_empty: bool,
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<CamImage>, CamError> {
            match self.frames.pop_front() {
                Some(f) => Ok(Some(CamImage::now(f))),
                None if self.fail_when_empty => Err(CamError::CaptureError(
                    std::io::Error::new(std::io::ErrorKind::Other, "unplugged"),
                )),
                None => Ok(None),
            }
        }
    }

    /// White lane boundaries converging towards the top of a 640x480 frame.
    fn lane_frame() -> RgbImage {
        let mut img = RgbImage::new(640, 480);
        for y in 240..480u32 {
            let run = (480 - y) as f64 / 1.2;
            for &cx in [100.0 + run, 540.0 - run].iter() {
                for x in (cx - 3.0).round() as u32..=(cx + 3.0).round() as u32 {
                    img.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
        }
        img
    }

    /// Serves lane frames, triggering the interlock as the given frame is handed out and
    /// recording the motor duties seen just before.
    struct TogglingSource {
        frames: VecDeque<RgbImage>,
        served: usize,
        toggle_at: usize,
        interlock: RunInterlock,
        state: Arc<Mutex<SimState>>,
        duties_before_toggle: Option<(u32, u32)>,
    }

    impl FrameSource for TogglingSource {
        fn next_frame(&mut self) -> Result<Option<CamImage>, CamError> {
            if self.served == self.toggle_at {
                self.duties_before_toggle = Some(self.state.lock().unwrap().motor_duties);
                let later = Instant::now() + self.interlock.debounce();
                assert!(self.interlock.trigger_at(later));
            }
            self.served += 1;
            Ok(self.frames.pop_front().map(CamImage::now))
        }
    }

    fn setup() -> (DataStore, Lifecycle, Arc<Mutex<SimState>>) {
        let ds = DataStore::new(
            LaneDet::from_params(lane_det::Params::default()).unwrap(),
            TrajCtrl::from_params(traj_ctrl::Params::default()).unwrap(),
        );

        let driver = SimDriver::new();
        let state = driver.state();
        let act = mech_lib::init_with_driver(&MechParams::default(), Box::new(driver));

        (ds, Lifecycle::new(act), state)
    }

    fn source(frames: Vec<RgbImage>, fail_when_empty: bool) -> VecSource {
        VecSource {
            frames: frames.into(),
            fail_when_empty,
        }
    }

    #[test]
    fn test_blank_frames_run_to_exhaustion() {
        let (mut ds, mut lc, state) = setup();
        let il = RunInterlock::new(true, Duration::from_millis(300));
        let mut src = source(vec![RgbImage::new(640, 480); 5], false);

        let exit = run(
            &mut ds,
            &mut src,
            &il,
            &mut lc,
            &mut TmArchive::default(),
            &LoopConfig::default(),
        )
        .unwrap();

        assert_eq!(exit, LoopExit::SourceExhausted);
        assert_eq!(ds.num_cycles, 5);

        let s = state.lock().unwrap();
        assert_eq!(s.motor_duties, (0, 0));
        // One write at init plus one per cycle
        assert_eq!(s.motor_writes, 6);
    }

    #[test]
    fn test_lane_drives_when_enabled() {
        let (mut ds, mut lc, state) = setup();
        let il = RunInterlock::new(true, Duration::from_millis(300));
        let mut src = source(vec![lane_frame()], false);

        run(
            &mut ds,
            &mut src,
            &il,
            &mut lc,
            &mut TmArchive::default(),
            &LoopConfig::default(),
        )
        .unwrap();

        assert_eq!(ds.lane_det_output.confidence, lane_det::CONFIDENCE_FULL);
        assert!(ds.traj_ctrl_output.motor_speed > 0.0);
        assert!(state.lock().unwrap().motor_duties.0 > 0);
    }

    #[test]
    fn test_disabled_interlock_stays_neutral() {
        let (mut ds, mut lc, state) = setup();
        let il = RunInterlock::new(false, Duration::from_millis(300));
        let mut src = source(vec![lane_frame(); 3], false);

        run(
            &mut ds,
            &mut src,
            &il,
            &mut lc,
            &mut TmArchive::default(),
            &LoopConfig::default(),
        )
        .unwrap();

        assert_eq!(ds.lane_det_output.confidence, lane_det::CONFIDENCE_FULL);

        let s = state.lock().unwrap();
        assert_eq!(s.motor_duties, (0, 0));
        assert_eq!(s.servo, Some(ServoPulse::Width(1500)));
    }

    #[test]
    fn test_disabled_mid_run() {
        let (mut ds, mut lc, state) = setup();
        let il = RunInterlock::new(true, Duration::from_millis(300));
        let mut src = TogglingSource {
            frames: vec![lane_frame(); 4].into(),
            served: 0,
            toggle_at: 2,
            interlock: il.clone(),
            state: state.clone(),
            duties_before_toggle: None,
        };

        let exit = run(
            &mut ds,
            &mut src,
            &il,
            &mut lc,
            &mut TmArchive::default(),
            &LoopConfig::default(),
        )
        .unwrap();

        assert_eq!(exit, LoopExit::SourceExhausted);
        assert_eq!(ds.num_cycles, 4);
        assert!(!il.is_enabled());

        // Driving until the trigger, neutral after it
        assert!(src.duties_before_toggle.unwrap().0 > 0);
        assert_eq!(ds.lane_det_output.confidence, lane_det::CONFIDENCE_FULL);
        assert_eq!(ds.traj_ctrl_output.motor_speed, 0.0);
        assert_eq!(ds.traj_ctrl_output.steer_angle_deg, 0.0);

        let s = state.lock().unwrap();
        assert_eq!(s.motor_duties, (0, 0));
        assert_eq!(s.servo, Some(ServoPulse::Width(1500)));
    }

    #[test]
    fn test_interrupt_stops_loop() {
        let (mut ds, mut lc, _state) = setup();
        let il = RunInterlock::new(true, Duration::from_millis(300));
        let mut src = source(vec![RgbImage::new(640, 480); 3], false);

        lc.interrupt_flag()
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let exit = run(
            &mut ds,
            &mut src,
            &il,
            &mut lc,
            &mut TmArchive::default(),
            &LoopConfig::default(),
        )
        .unwrap();

        assert_eq!(exit, LoopExit::Interrupted);
        assert_eq!(ds.num_cycles, 0);
    }

    #[test]
    fn test_capture_failure_ends_loop_safely() {
        let (mut ds, mut lc, state) = setup();
        let il = RunInterlock::new(true, Duration::from_millis(300));
        let mut src = source(vec![lane_frame()], true);

        let result = lc.run(|lc| {
            run(
                &mut ds,
                &mut src,
                &il,
                lc,
                &mut TmArchive::default(),
                &LoopConfig::default(),
            )
        });

        assert!(matches!(result, Err(LoopError::CamError(_))));
        assert_eq!(ds.num_cycles, 1);

        let s = state.lock().unwrap();
        assert_eq!(s.motor_duties, (0, 0));
        assert!(s.released);
    }

    #[test]
    fn test_overlays_saved() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut lc, _state) = setup();
        let mut ds = DataStore::new(
            LaneDet::from_params(lane_det::Params {
                overlay: true,
                ..Default::default()
            })
            .unwrap(),
            TrajCtrl::from_params(traj_ctrl::Params::default()).unwrap(),
        );
        let il = RunInterlock::new(false, Duration::from_millis(300));
        let mut src = source(vec![RgbImage::new(64, 48); 3], false);

        let config = LoopConfig {
            overlay_save_period: 2,
            overlay_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        run(
            &mut ds,
            &mut src,
            &il,
            &mut lc,
            &mut TmArchive::default(),
            &config,
        )
        .unwrap();

        assert!(dir.path().join("overlay_000000.png").exists());
        assert!(!dir.path().join("overlay_000001.png").exists());
        assert!(dir.path().join("overlay_000002.png").exists());
    }
}
