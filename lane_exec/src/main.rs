//! Main lane following executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Initialise the modules, the frame source and the actuators
//!     - Start the run/pause trigger source
//!     - Main loop:
//!         - Frame acquisition
//!         - Lane detection
//!         - Trajectory control, gated by the run interlock
//!         - Actuation
//!         - Telemetry
//!     - Shut the actuators down
//!
//! # Modules
//!
//! All modules (e.g. `lane_det`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{error, info};
use structopt::StructOpt;

// Internal
use lane_lib::{
    cam,
    control_loop::{self, LoopConfig, LoopExit},
    data_store::DataStore,
    interlock::{self, RunInterlock},
    lifecycle::Lifecycle,
    params::LaneExecParams,
    tm::TmArchive,
};
use mech_lib::params::MechParams;
use util::{
    host,
    logger::{logger_init, parse_level},
    module::State,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CLI
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "lane_exec", about = "Camera based lane following")]
struct Opt {
    /// Executable parameter file, relative to the params directory
    #[structopt(short, long, default_value = "lane_exec.toml")]
    params: String,

    /// Override the log level from the parameter file (info, debug or trace)
    #[structopt(short, long)]
    log_level: Option<String>,

    /// Start with the vehicle allowed to move, regardless of the parameter file
    #[structopt(long)]
    start_enabled: bool,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("lane_exec", "sessions").wrap_err("Failed to create the session")?;

    // Parameters are needed for the log level, so are loaded before logging starts
    let exec_params: LaneExecParams =
        util::params::load(&opt.params).wrap_err("Could not load exec params")?;

    let level = opt.log_level.as_deref().unwrap_or(exec_params.log_level.as_str());
    logger_init(
        parse_level(level).wrap_err("Invalid log level")?,
        &session,
    )
    .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Lane Following Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    let mech_params: MechParams =
        util::params::load("mech_exec.toml").wrap_err("Could not load mechanisms params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    ds.lane_det
        .init("lane_det.toml", &session)
        .wrap_err("Failed to initialise LaneDet")?;
    info!("LaneDet init complete");

    ds.traj_ctrl
        .init("traj_ctrl.toml", &session)
        .wrap_err("Failed to initialise TrajCtrl")?;
    ds.traj_ctrl
        .limit_steering(mech_params.steer.max_wheel_angle_deg)
        .wrap_err("Invalid steering limit")?;
    info!("TrajCtrl init complete");

    let mut tm = TmArchive::new(&session).wrap_err("Failed to create the telemetry archive")?;

    let mut source = cam::open_frame_source(&exec_params.frame_source)
        .wrap_err("Failed to open the frame source")?;
    info!("Frame source initialised");

    info!("Module initialisation complete\n");

    // ---- INITIALISE ACTUATORS ----

    let actuators = mech_lib::init(&mech_params).wrap_err("Failed to initialise the mechanisms")?;
    let mut lifecycle = Lifecycle::new(actuators);
    lifecycle
        .install_interrupt_handler()
        .wrap_err("Failed to set the Ctrl-C handler")?;

    // ---- INTERLOCK ----

    let interlock = RunInterlock::new(
        exec_params.start_enabled || opt.start_enabled,
        exec_params.debounce(),
    );
    let _trigger = interlock::spawn_trigger_source(&exec_params.trigger_source, &interlock)
        .wrap_err("Failed to start the run trigger source")?;

    // ---- MAIN LOOP ----

    let overlay_dir = session.session_root.join("overlays");
    if exec_params.overlay_save_period > 0 {
        std::fs::create_dir_all(&overlay_dir).wrap_err("Failed to create the overlay directory")?;
    }

    let config = LoopConfig {
        archive_modules: true,
        overlay_save_period: exec_params.overlay_save_period,
        overlay_dir: Some(overlay_dir),
        min_cycle_period: exec_params.min_cycle_period(),
    };

    let result = lifecycle.run(|lc| {
        control_loop::run(&mut ds, source.as_mut(), &interlock, lc, &mut tm, &config)
    });

    match result {
        Ok(LoopExit::SourceExhausted) => info!("No more frames"),
        Ok(LoopExit::Interrupted) => info!("Interrupted by user"),
        Err(ref e) => error!("Main loop failed: {}", e),
    }

    info!("End of execution after {} cycles", ds.num_cycles);
    session.exit();

    result.map(|_| ()).wrap_err("Lane following ended with an error")
}
