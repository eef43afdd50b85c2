//! # Lane library.
//!
//! This library allows other crates in the workspace (and the benchmarks) to access items defined
//! inside the lane following crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Frame sources - image directories and V4L2 cameras
pub mod cam;

/// Control loop - acquisition, processing, actuation and telemetry each cycle
pub mod control_loop;

/// Data store - module states and the data passed between them
pub mod data_store;

/// Run interlock - debounced run/pause toggle and its trigger sources
pub mod interlock;

/// Lane detection module - estimates the lane geometry from a camera frame
pub mod lane_det;

/// Lifecycle manager - leaves the actuators safe however the run ends
pub mod lifecycle;

/// Executable parameters
pub mod params;

/// Telemetry archive
pub mod tm;

/// Trajectory control module - turns the lane geometry into steering and speed demands
pub mod traj_ctrl;
