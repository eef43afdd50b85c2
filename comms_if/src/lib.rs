//! # Communications interface crate.
//!
//! Provides the interface types shared between the lane follower executables: camera frames in,
//! actuator demands out, and the per-cycle telemetry record.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command and data definitions for equipment (cameras and mechanisms)
pub mod eqpt;

/// Telemetry records
pub mod tm;
