//! # Trajectory control module
//!
//! Trajectory control keeps the vehicle centred in the lane. Each cycle the lane geometry from
//! [`crate::lane_det`] is folded into a single composite error, a weighted sum of the lateral
//! offset and the heading of the lane, which a PID controller turns into a steering angle demand.
//!
//! The speed demand is derived from the steering demand and the perception confidence: the
//! harder the turn the slower the vehicle goes, and with no confidence in the lane there is no
//! propulsion at all.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
mod pid;
mod state;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use util::params::LoadError;

pub use params::Params;
pub use pid::*;
pub use state::*;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during TrajCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum TrajCtrlError {
    #[error("Could not load the TrajCtrl parameters: {0}")]
    ParamsLoadError(#[from] LoadError),

    #[error("Invalid TrajCtrl parameters: {0}")]
    InvalidParams(String),

    #[error("TrajCtrl has not been initialised")]
    NotInitialised,

    #[error("Could not create the TrajCtrl archive: {0}")]
    ArchiveError(#[from] util::archive::ArchiveError),
}
