//! # Lane Detection module
//!
//! Estimates the geometry of the lane ahead of the vehicle from a single camera frame. Two
//! interchangeable pipelines are available, selected in `lane_det.toml`:
//!
//! - [`EdgePipeline`]: Canny edges and probabilistic Hough segments, averaged into a left and a
//!   right boundary fit. The last good fit of each side is kept and reused when a side disappears.
//! - [`WindowPipeline`]: top-down warp, colour threshold and a sliding window search up the mask.
//!
//! Failing to see the lane is not an error, the estimate's confidence drops to zero instead.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod edge;
mod params;
mod state;
pub mod vision;
mod window;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::RgbImage;
use serde::Serialize;
use util::{maths::clamp_finite, params::LoadError};

pub use edge::*;
pub use params::*;
pub use state::*;
pub use window::*;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Confidence when both lane boundaries were seen in the current frame.
pub const CONFIDENCE_FULL: f64 = 1.0;

/// Confidence when the estimate relies on a boundary remembered from a previous frame, or when
/// only one boundary is known.
pub const CONFIDENCE_STALE: f64 = 0.2;

/// Confidence when nothing is known about the lane.
pub const CONFIDENCE_NONE: f64 = 0.0;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A lane geometry estimation pipeline.
pub trait LaneDetector {
    /// Estimate the lane geometry in the given frame.
    fn estimate(&mut self, frame: &RgbImage) -> LaneEstimate;

    /// Report on the last call to [`LaneDetector::estimate`].
    fn report(&self) -> StatusReport;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Geometry of the lane relative to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct LaneGeometry {
    /// Lateral offset of the lane centre from the centre of the image, normalised by half the
    /// image width. Positive when the lane centre is right of the image centre.
    ///
    /// Units: normalised, within [-1, 1]
    pub offset_norm: f64,

    /// Direction of the lane relative to straight ahead, positive when the lane bends right.
    ///
    /// Units: radians
    pub heading_rad: f64,

    /// How much evidence backs this estimate, one of [`CONFIDENCE_FULL`], [`CONFIDENCE_STALE`]
    /// or [`CONFIDENCE_NONE`].
    pub confidence: f64,
}

/// Output of a lane detector.
#[derive(Debug, Clone)]
pub struct LaneEstimate {
    pub geometry: LaneGeometry,

    /// Debug image of the detection, only produced when overlays are enabled.
    pub overlay: Option<RgbImage>,
}

/// Status report for lane detection processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// Number of Hough segments found (edge pipeline)
    pub num_segments: usize,

    /// True if the left boundary was fitted from the current frame (edge pipeline)
    pub left_fit_fresh: bool,

    /// True if the right boundary was fitted from the current frame (edge pipeline)
    pub right_fit_fresh: bool,

    /// Number of left lane pixels found (window pipeline)
    pub left_pixels: usize,

    /// Number of right lane pixels found (window pipeline)
    pub right_pixels: usize,

    /// True if the frame was too small to be processed
    pub frame_too_small: bool,

    /// Confidence of the estimate
    pub confidence: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during LaneDet operation.
#[derive(Debug, thiserror::Error)]
pub enum LaneDetError {
    #[error("Could not load the LaneDet parameters: {0}")]
    ParamsLoadError(#[from] LoadError),

    #[error("Invalid LaneDet parameters: {0}")]
    InvalidParams(String),

    #[error("LaneDet has not been initialised")]
    NotInitialised,

    #[error("Could not create the LaneDet archive: {0}")]
    ArchiveError(#[from] util::archive::ArchiveError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LaneGeometry {
    /// No information about the lane.
    pub fn none() -> Self {
        Self {
            offset_norm: 0.0,
            heading_rad: 0.0,
            confidence: CONFIDENCE_NONE,
        }
    }

    /// Some boundary information exists but a lane centre cannot be placed.
    pub fn partial() -> Self {
        Self {
            confidence: CONFIDENCE_STALE,
            ..Self::none()
        }
    }

    /// Build a geometry, clamping the offset into [-1, 1].
    ///
    /// Non-finite values mean the lane could not be placed, in which case [`LaneGeometry::none`]
    /// is returned.
    pub fn new(offset_norm: f64, heading_rad: f64, confidence: f64) -> Self {
        if !(offset_norm.is_finite() && heading_rad.is_finite()) {
            return Self::none();
        }

        Self {
            offset_norm: clamp_finite(offset_norm, -1.0, 1.0, 0.0),
            heading_rad,
            confidence,
        }
    }
}

/// Offset of a lane centre column from the middle of an image, normalised by half the width.
pub fn normalised_offset(centre_x: f64, width: u32) -> f64 {
    let half_width = width as f64 / 2.0;
    (centre_x - half_width) / half_width
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_geometry_clamps_offset() {
        assert_eq!(LaneGeometry::new(3.0, 0.1, 1.0).offset_norm, 1.0);
        assert_eq!(LaneGeometry::new(-1.5, 0.1, 1.0).offset_norm, -1.0);
        assert_eq!(LaneGeometry::new(f64::NAN, 0.0, 1.0), LaneGeometry::none());
        assert_eq!(LaneGeometry::partial().confidence, CONFIDENCE_STALE);
    }

    #[test]
    fn test_normalised_offset() {
        assert_eq!(normalised_offset(320.0, 640), 0.0);
        assert_eq!(normalised_offset(500.0, 640), 0.5625);
        assert_eq!(normalised_offset(0.0, 640), -1.0);
    }
}
