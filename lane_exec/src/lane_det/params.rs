//! Parameters structure for LaneDet

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use super::{vision::HoughParams, LaneDetError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for lane detection, loaded from `lane_det.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Which estimation pipeline to run
    pub pipeline: PipelineKind,

    /// If true a debug overlay image is produced alongside every estimate
    pub overlay: bool,

    pub edge: EdgeParams,

    pub window: WindowParams,
}

/// Parameters of the edge/line pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
    /// Canny hysteresis lower threshold
    pub canny_low: f64,

    /// Canny hysteresis upper threshold
    pub canny_high: f64,

    /// Top of the region of interest as a fraction of the image height
    pub roi_top_frac: f64,

    /// Inset of each side of the region of interest at its top row, as a fraction of the width
    pub roi_top_inset_frac: f64,

    /// Inset of each side of the region of interest at the bottom row, as a fraction of the width
    pub roi_bottom_inset_frac: f64,

    /// Row at which the lane heading is sampled, as a fraction of the image height
    pub mid_y_frac: f64,

    /// Hough accumulator distance resolution.
    ///
    /// Units: pixels
    pub hough_rho_px: f64,

    /// Hough accumulator angle resolution.
    ///
    /// Units: degrees
    pub hough_theta_deg: f64,

    /// Hough vote threshold
    pub hough_threshold: u32,

    /// Minimum extent of a detected segment.
    ///
    /// Units: pixels
    pub hough_min_line_length_px: u32,

    /// Maximum gap bridged along a detected segment.
    ///
    /// Units: pixels
    pub hough_max_line_gap_px: u32,
}

/// Parameters of the histogram/sliding window pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowParams {
    /// Top edge of the warped region as a fraction of the image height
    pub warp_top_frac: f64,

    /// Distance of the bottom edge of the warped region from the bottom of the image.
    ///
    /// Units: pixels
    pub warp_bottom_margin_px: f64,

    /// Inset of each side of the warped region at its top edge, as a fraction of the width
    pub warp_top_inset_frac: f64,

    /// Inset of each side of the warped region at its bottom edge, as a fraction of the width
    pub warp_bottom_inset_frac: f64,

    /// Inclusive lower HSV bound of lane pixels (H in [0, 180), S and V in [0, 255])
    pub hsv_lower: [u8; 3],

    /// Inclusive upper HSV bound of lane pixels
    pub hsv_upper: [u8; 3],

    /// Number of windows stacked up the height of the mask
    pub num_windows: usize,

    /// Half width of each window.
    ///
    /// Units: pixels
    pub margin_px: usize,

    /// A window must contain more than this many pixels to recentre the search
    pub min_pix: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Available lane estimation pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Edge,
    Window,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Params {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), LaneDetError> {
        let e = &self.edge;

        check_frac("edge.roi_top_frac", e.roi_top_frac)?;
        check_frac("edge.mid_y_frac", e.mid_y_frac)?;
        check_inset("edge.roi_top_inset_frac", e.roi_top_inset_frac)?;
        check_inset("edge.roi_bottom_inset_frac", e.roi_bottom_inset_frac)?;

        if !(e.canny_low >= 0.0 && e.canny_low <= e.canny_high) {
            return Err(invalid("edge.canny_low must be non-negative and at most edge.canny_high"));
        }

        if !(e.hough_rho_px > 0.0 && e.hough_theta_deg > 0.0 && e.hough_theta_deg <= 180.0) {
            return Err(invalid("edge.hough_rho_px and edge.hough_theta_deg must be positive"));
        }

        let w = &self.window;

        check_frac("window.warp_top_frac", w.warp_top_frac)?;
        check_inset("window.warp_top_inset_frac", w.warp_top_inset_frac)?;
        check_inset("window.warp_bottom_inset_frac", w.warp_bottom_inset_frac)?;

        if !(w.warp_bottom_margin_px >= 0.0) {
            return Err(invalid("window.warp_bottom_margin_px must be non-negative"));
        }

        if w.hsv_lower.iter().zip(w.hsv_upper.iter()).any(|(l, u)| l > u) {
            return Err(invalid("window.hsv_lower must not exceed window.hsv_upper"));
        }

        if w.num_windows == 0 {
            return Err(invalid("window.num_windows must be nonzero"));
        }

        Ok(())
    }
}

impl EdgeParams {
    /// The Hough transform parameters.
    pub fn hough(&self) -> HoughParams {
        HoughParams {
            rho_px: self.hough_rho_px,
            theta_rad: self.hough_theta_deg.to_radians(),
            threshold: self.hough_threshold,
            min_line_length_px: self.hough_min_line_length_px,
            max_line_gap_px: self.hough_max_line_gap_px,
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            pipeline: PipelineKind::Edge,
            overlay: false,
            edge: EdgeParams::default(),
            window: WindowParams::default(),
        }
    }
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            roi_top_frac: 0.6,
            roi_top_inset_frac: 0.0,
            roi_bottom_inset_frac: 0.0,
            mid_y_frac: 0.6,
            hough_rho_px: 2.0,
            hough_theta_deg: 1.0,
            hough_threshold: 100,
            hough_min_line_length_px: 40,
            hough_max_line_gap_px: 5,
        }
    }
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            warp_top_frac: 0.5,
            warp_bottom_margin_px: 50.0,
            warp_top_inset_frac: 0.0,
            warp_bottom_inset_frac: 0.0,
            hsv_lower: [86, 40, 0],
            hsv_upper: [150, 255, 255],
            num_windows: 12,
            margin_px: 50,
            min_pix: 50,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn invalid(msg: &str) -> LaneDetError {
    LaneDetError::InvalidParams(msg.to_string())
}

fn check_frac(name: &str, value: f64) -> Result<(), LaneDetError> {
    if value >= 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(LaneDetError::InvalidParams(format!(
            "{} must be in [0, 1), found {}",
            name, value
        )))
    }
}

fn check_inset(name: &str, value: f64) -> Result<(), LaneDetError> {
    if value >= 0.0 && value < 0.5 {
        Ok(())
    } else {
        Err(LaneDetError::InvalidParams(format!(
            "{} must be in [0, 0.5), found {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        assert!(Params::default().are_valid().is_ok());
        assert_eq!(Params::default().edge.hough(), HoughParams::default());
    }

    #[test]
    fn test_invalid_params() {
        let mut p = Params::default();
        p.window.num_windows = 0;
        assert!(p.are_valid().is_err());

        let mut p = Params::default();
        p.edge.roi_top_frac = 1.2;
        assert!(p.are_valid().is_err());

        let mut p = Params::default();
        p.window.hsv_lower = [160, 0, 0];
        assert!(p.are_valid().is_err());

        let mut p = Params::default();
        p.edge.canny_low = 200.0;
        assert!(p.are_valid().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let p: Params = util::params::from_str(
            r#"
            pipeline = "window"

            [window]
            num_windows = 8
            "#,
        )
        .unwrap();

        assert_eq!(p.pipeline, PipelineKind::Window);
        assert_eq!(p.window.num_windows, 8);
        assert_eq!(p.window.margin_px, 50);
        assert_eq!(p.edge.hough_threshold, 100);
    }
}
