//! Edge and line based lane estimation

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{Rgb, RgbImage};
use log::trace;
use serde::Serialize;

use super::{
    normalised_offset,
    vision::{self, LineSegment},
    EdgeParams, LaneDetector, LaneEstimate, LaneGeometry, StatusReport, CONFIDENCE_FULL,
    CONFIDENCE_STALE,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const FIT_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const FIT_THICKNESS: u32 = 5;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A lane boundary in image space, `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LaneFit {
    pub slope: f64,
    pub intercept: f64,
}

/// Lane estimation from Hough line segments.
///
/// Keeps the last good fit of each boundary, which stands in for that boundary in frames where it
/// is not seen.
pub struct EdgePipeline {
    params: EdgeParams,
    overlay: bool,

    last_left: Option<LaneFit>,
    last_right: Option<LaneFit>,

    report: StatusReport,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LaneFit {
    /// Create a new fit, `None` if the slope is zero or either value is not finite.
    pub fn new(slope: f64, intercept: f64) -> Option<Self> {
        if slope != 0.0 && slope.is_finite() && intercept.is_finite() {
            Some(Self { slope, intercept })
        } else {
            None
        }
    }

    /// Column of the boundary at the given row, `None` if it is not finite.
    pub fn x_at(&self, y: f64) -> Option<f64> {
        let x = (y - self.intercept) / self.slope;
        if x.is_finite() {
            Some(x)
        } else {
            None
        }
    }

    /// Columns of the boundary at the bottom row and at the heading sample row.
    pub fn coordinates(&self, height: u32, mid_y_frac: f64) -> Option<(f64, f64)> {
        let bottom = self.x_at(height as f64)?;
        let mid = self.x_at(height as f64 * mid_y_frac)?;
        Some((bottom, mid))
    }
}

impl EdgePipeline {
    pub fn new(params: EdgeParams, overlay: bool) -> Self {
        Self {
            params,
            overlay,
            last_left: None,
            last_right: None,
            report: StatusReport::default(),
        }
    }

    /// The remembered (left, right) boundary fits.
    pub fn last_fits(&self) -> (Option<LaneFit>, Option<LaneFit>) {
        (self.last_left, self.last_right)
    }

    /// Combine this frame's boundary fits with the remembered ones into a lane geometry.
    ///
    /// Fits which do not resolve to finite coordinates in a `width` x `height` frame are
    /// discarded. Surviving fits replace the remembered fit for their side.
    pub fn fuse_fits(
        &mut self,
        left: Option<LaneFit>,
        right: Option<LaneFit>,
        width: u32,
        height: u32,
    ) -> LaneGeometry {
        let mid_y_frac = self.params.mid_y_frac;
        let usable = |f: &LaneFit| f.coordinates(height, mid_y_frac).is_some();

        let left = left.filter(usable);
        let right = right.filter(usable);

        if left.is_some() {
            self.last_left = left;
        }
        if right.is_some() {
            self.last_right = right;
        }

        self.report.left_fit_fresh = left.is_some();
        self.report.right_fit_fresh = right.is_some();

        let fresh = left.is_some() && right.is_some();

        let geometry = match (left.or(self.last_left), right.or(self.last_right)) {
            (Some(l), Some(r)) => {
                let confidence = if fresh {
                    CONFIDENCE_FULL
                } else {
                    CONFIDENCE_STALE
                };
                centre_geometry(&l, &r, width, height, mid_y_frac, confidence)
                    .unwrap_or_else(LaneGeometry::partial)
            }
            (None, None) => LaneGeometry::none(),
            _ => LaneGeometry::partial(),
        };

        self.report.confidence = geometry.confidence;
        geometry
    }

    fn draw_overlay(&self, frame: &RgbImage) -> RgbImage {
        let (width, height) = frame.dimensions();
        let mut lines = RgbImage::new(width, height);

        for fit in [self.last_left, self.last_right].iter().flatten() {
            if let Some((bottom, mid)) = fit.coordinates(height, self.params.mid_y_frac) {
                let mid_y = height as f64 * self.params.mid_y_frac;
                vision::draw_line(
                    &mut lines,
                    (bottom, height as f64),
                    (mid, mid_y),
                    FIT_COLOUR,
                    FIT_THICKNESS,
                );
            }
        }

        vision::add_weighted(frame, 0.8, &lines, 1.0)
    }
}

impl LaneDetector for EdgePipeline {
    fn estimate(&mut self, frame: &RgbImage) -> LaneEstimate {
        self.report = StatusReport::default();

        let (width, height) = frame.dimensions();
        if width < 3 || height < 3 {
            self.report.frame_too_small = true;
            return LaneEstimate {
                geometry: LaneGeometry::none(),
                overlay: None,
            };
        }

        let mut edges = vision::edge_mask(frame, self.params.canny_low, self.params.canny_high);
        vision::apply_roi(
            &mut edges,
            self.params.roi_top_frac,
            self.params.roi_top_inset_frac,
            self.params.roi_bottom_inset_frac,
        );

        let segments = vision::hough_lines_p(&edges, &self.params.hough());
        self.report.num_segments = segments.len();
        trace!("{} segments detected", segments.len());

        let (left, right) = average_fits(&segments);
        let geometry = self.fuse_fits(left, right, width, height);

        let overlay = if self.overlay {
            Some(self.draw_overlay(frame))
        } else {
            None
        };

        LaneEstimate { geometry, overlay }
    }

    fn report(&self) -> StatusReport {
        self.report
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Split segments into left (negative slope) and right (non-negative slope) boundaries and
/// average the slope and intercept of each side. Vertical segments are skipped.
pub fn average_fits(segments: &[LineSegment]) -> (Option<LaneFit>, Option<LaneFit>) {
    let mut left = (0.0, 0.0, 0usize);
    let mut right = (0.0, 0.0, 0usize);

    for seg in segments {
        let slope = match seg.slope() {
            Some(s) => s,
            None => continue,
        };
        let intercept = seg.y1 as f64 - slope * seg.x1 as f64;

        let side = if slope < 0.0 { &mut left } else { &mut right };
        side.0 += slope;
        side.1 += intercept;
        side.2 += 1;
    }

    let mean = |(slope, intercept, n): (f64, f64, usize)| {
        if n == 0 {
            None
        } else {
            LaneFit::new(slope / n as f64, intercept / n as f64)
        }
    };

    (mean(left), mean(right))
}

/// Lane geometry from a left and right boundary.
///
/// The offset is taken at the bottom row, the heading from the vector joining the lane centre at
/// the bottom row to the lane centre at the heading sample row.
pub fn centre_geometry(
    left: &LaneFit,
    right: &LaneFit,
    width: u32,
    height: u32,
    mid_y_frac: f64,
    confidence: f64,
) -> Option<LaneGeometry> {
    let (left_bottom, left_mid) = left.coordinates(height, mid_y_frac)?;
    let (right_bottom, right_mid) = right.coordinates(height, mid_y_frac)?;

    let centre_bottom = (left_bottom + right_bottom) / 2.0;
    let centre_mid = (left_mid + right_mid) / 2.0;

    let dx = centre_mid - centre_bottom;
    let dy = (height as f64 * mid_y_frac - height as f64).abs();
    let heading_rad = if dy == 0.0 { 0.0 } else { dx.atan2(dy) };

    Some(LaneGeometry::new(
        normalised_offset(centre_bottom, width),
        heading_rad,
        confidence,
    ))
}
