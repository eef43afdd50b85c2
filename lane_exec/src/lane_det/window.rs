//! Histogram and sliding window based lane estimation

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::Projection;
use log::warn;
use util::maths::mean;

use super::{
    normalised_offset,
    vision::{self, Mask},
    LaneDetector, LaneEstimate, LaneGeometry, StatusReport, WindowParams, CONFIDENCE_FULL,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const ROI_COLOUR: Rgb<u8> = Rgb([0, 0, 255]);
const LANE_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Lane estimation from a colour mask of the top-down view.
pub struct WindowPipeline {
    params: WindowParams,
    overlay: bool,

    /// Warp for the most recent frame size
    warp: Option<Warp>,

    report: StatusReport,
}

/// Perspective warp for one frame size.
#[derive(Debug, Clone)]
struct Warp {
    size: (u32, u32),

    /// Source trapezoid corners: top left, bottom left, top right, bottom right
    corners: [(f64, f64); 4],

    /// Maps camera frame pixels into the top-down view
    to_top_down: Projection,

    /// Maps top-down view pixels back into the camera frame
    to_frame: Projection,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WindowPipeline {
    pub fn new(params: WindowParams, overlay: bool) -> Self {
        Self {
            params,
            overlay,
            warp: None,
            report: StatusReport::default(),
        }
    }

    /// Get the warp for the given frame size, computing it if the size has changed.
    fn warp_for(&mut self, width: u32, height: u32) -> Option<Warp> {
        if let Some(w) = &self.warp {
            if w.size == (width, height) {
                return Some(w.clone());
            }
        }

        let corners = warp_corners(&self.params, width, height);
        let (w, h) = (width as f64, height as f64);
        let dst = [(0.0, 0.0), (0.0, h), (w, 0.0), (w, h)];

        match (
            vision::perspective(&corners, &dst),
            vision::perspective(&dst, &corners),
        ) {
            (Some(to_top_down), Some(to_frame)) => {
                let warp = Warp {
                    size: (width, height),
                    corners,
                    to_top_down,
                    to_frame,
                };
                self.warp = Some(warp.clone());
                Some(warp)
            }
            _ => {
                warn!(
                    "Degenerate perspective warp for a {}x{} frame, corners {:?}",
                    width, height, corners
                );
                None
            }
        }
    }

    fn draw_overlay(
        &self,
        frame: &RgbImage,
        warp: &Warp,
        means: Option<(f64, f64)>,
    ) -> RgbImage {
        let mut img = frame.clone();
        let (_, height) = frame.dimensions();

        let [tl, bl, tr, br] = warp.corners;
        for &(a, b) in [(tl, tr), (tr, br), (br, bl), (bl, tl)].iter() {
            vision::draw_line(&mut img, a, b, ROI_COLOUR, 2);
        }

        // Lane boundaries are vertical in the top-down view, map them back into the frame
        if let Some((left, right)) = means {
            for &x in [left, right].iter() {
                let top = vision::project(&warp.to_frame, (x, 0.0));
                let bottom = vision::project(&warp.to_frame, (x, height as f64));
                if let (Some(top), Some(bottom)) = (top, bottom) {
                    vision::draw_line(&mut img, top, bottom, LANE_COLOUR, 3);
                }
            }
        }

        img
    }
}

impl LaneDetector for WindowPipeline {
    fn estimate(&mut self, frame: &RgbImage) -> LaneEstimate {
        self.report = StatusReport::default();

        let (width, height) = frame.dimensions();
        if width < 2 || (height as usize) < self.params.num_windows {
            self.report.frame_too_small = true;
            return LaneEstimate {
                geometry: LaneGeometry::none(),
                overlay: None,
            };
        }

        let warp = match self.warp_for(width, height) {
            Some(w) => w,
            None => {
                return LaneEstimate {
                    geometry: LaneGeometry::none(),
                    overlay: None,
                }
            }
        };

        let warped = vision::warp_nearest(frame, &warp.to_top_down);
        let mask = vision::hsv_in_range(&warped, self.params.hsv_lower, self.params.hsv_upper);

        let (left, right) = sliding_window(
            &mask,
            self.params.num_windows,
            self.params.margin_px,
            self.params.min_pix,
        );
        self.report.left_pixels = left.len();
        self.report.right_pixels = right.len();

        let geometry = geometry_from_columns(&left, &right, width);
        self.report.confidence = geometry.confidence;

        let overlay = if self.overlay {
            let means = mean(&left).zip(mean(&right));
            Some(self.draw_overlay(frame, &warp, means))
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

/// Corners of the camera frame region warped to the full top-down view, in the order top left,
/// bottom left, top right, bottom right.
pub fn warp_corners(params: &WindowParams, width: u32, height: u32) -> [(f64, f64); 4] {
    let (w, h) = (width as f64, height as f64);

    let top = h * params.warp_top_frac;
    let bottom = h - params.warp_bottom_margin_px;
    let top_inset = w * params.warp_top_inset_frac;
    let bottom_inset = w * params.warp_bottom_inset_frac;

    [
        (top_inset, top),
        (bottom_inset, bottom),
        (w - top_inset, top),
        (w - bottom_inset, bottom),
    ]
}

/// Search for the left and right lane pixels in a binary mask.
///
/// The starting column of each side is the peak of the column histogram of the lower half of the
/// mask, in the left and right halves respectively. The mask is then split into `num_windows`
/// horizontal bands from the bottom up; in each band the set pixels within
/// `[base - margin, base + margin)` of each side's current column are collected, and if there are
/// more than `min_pix` of them the column moves to their mean.
///
/// Returns the columns of all collected (left, right) pixels.
pub fn sliding_window(
    mask: &Mask,
    num_windows: usize,
    margin: usize,
    min_pix: usize,
) -> (Vec<usize>, Vec<usize>) {
    let (rows, cols) = mask.dim();
    let mut left = Vec::new();
    let mut right = Vec::new();

    if rows == 0 || cols == 0 || num_windows == 0 || rows < num_windows {
        return (left, right);
    }

    let histogram: Vec<u32> = (0..cols)
        .map(|c| (rows / 2..rows).map(|r| mask[[r, c]] as u32).sum())
        .collect();

    let midpoint = cols / 2;
    let mut left_base = argmax(&histogram[..midpoint]) as i64;
    let mut right_base = (argmax(&histogram[midpoint..]) + midpoint) as i64;

    let window_height = rows / num_windows;
    let margin = margin as i64;

    for window in 0..num_windows {
        let y_low = rows - (window + 1) * window_height;
        let y_high = rows - window * window_height;

        for (base, found) in [(&mut left_base, &mut left), (&mut right_base, &mut right)]
            .iter_mut()
        {
            let lo = (**base - margin).max(0) as usize;
            let hi = (**base + margin).max(0).min(cols as i64) as usize;

            let mut in_window = Vec::new();
            for r in y_low..y_high {
                for c in lo..hi {
                    if mask[[r, c]] != 0 {
                        in_window.push(c);
                    }
                }
            }

            if in_window.len() > min_pix {
                **base = (in_window.iter().sum::<usize>() / in_window.len()) as i64;
            }

            found.extend(in_window);
        }
    }

    (left, right)
}

/// Lane geometry from the columns of the left and right lane pixels.
///
/// If either side is empty nothing is known about the lane.
pub fn geometry_from_columns(left: &[usize], right: &[usize], width: u32) -> LaneGeometry {
    match (mean(left), mean(right)) {
        (Some(l), Some(r)) => {
            LaneGeometry::new(normalised_offset((l + r) / 2.0, width), 0.0, CONFIDENCE_FULL)
        }
        _ => LaneGeometry::none(),
    }
}

/// Index of the first maximum, 0 for an empty slice.
fn argmax(values: &[u32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lane_det::CONFIDENCE_NONE;

    fn band_mask(rows: usize, cols: usize, bands: &[(usize, usize)]) -> Mask {
        Mask::from_shape_fn((rows, cols), |(_, c)| {
            bands.iter().any(|&(lo, hi)| c >= lo && c <= hi) as u8
        })
    }

    fn band_frame(bands: &[(u32, u32)], colour: Rgb<u8>) -> RgbImage {
        RgbImage::from_fn(640, 480, |x, _| {
            if bands.iter().any(|&(lo, hi)| x >= lo && x <= hi) {
                colour
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn test_reference_columns() {
        let left = vec![200; 10];
        let right = vec![800; 10];
        let g = geometry_from_columns(&left, &right, 640);
        assert!((g.offset_norm - 0.5625).abs() < 1e-12);
        assert_eq!(g.heading_rad, 0.0);
        assert_eq!(g.confidence, CONFIDENCE_FULL);

        assert_eq!(geometry_from_columns(&[], &right, 640), LaneGeometry::none());
    }

    #[test]
    fn test_sliding_window_bands() {
        let mask = band_mask(480, 640, &[(100, 110), (500, 510)]);
        let (left, right) = sliding_window(&mask, 12, 50, 50);

        assert_eq!(left.len(), 11 * 480);
        assert_eq!(right.len(), 11 * 480);

        let g = geometry_from_columns(&left, &right, 640);
        assert!((g.offset_norm - (305.0 - 320.0) / 320.0).abs() < 1e-12);
    }

    #[test]
    fn test_sliding_window_follows_curve() {
        // Band drifting right by 3 columns per row going up, still within the window margin
        let mask = Mask::from_shape_fn((480, 640), |(r, c)| {
            let centre = 100 + (479 - r) / 3;
            (c + 5 >= centre && c <= centre + 5) as u8
        });
        let (left, _) = sliding_window(&mask, 12, 50, 50);

        // Every pixel of the band is collected
        assert_eq!(left.len(), 11 * 480);
    }

    #[test]
    fn test_sliding_window_min_pix() {
        // One pixel per row, no window ever holds more than min_pix pixels so neither search moves
        let mask = Mask::from_shape_fn((480, 640), |(r, c)| (c == 100 + (479 - r)) as u8);
        let (left, right) = sliding_window(&mask, 12, 50, 50);
        assert_eq!(left.len(), 50);
        assert_eq!(right.len(), 100);
    }

    #[test]
    fn test_degenerate_masks() {
        assert_eq!(sliding_window(&Mask::zeros((0, 0)), 12, 50, 50), (vec![], vec![]));
        assert_eq!(sliding_window(&Mask::ones((5, 20)), 12, 50, 50), (vec![], vec![]));
    }

    #[test]
    fn test_blue_bands_frame() {
        let mut p = WindowPipeline::new(WindowParams::default(), true);
        let frame = band_frame(&[(100, 110), (500, 510)], Rgb([0, 0, 255]));

        let est = p.estimate(&frame);
        let g = est.geometry;
        assert_eq!(g.confidence, CONFIDENCE_FULL);
        assert!((g.offset_norm - (305.0 - 320.0) / 320.0).abs() < 5e-3);
        assert_eq!(g.heading_rad, 0.0);
        assert!(est.overlay.is_some());
    }

    #[test]
    fn test_single_band_has_no_confidence() {
        let mut p = WindowPipeline::new(WindowParams::default(), false);
        let frame = band_frame(&[(100, 110)], Rgb([0, 0, 255]));

        let est = p.estimate(&frame);
        assert_eq!(est.geometry, LaneGeometry::none());
        assert_eq!(p.report().right_pixels, 0);
    }

    #[test]
    fn test_wrong_colour_ignored() {
        let mut p = WindowPipeline::new(WindowParams::default(), false);
        let frame = band_frame(&[(100, 110), (500, 510)], Rgb([255, 255, 255]));
        assert_eq!(p.estimate(&frame).geometry.confidence, CONFIDENCE_NONE);
    }

    #[test]
    fn test_small_frame() {
        let mut p = WindowPipeline::new(WindowParams::default(), false);
        assert_eq!(p.estimate(&RgbImage::new(64, 8)).geometry, LaneGeometry::none());
        assert!(p.report().frame_too_small);
    }

    #[test]
    fn test_default_warp_corners() {
        let c = warp_corners(&WindowParams::default(), 640, 480);
        assert_eq!(c, [(0.0, 240.0), (0.0, 430.0), (640.0, 240.0), (640.0, 430.0)]);
    }

    #[test]
    fn test_degenerate_warp() {
        let params = WindowParams {
            warp_top_frac: 1.0,
            warp_bottom_margin_px: 0.0,
            ..WindowParams::default()
        };
        let mut p = WindowPipeline::new(params, true);
        let frame = band_frame(&[(100, 110), (500, 510)], Rgb([0, 0, 255]));

        let est = p.estimate(&frame);
        assert_eq!(est.geometry, LaneGeometry::none());
        assert!(est.overlay.is_none());
    }
}
