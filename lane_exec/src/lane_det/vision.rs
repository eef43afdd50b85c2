//! # Image processing primitives
//!
//! The image operations used by the lane detection pipelines. Colour and grayscale images are
//! `image` buffers and the filtering, edge detection, warping and drawing is done by `imageproc`.
//! Binary masks are `ndarray::Array2<u8>` indexed `[row, col]` and contain only 0 and 1, which is
//! the form the region of interest, Hough transform and sliding window search work on.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{imageops, GrayImage, Rgb, RgbImage};
use imageproc::{
    drawing::draw_line_segment_mut,
    edges,
    filter::gaussian_blur_f32,
    geometric_transformations::{warp, Interpolation, Projection},
    map::map_colors2,
};
use ndarray::Array2;
use serde::Serialize;
use std::f64::consts::PI;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Binary image with values in {0, 1}, indexed `[row, col]`.
pub type Mask = Array2<u8>;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Standard deviation of the blur applied to a frame before edge detection, equivalent to a 5x5
/// Gaussian kernel.
pub const EDGE_BLUR_SIGMA: f32 = 1.1;

/// Fixed point shift used when walking along a detected line.
const LINE_WALK_SHIFT: u32 = 16;

/// Lines are only drawn if both ends lie within this many image sizes of the image.
const DRAW_REACH: f64 = 8.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A line segment in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Parameters of the probabilistic Hough transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughParams {
    /// Distance resolution of the accumulator.
    ///
    /// Units: pixels
    pub rho_px: f64,

    /// Angle resolution of the accumulator.
    ///
    /// Units: radians
    pub theta_rad: f64,

    /// Minimum number of votes before a line is extracted.
    pub threshold: u32,

    /// Minimum extent of an accepted segment along either axis.
    ///
    /// Units: pixels
    pub min_line_length_px: u32,

    /// Largest run of missing pixels bridged while following a line.
    ///
    /// Units: pixels
    pub max_line_gap_px: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LineSegment {
    /// Slope `dy/dx` of the segment, `None` for vertical segments.
    pub fn slope(&self) -> Option<f64> {
        if self.x2 == self.x1 {
            None
        } else {
            Some((self.y2 - self.y1) as f64 / (self.x2 - self.x1) as f64)
        }
    }

    /// Euclidian length of the segment.
    pub fn length(&self) -> f64 {
        (((self.x2 - self.x1) as f64).powi(2) + ((self.y2 - self.y1) as f64).powi(2)).sqrt()
    }
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            rho_px: 2.0,
            theta_rad: PI / 180.0,
            threshold: 100,
            min_line_length_px: 40,
            max_line_gap_px: 5,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Edge mask of a colour frame: grayscale, Gaussian blur then Canny edge detection.
pub fn edge_mask(frame: &RgbImage, low: f64, high: f64) -> Mask {
    let gray = imageops::grayscale(frame);
    canny(&gaussian_blur_f32(&gray, EDGE_BLUR_SIGMA), low, high)
}

/// Canny edge detection with hysteresis thresholds on the Sobel gradient magnitude.
///
/// The outermost row and column never contain edges. Thresholds which are not ordered give an
/// empty mask.
pub fn canny(gray: &GrayImage, low: f64, high: f64) -> Mask {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 || !(low >= 0.0 && low <= high) {
        return Mask::zeros((height as usize, width as usize));
    }

    to_mask(&edges::canny(gray, low as f32, high as f32))
}

/// Mask of the nonzero pixels of a grayscale image.
pub fn to_mask(gray: &GrayImage) -> Mask {
    let (width, height) = gray.dimensions();

    Array2::from_shape_fn((height as usize, width as usize), |(r, c)| {
        (gray.get_pixel(c as u32, r as u32)[0] != 0) as u8
    })
}

/// Zero everything outside a trapezoidal region of interest.
///
/// The region spans from row `top_frac * rows` to the bottom of the image. Its left and right
/// sides are inset by `top_inset_frac * cols` at the top row and `bottom_inset_frac * cols` at the
/// bottom row, interpolating linearly in between.
pub fn apply_roi(mask: &mut Mask, top_frac: f64, top_inset_frac: f64, bottom_inset_frac: f64) {
    let (rows, cols) = mask.dim();
    if rows == 0 || cols == 0 {
        return;
    }

    let top_row = ((rows as f64 * top_frac) as usize).min(rows);

    for r in 0..rows {
        if r < top_row {
            mask.row_mut(r).fill(0);
            continue;
        }

        let t = if rows - 1 > top_row {
            (r - top_row) as f64 / (rows - 1 - top_row) as f64
        } else {
            1.0
        };
        let inset = (top_inset_frac + (bottom_inset_frac - top_inset_frac) * t) * cols as f64;
        let first = inset.max(0.0).ceil() as usize;
        let last = cols as f64 - inset;

        for c in 0..cols {
            if c < first || c as f64 > last {
                mask[[r, c]] = 0;
            }
        }
    }
}

/// Progressive probabilistic Hough transform.
///
/// Edge pixels are visited in row-major order, so the result is deterministic. Each pixel votes in
/// the accumulator; once a bin reaches the threshold the corresponding line is followed through
/// the mask in both directions, bridging gaps of up to `max_line_gap_px`. Pixels on the followed
/// line are removed from the mask, and if the line is long enough their votes are withdrawn and the
/// segment is returned.
pub fn hough_lines_p(edges: &Mask, params: &HoughParams) -> Vec<LineSegment> {
    let (rows, cols) = edges.dim();
    let mut lines = Vec::new();

    if rows == 0 || cols == 0 || !(params.rho_px > 0.0) || !(params.theta_rad > 0.0) {
        return lines;
    }

    let irho = 1.0 / params.rho_px;
    let num_angle = ((PI / params.theta_rad).round() as usize).max(1);
    let num_rho = (((cols + rows) * 2 + 1) as f64 / params.rho_px).round() as usize;
    let rho_offset = (num_rho as i64 - 1) / 2;

    let trig: Vec<(f64, f64)> = (0..num_angle)
        .map(|n| {
            let a = n as f64 * params.theta_rad;
            (a.cos() * irho, a.sin() * irho)
        })
        .collect();

    let rho_bin = |n: usize, x: usize, y: usize| -> Option<usize> {
        let r = (x as f64 * trig[n].0 + y as f64 * trig[n].1).round() as i64 + rho_offset;
        if r >= 0 && (r as usize) < num_rho {
            Some(r as usize)
        } else {
            None
        }
    };

    let mut accum = Array2::<i32>::zeros((num_angle, num_rho));
    let mut mask = edges.mapv(|v| (v != 0) as u8);
    let threshold = params.threshold as i32;
    let min_len = params.min_line_length_px as i64;

    let points: Vec<(usize, usize)> = mask
        .indexed_iter()
        .filter(|(_, v)| **v != 0)
        .map(|((r, c), _)| (r, c))
        .collect();

    for &(y, x) in points.iter() {
        // Already consumed by a previous line
        if mask[[y, x]] == 0 {
            continue;
        }

        let mut max_val = threshold - 1;
        let mut max_n = 0;
        for n in 0..num_angle {
            if let Some(r) = rho_bin(n, x, y) {
                accum[[n, r]] += 1;
                if accum[[n, r]] > max_val {
                    max_val = accum[[n, r]];
                    max_n = n;
                }
            }
        }

        if max_val < threshold {
            continue;
        }

        // Direction of the line, stepping one pixel along the major axis per iteration with the
        // minor axis in fixed point.
        let a = -trig[max_n].1;
        let b = trig[max_n].0;
        let (mut x0, mut y0) = (x as i64, y as i64);
        let (dx0, dy0, x_major);
        if a.abs() > b.abs() {
            x_major = true;
            dx0 = if a > 0.0 { 1 } else { -1 };
            dy0 = (b * (1i64 << LINE_WALK_SHIFT) as f64 / a.abs()).round() as i64;
            y0 = (y0 << LINE_WALK_SHIFT) + (1 << (LINE_WALK_SHIFT - 1));
        } else {
            x_major = false;
            dy0 = if b > 0.0 { 1 } else { -1 };
            dx0 = (a * (1i64 << LINE_WALK_SHIFT) as f64 / b.abs()).round() as i64;
            x0 = (x0 << LINE_WALK_SHIFT) + (1 << (LINE_WALK_SHIFT - 1));
        }

        let to_pixel = |px: i64, py: i64| -> Option<(usize, usize)> {
            let (j, i) = if x_major {
                (px, py >> LINE_WALK_SHIFT)
            } else {
                (px >> LINE_WALK_SHIFT, py)
            };
            if j < 0 || i < 0 || j >= cols as i64 || i >= rows as i64 {
                None
            } else {
                Some((j as usize, i as usize))
            }
        };

        let mut line_end = [(x, y); 2];
        for (k, end) in line_end.iter_mut().enumerate() {
            let (dx, dy) = if k == 0 { (dx0, dy0) } else { (-dx0, -dy0) };
            let (mut px, mut py) = (x0, y0);
            let mut gap = 0;

            while let Some((j, i)) = to_pixel(px, py) {
                if mask[[i, j]] != 0 {
                    gap = 0;
                    *end = (j, i);
                } else {
                    gap += 1;
                    if gap > params.max_line_gap_px {
                        break;
                    }
                }
                px += dx;
                py += dy;
            }
        }

        let good_line = (line_end[1].0 as i64 - line_end[0].0 as i64).abs() >= min_len
            || (line_end[1].1 as i64 - line_end[0].1 as i64).abs() >= min_len;

        for (k, &end) in line_end.iter().enumerate() {
            let (dx, dy) = if k == 0 { (dx0, dy0) } else { (-dx0, -dy0) };
            let (mut px, mut py) = (x0, y0);

            while let Some((j, i)) = to_pixel(px, py) {
                if mask[[i, j]] != 0 {
                    if good_line {
                        for n in 0..num_angle {
                            if let Some(r) = rho_bin(n, j, i) {
                                accum[[n, r]] -= 1;
                            }
                        }
                    }
                    mask[[i, j]] = 0;
                }

                if (j, i) == end {
                    break;
                }
                px += dx;
                py += dy;
            }
        }

        if good_line {
            lines.push(LineSegment {
                x1: line_end[0].0 as i32,
                y1: line_end[0].1 as i32,
                x2: line_end[1].0 as i32,
                y2: line_end[1].1 as i32,
            });
        }
    }

    lines
}

/// Convert an RGB pixel to HSV on the 8 bit scale: hue in [0, 180), saturation and value in
/// [0, 255].
pub fn rgb_to_hsv(Rgb([r, g, b]): Rgb<u8>) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = (max - min) as f64;

    let s = if max == 0 {
        0.0
    } else {
        255.0 * diff / max as f64
    };

    let (r, g, b) = (r as f64, g as f64, b as f64);
    let mut h = if diff == 0.0 {
        0.0
    } else if max as f64 == r {
        60.0 * (g - b) / diff
    } else if max as f64 == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = (h / 2.0).round() as u32 % 180;

    [h as u8, s.round() as u8, max]
}

/// Threshold an image in HSV space, inclusive of both bounds on every channel.
pub fn hsv_in_range(img: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> Mask {
    let (width, height) = img.dimensions();

    Array2::from_shape_fn((height as usize, width as usize), |(r, c)| {
        let hsv = rgb_to_hsv(*img.get_pixel(c as u32, r as u32));
        let inside = (0..3).all(|i| hsv[i] >= lower[i] && hsv[i] <= upper[i]);
        inside as u8
    })
}

/// Perspective transform taking each of the `from` points onto the matching `to` point.
///
/// Returns `None` if the points are degenerate (e.g. three of them are collinear).
pub fn perspective(from: &[(f64, f64); 4], to: &[(f64, f64); 4]) -> Option<Projection> {
    if has_collinear_triple(from) || has_collinear_triple(to) {
        return None;
    }

    Projection::from_control_points(to_f32(from), to_f32(to))
}

/// Map a point through a transform, `None` if it maps to infinity.
pub fn project(projection: &Projection, (x, y): (f64, f64)) -> Option<(f64, f64)> {
    let (u, v) = *projection * (x as f32, y as f32);

    if u.is_finite() && v.is_finite() {
        Some((u as f64, v as f64))
    } else {
        None
    }
}

/// Warp an image through `projection`, sampling the nearest source pixel. Pixels with no source
/// are black.
pub fn warp_nearest(src: &RgbImage, projection: &Projection) -> RgbImage {
    warp(src, projection, Interpolation::Nearest, Rgb([0, 0, 0]))
}

/// Draw a line `thickness` pixels wide as parallel one pixel lines.
///
/// Lines with an end which is not finite or lies far outside the image are not drawn.
pub fn draw_line(
    img: &mut RgbImage,
    from: (f64, f64),
    to: (f64, f64),
    colour: Rgb<u8>,
    thickness: u32,
) {
    let (width, height) = (img.width() as f64, img.height() as f64);
    let reachable = |(x, y): (f64, f64)| {
        x.is_finite()
            && y.is_finite()
            && x.abs() <= width * (DRAW_REACH + 1.0)
            && y.abs() <= height * (DRAW_REACH + 1.0)
    };

    if width == 0.0 || height == 0.0 || !reachable(from) || !reachable(to) {
        return;
    }

    // Offset across the line's minor axis
    let steep = (to.1 - from.1).abs() > (to.0 - from.0).abs();
    let thickness = thickness.max(1) as i64;

    for i in 0..thickness {
        let d = (i - (thickness - 1) / 2) as f64;
        let (ox, oy) = if steep { (d, 0.0) } else { (0.0, d) };

        draw_line_segment_mut(
            img,
            ((from.0 + ox) as f32, (from.1 + oy) as f32),
            ((to.0 + ox) as f32, (to.1 + oy) as f32),
            colour,
        );
    }
}

/// Saturating weighted sum of two images of the same size: `a * alpha + b * beta`.
pub fn add_weighted(a: &RgbImage, alpha: f64, b: &RgbImage, beta: f64) -> RgbImage {
    map_colors2(a, b, |pa, pb| {
        let mut out = [0u8; 3];
        for i in 0..3 {
            out[i] = (pa[i] as f64 * alpha + pb[i] as f64 * beta)
                .round()
                .max(0.0)
                .min(255.0) as u8;
        }
        Rgb(out)
    })
}

fn to_f32(pts: &[(f64, f64); 4]) -> [(f32, f32); 4] {
    let mut out = [(0.0, 0.0); 4];
    for (o, p) in out.iter_mut().zip(pts.iter()) {
        *o = (p.0 as f32, p.1 as f32);
    }
    out
}

/// Returns true if any three of the points lie on one line.
fn has_collinear_triple(pts: &[(f64, f64); 4]) -> bool {
    let triples = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];

    triples.iter().any(|&(i, j, k)| {
        let (p, q, r) = (pts[i], pts[j], pts[k]);
        let cross = (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0);
        cross.abs() < 1e-9
    })
}
