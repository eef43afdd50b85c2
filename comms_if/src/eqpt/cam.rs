//! # Camera Equipment Communications Module

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use image::{ImageResult, RgbImage};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A pull-based source of camera images.
///
/// The control loop blocks on [`FrameSource::next_frame`] once per cycle. `Ok(None)` means the
/// source is exhausted, which like an error ends the loop.
pub trait FrameSource {
    /// Acquire the next image from the source.
    fn next_frame(&mut self) -> Result<Option<CamImage>, CamError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An individual encoded frame from a camera
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CamFrame {
    /// UTC timestamp at which the frame was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// The format of this frame
    pub format: ImageFormat,

    /// The formatted image data
    pub data: Vec<u8>,
}

/// A decoded camera image.
///
/// Pixels are stored row-major in RGB order. An image is immutable once captured and owned by the
/// cycle that acquired it.
#[derive(Clone, Debug)]
pub struct CamImage {
    /// UTC timestamp at which the frame was acquired
    pub timestamp: DateTime<Utc>,

    /// The image itself
    pub image: RgbImage,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible formats for camera images. This is used rather than image::ImageFormat to:
///     1. Restrict the formats that can be sent back and forth
///     2. Allow serialisation as image::ImageFormat does not implement serde.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub enum ImageFormat {
    /// PNG image
    Png,

    /// JPEG image with a quality value between 1 and 100, where 100 is best.
    Jpeg(u8),
}

/// Errors which can occur while acquiring images.
#[derive(Debug, thiserror::Error)]
pub enum CamError {
    #[error("Could not open the camera device {0}: {1}")]
    OpenError(String, std::io::Error),

    #[error("Could not start the camera stream: {0}")]
    StartError(String),

    #[error("Could not capture a frame: {0}")]
    CaptureError(std::io::Error),

    #[error("Could not decode the frame: {0}")]
    DecodeError(image::ImageError),

    #[error("Could not read the image directory {0}: {1}")]
    DirError(String, std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CamFrame {
    /// Convert this camera frame into a camera image
    pub fn to_cam_image(&self) -> ImageResult<CamImage> {
        let format = match self.format {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg(_) => image::ImageFormat::Jpeg,
        };

        let image = image::load_from_memory_with_format(&self.data, format)?.to_rgb8();

        Ok(CamImage {
            timestamp: self.timestamp,
            image,
        })
    }
}

impl CamImage {
    /// Create a new image stamped with the current time.
    pub fn now(image: RgbImage) -> Self {
        Self {
            timestamp: Utc::now(),
            image,
        }
    }

    /// Width of the image in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height of the image in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{DynamicImage, Rgb};

    #[test]
    fn test_png_frame_conversion() {
        let mut img = RgbImage::new(8, 4);
        img.put_pixel(3, 2, Rgb([10, 200, 30]));

        let mut data = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut data, image::ImageOutputFormat::Png)
            .unwrap();

        let frame = CamFrame {
            timestamp: Utc::now(),
            format: ImageFormat::Png,
            data,
        };

        let decoded = frame.to_cam_image().unwrap();
        assert_eq!(decoded.width(), 8);
        assert_eq!(decoded.height(), 4);
        assert_eq!(decoded.image.get_pixel(3, 2), &Rgb([10, 200, 30]));
        assert_eq!(decoded.timestamp, frame.timestamp);
    }

    #[test]
    fn test_corrupt_frame() {
        let frame = CamFrame {
            timestamp: Utc::now(),
            format: ImageFormat::Jpeg(90),
            data: vec![0, 1, 2, 3],
        };
        assert!(frame.to_cam_image().is_err());
    }
}
