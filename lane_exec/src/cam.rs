//! # Frame sources
//!
//! The control loop pulls one frame per cycle from a [`FrameSource`]. Two sources are provided:
//! a directory of image files replayed in lexical order, used for offline runs, and a V4L2
//! camera (behind the `v4l` feature).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

#[cfg(feature = "v4l")]
use chrono::Utc;
#[cfg(feature = "v4l")]
use comms_if::eqpt::cam::{CamFrame, ImageFormat};
use comms_if::eqpt::cam::{CamError, CamImage, FrameSource};
use log::{debug, info};
use serde::Deserialize;
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// File extensions picked up by [`ImageDirSource`].
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Replays the images in a directory, in lexical order of their file names.
pub struct ImageDirSource {
    files: VecDeque<PathBuf>,
}

/// MJPG capture from a V4L2 camera.
#[cfg(feature = "v4l")]
pub struct V4lCamera {
    camera: rscam::Camera,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Frame source selection, from `lane_exec.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameSourceParams {
    /// Images from a directory
    ImageDir { path: PathBuf },

    /// A V4L2 camera device
    V4l {
        /// Device path, e.g. `/dev/video0`
        device: String,

        /// Units: pixels
        width: u32,

        /// Units: pixels
        height: u32,

        /// Units: frames per second
        fps: u32,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ImageDirSource {
    /// List the images in the given directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, CamError> {
        let dir = dir.as_ref();
        let dir_err = |e| CamError::DirError(dir.display().to_string(), e);

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(dir_err)? {
            let path = entry.map_err(dir_err)?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();

        info!("Replaying {} images from {:?}", files.len(), dir);

        Ok(Self {
            files: files.into(),
        })
    }

    /// Number of images not yet returned.
    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<CamImage>, CamError> {
        let path = match self.files.pop_front() {
            Some(p) => p,
            None => return Ok(None),
        };

        debug!("Loading frame {:?}", path);

        let image = image::open(&path).map_err(CamError::DecodeError)?.to_rgb8();

        Ok(Some(CamImage::now(image)))
    }
}

#[cfg(feature = "v4l")]
impl V4lCamera {
    /// Open the device and start streaming MJPG frames.
    pub fn open(device: &str, width: u32, height: u32, fps: u32) -> Result<Self, CamError> {
        let mut camera = rscam::Camera::new(device)
            .map_err(|e| CamError::OpenError(device.to_string(), e))?;

        camera
            .start(&rscam::Config {
                interval: (1, fps),
                resolution: (width, height),
                format: b"MJPG",
                ..Default::default()
            })
            .map_err(|e| CamError::StartError(e.to_string()))?;

        info!("Camera {} started at {}x{} {} fps", device, width, height, fps);

        Ok(Self { camera })
    }
}

#[cfg(feature = "v4l")]
impl FrameSource for V4lCamera {
    fn next_frame(&mut self) -> Result<Option<CamImage>, CamError> {
        let data = self.camera.capture().map_err(CamError::CaptureError)?;

        let frame = CamFrame {
            timestamp: Utc::now(),
            format: ImageFormat::Jpeg(100),
            data: data.to_vec(),
        };

        frame.to_cam_image().map(Some).map_err(CamError::DecodeError)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Open the configured frame source.
pub fn open_frame_source(
    params: &FrameSourceParams,
) -> Result<Box<dyn FrameSource>, CamError> {
    match params {
        FrameSourceParams::ImageDir { path } => {
            Ok(Box::new(ImageDirSource::new(sw_relative(path))?))
        }
        FrameSourceParams::V4l {
            device,
            width,
            height,
            fps,
        } => open_v4l(device, *width, *height, *fps),
    }
}

#[cfg(feature = "v4l")]
fn open_v4l(
    device: &str,
    width: u32,
    height: u32,
    fps: u32,
) -> Result<Box<dyn FrameSource>, CamError> {
    Ok(Box::new(V4lCamera::open(device, width, height, fps)?))
}

#[cfg(not(feature = "v4l"))]
fn open_v4l(
    device: &str,
    _width: u32,
    _height: u32,
    _fps: u32,
) -> Result<Box<dyn FrameSource>, CamError> {
    Err(CamError::StartError(format!(
        "cannot open {}, lane_exec was built without the v4l feature",
        device
    )))
}

/// Relative directories are taken from the software root when it is set.
fn sw_relative(path: &Path) -> PathBuf {
    match util::host::get_sw_root() {
        Ok(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_image_dir_lexical_order() {
        let dir = tempfile::tempdir().unwrap();

        // Widths identify the frames
        for (name, width) in [("b.png", 20), ("a.png", 10), ("c.bmp", 30)].iter() {
            RgbImage::from_pixel(*width, 8, Rgb([255, 255, 255]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let mut src = ImageDirSource::new(dir.path()).unwrap();
        assert_eq!(src.remaining(), 3);

        let widths: Vec<u32> = std::iter::from_fn(|| src.next_frame().unwrap())
            .map(|f| f.image.width())
            .collect();
        assert_eq!(widths, vec![10, 20, 30]);

        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_image_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame.png"), b"definitely not a png").unwrap();

        let mut src = ImageDirSource::new(dir.path()).unwrap();
        assert!(matches!(src.next_frame(), Err(CamError::DecodeError(_))));
    }

    #[test]
    fn test_missing_dir() {
        assert!(matches!(
            ImageDirSource::new("/definitely/not/a/frame/dir"),
            Err(CamError::DirError(_, _))
        ));
    }

    #[test]
    fn test_frame_source_params() {
        let p: FrameSourceParams = util::params::from_str(
            r#"
            kind = "v4l"
            device = "/dev/video0"
            width = 640
            height = 480
            fps = 30
            "#,
        )
        .unwrap();

        assert_eq!(
            p,
            FrameSourceParams::V4l {
                device: "/dev/video0".into(),
                width: 640,
                height: 480,
                fps: 30
            }
        );
    }
}
