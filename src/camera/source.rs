use std::path::PathBuf;

use crate::error::HardwareError;

/// Capture capability of the attached camera.
///
/// `capture_frame` may block on the device; callers run it off the async executor.
pub trait FrameSource: Send + Sync {
    fn is_available(&self) -> bool;
    fn capture_frame(&self) -> Result<Vec<u8>, HardwareError>;
}

/// Stand-in camera that "captures" an encoded still image from disk.
pub struct StillImageFrameSource {
    path: Option<PathBuf>,
}

impl StillImageFrameSource {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl FrameSource for StillImageFrameSource {
    fn is_available(&self) -> bool {
        self.path.as_ref().is_some_and(|path| path.is_file())
    }

    fn capture_frame(&self) -> Result<Vec<u8>, HardwareError> {
        let path = self.path.as_ref().ok_or(HardwareError::NotAvailable)?;
        let bytes = std::fs::read(path)
            .map_err(|err| HardwareError::CaptureFailed(format!("{}: {err}", path.display())))?;
        if bytes.is_empty() {
            return Err(HardwareError::CaptureFailed("camera returned an empty frame".into()));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Mutex;

    use image::{DynamicImage, GrayImage, ImageFormat, Luma};

    use super::*;

    pub fn encode_png(image: GrayImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Sharp mid-tone frame that passes the default thresholds.
    pub fn sharp_frame() -> Vec<u8> {
        encode_png(GrayImage::from_fn(64, 64, |x, y| {
            Luma([if (x / 8 + y / 8) % 2 == 0 { 60 } else { 160 }])
        }))
    }

    pub fn uniform_frame(value: u8) -> Vec<u8> {
        encode_png(GrayImage::from_pixel(64, 64, Luma([value])))
    }

    /// Camera returning queued frames, then `sharp_frame()`.
    #[derive(Default)]
    pub struct ScriptedCamera {
        frames: Mutex<VecDeque<Vec<u8>>>,
        unplugged: bool,
    }

    impl ScriptedCamera {
        pub fn unplugged() -> Self {
            Self {
                unplugged: true,
                ..Self::default()
            }
        }

        pub fn queue(&self, frame: Vec<u8>) {
            self.frames.lock().unwrap().push_back(frame);
        }
    }

    impl FrameSource for ScriptedCamera {
        fn is_available(&self) -> bool {
            !self.unplugged
        }

        fn capture_frame(&self) -> Result<Vec<u8>, HardwareError> {
            if self.unplugged {
                return Err(HardwareError::NotAvailable);
            }
            Ok(self
                .frames
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(sharp_frame))
        }
    }
}
