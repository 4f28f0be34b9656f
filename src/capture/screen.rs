//! Screen frame grabbing via `scrap`
//!
//! Captures the primary display. `scrap` hands back BGRA pixel data and may
//! report `WouldBlock` when no new frame is ready yet; that surfaces as a
//! transient grab failure the capture loop skips over.

use crate::capture::traits::{CaptureError, CaptureResult, Frame, FrameSource, PixelOrder};
use scrap::{Capturer, Display};

/// Frame source over the primary display
pub struct ScrapFrameSource {
    capturer: Capturer,
    width: u32,
    height: u32,
}

impl ScrapFrameSource {
    /// Open a capturer on the primary display
    pub fn new() -> CaptureResult<Self> {
        let display = Display::primary()
            .map_err(|e| CaptureError::Grab(format!("no primary display: {}", e)))?;
        let capturer = Capturer::new(display)
            .map_err(|e| CaptureError::Grab(format!("could not open capturer: {}", e)))?;
        let width = capturer.width() as u32;
        let height = capturer.height() as u32;

        tracing::debug!("scrap capturer opened: {}x{}", width, height);

        Ok(Self {
            capturer,
            width,
            height,
        })
    }

    /// Whether a display can be captured in this environment
    pub fn is_available() -> bool {
        Display::primary().is_ok()
    }
}

impl FrameSource for ScrapFrameSource {
    fn grab(&mut self) -> CaptureResult<Frame> {
        match self.capturer.frame() {
            Ok(pixels) => Ok(Frame {
                pixels: pixels.to_vec(),
                width: self.width,
                height: self.height,
                order: PixelOrder::Bgra,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(CaptureError::Grab("frame not ready".to_string()))
            }
            Err(e) => Err(CaptureError::Grab(e.to_string())),
        }
    }
}
