//! Capture trait definitions
//!
//! Backend-agnostic contracts for grabbing screen frames, appending them to
//! a video artifact on disk, and driving the OS-native recorder.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Capture-side errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("frame grab failed: {0}")]
    Grab(String),

    #[error("could not open capture writer: {0}")]
    SinkOpen(String),

    #[error("could not append frame: {0}")]
    SinkWrite(String),

    #[error("could not close capture writer: {0}")]
    SinkClose(String),

    #[error("input injection failed: {0}")]
    Injection(String),

    #[error("could not open recorder overlay: {0}")]
    Overlay(String),
}

/// Result type alias for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Channel order of a frame's pixel bytes (4 bytes per pixel)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Rgba,
    Bgra,
}

/// One captured screen frame
///
/// Owned by the capture cycle that grabbed it; handed to the sink and then
/// dropped. No other component holds frames.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel bytes, 4 per pixel in `order`
    pub pixels: Vec<u8>,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Channel order of `pixels`
    pub order: PixelOrder,
}

impl Frame {
    /// Reorder the red/blue channels in place so the frame matches `target`.
    ///
    /// This is the only image-format adaptation the capture path performs;
    /// grab backends and sinks otherwise must agree on 4-byte pixels.
    pub fn convert_to(&mut self, target: PixelOrder) {
        if self.order == target {
            return;
        }
        for px in self.pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        self.order = target;
    }
}

/// A source of screen frames
///
/// Implementations may be bound to the thread that created them; the capture
/// worker constructs its source via a factory and never moves it across
/// threads. Successive grabs are not guaranteed to return identical
/// dimensions (live display-mode changes).
pub trait FrameSource {
    /// Grab the current screen contents
    fn grab(&mut self) -> CaptureResult<Frame>;
}

/// Destination for captured frames
///
/// Opened once with known dimensions and frame rate, then appended to, then
/// closed. `close` must be idempotent and must release any OS handle it
/// holds.
pub trait CaptureSink: Send {
    /// Open the sink for writing at the given geometry and rate
    fn open(&mut self, path: &Path, width: u32, height: u32, fps: u32) -> CaptureResult<()>;

    /// Append one frame; the frame is already in `pixel_order()`
    fn append(&mut self, frame: &Frame) -> CaptureResult<()>;

    /// Close the sink, flushing the artifact. Safe to call more than once.
    fn close(&mut self) -> CaptureResult<()>;

    /// Channel order this sink expects appended frames in
    fn pixel_order(&self) -> PixelOrder {
        PixelOrder::Rgba
    }

    /// File extension for artifacts produced by this sink
    fn extension(&self) -> &'static str {
        "mp4"
    }
}

/// Fire-and-forget key-combination injection toward the OS recorder
///
/// No confirmation of the downstream effect is available; callers that rely
/// on it report state optimistically.
#[async_trait]
pub trait ComboInjector: Send + Sync {
    /// Send the recorder toggle combination
    async fn send_combo(&self) -> CaptureResult<()>;
}

/// Opens the OS-native recorder UI for manual operation
pub trait OverlayLauncher: Send + Sync {
    fn open_overlay(&self) -> CaptureResult<()>;
}
