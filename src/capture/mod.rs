//! Screen capture backends
//!
//! Frame grabbing, encoding, and native-recorder control used by the
//! recording strategies.

pub mod encoder;
pub mod hotkey;
pub mod screen;
pub mod traits;

// Re-export the boundary contracts
pub use traits::{
    CaptureError, CaptureResult, CaptureSink, ComboInjector, Frame, FrameSource, OverlayLauncher,
    PixelOrder,
};
