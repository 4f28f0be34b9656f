//! Deskrec - screen recording for a voice-driven desktop automation backend.
//!
//! The surrounding backend exposes voice/text actions (apps, browsing, TTS,
//! system queries) over HTTP; this crate owns the screen-recording subsystem
//! behind those routes. A `RecordingController` picks a capture strategy,
//! supervises at most one capture worker at a time, and answers start, stop
//! and status requests with typed outcomes the HTTP layer serializes as-is.

pub mod capture;
pub mod recorder;

pub use recorder::controller::{CaptureBackends, RecordingController};
pub use recorder::error::{RecordingError, RecordingResult};
pub use recorder::state::{
    CaptureStrategy, RecorderConfig, StartOutcome, StatusReport, StopOutcome,
};
pub use recorder::strategy::{Capabilities, CapabilityReport, StrategySelector};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for binaries embedding the controller
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deskrec=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
