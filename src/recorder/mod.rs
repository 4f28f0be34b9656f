//! Recording subsystem
//!
//! This module implements the screen-recording architecture:
//! - RecordingController: public start/stop/status state machine
//! - StrategySelector: ordered fallback over capture mechanisms
//! - CaptureLoop: fixed-period frame capture worker

pub mod controller;
pub mod error;
pub mod state;
pub mod strategy;
pub mod worker;

pub use controller::{CaptureBackends, RecordingController};
pub use error::{RecordingError, RecordingResult};
pub use state::{CaptureStrategy, RecorderConfig, StartOutcome, StatusReport, StopOutcome};
pub use strategy::{Capabilities, CapabilityReport, StrategySelector};
