//! Recorder error types

use thiserror::Error;

/// Controller-level recording errors
///
/// Everything a caller can be handed back from start/stop; capture-internal
/// failures are handled inside the worker and surface only through status
/// reports, never as faults.
#[derive(Error, Debug)]
pub enum RecordingError {
    /// A session is already active; stop it before starting another
    #[error("already recording; stop the current recording first")]
    AlreadyActive,

    /// Stop or status requested with no session to act on
    #[error("no recording is currently active")]
    NotActive,

    /// Every candidate strategy failed to start
    #[error("no capture mechanism available: {hint}")]
    NoCaptureAvailable { hint: String },
}

/// Result type alias using RecordingError
pub type RecordingResult<T> = Result<T, RecordingError>;
