//! Recorder configuration and caller-facing result types
//!
//! The outcome structs mirror what the HTTP layer serializes back to the
//! client: a success flag, a human-readable message, and strategy-specific
//! fields (`file`, `method`, `recording`, `duration`).

use super::strategy::CapabilityReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which capture mechanism is in effect for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureStrategy {
    /// Software capture loop composing grabbed frames into a
    /// controller-owned artifact; full start/stop control
    SoftwareCompose,

    /// OS-native recorder toggled by a hotkey; output location unknown and
    /// the true recorder state is not observable
    NativeHotkey,

    /// Recorder UI opened for the user to start capture themselves
    ManualFallback,
}

/// Configuration for the recording controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Directory recordings are saved to; defaults to the desktop
    pub output_dir: Option<PathBuf>,

    /// Target capture rate; modest by default to bound CPU/disk cost
    pub fps: u32,

    /// Bounded wait for the worker to acknowledge a stop, in seconds
    pub stop_wait_secs: u64,

    /// Consecutive grab failures tolerated before the loop aborts
    pub max_consecutive_grab_failures: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            fps: 10,
            stop_wait_secs: 5,
            max_consecutive_grab_failures: 30,
        }
    }
}

impl RecorderConfig {
    pub(crate) fn stop_wait(&self) -> Duration {
        Duration::from_secs(self.stop_wait_secs)
    }

    /// Resolve the directory recordings are written to
    pub(crate) fn resolve_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .or_else(dirs::desktop_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Result of a start request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub success: bool,

    /// Whether a recording is (believed to be) running after this call.
    /// False for the manual fallback, which only opens the recorder UI.
    pub recording: bool,

    pub message: String,

    /// Artifact path, when the controller owns the output file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    pub method: CaptureStrategy,
}

/// Result of a stop request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOutcome {
    pub success: bool,

    pub recording: bool,

    pub message: String,

    /// Artifact path, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Snapshot of recorder state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub success: bool,

    pub recording: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Elapsed time since the recording started, formatted `MM:SS`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<CaptureStrategy>,

    /// Failure reason of the most recent session that died on its own;
    /// retained until a new session overwrites it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub capabilities: CapabilityReport,
}

/// Format an elapsed duration as `MM:SS`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
