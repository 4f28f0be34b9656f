//! Capture strategy selection
//!
//! Ordered fallback policy over the capture mechanisms available in the
//! environment. Capabilities are probed once at controller construction;
//! probing is read-only and launches nothing.

use super::state::CaptureStrategy;
use serde::{Deserialize, Serialize};

/// Environment capabilities relevant to strategy selection
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// A frame-grab backend can capture the screen
    pub frame_grab: bool,

    /// An encoder is available to compose frames into a video file
    pub encoder: bool,

    /// Key combinations can be injected into the desktop session
    pub input_injection: bool,

    /// An OS-native always-on recording overlay exists
    pub native_overlay: bool,
}

impl Capabilities {
    /// Probe the current environment
    pub fn probe() -> Self {
        let caps = Self {
            frame_grab: crate::capture::screen::ScrapFrameSource::is_available(),
            encoder: crate::capture::encoder::FfmpegSink::is_available(),
            input_injection: crate::capture::hotkey::EnigoCombo::is_available(),
            native_overlay: crate::capture::hotkey::GameBarOverlay::is_available(),
        };
        tracing::info!("Capture capabilities: {:?}", caps);
        caps
    }

    /// Whether hands-free software capture is possible
    pub fn software_ready(&self) -> bool {
        self.frame_grab && self.encoder
    }

    /// What to install or enable for software capture, if anything is missing
    pub fn install_hint(&self) -> Option<String> {
        if self.software_ready() {
            return None;
        }
        let mut missing = Vec::new();
        if !self.encoder {
            missing.push("ffmpeg");
        }
        if !self.frame_grab {
            missing.push("a capturable display");
        }
        Some(format!(
            "install {} and restart the backend",
            missing.join(" and ")
        ))
    }

    /// Capability summary for status reports
    pub fn report(&self) -> CapabilityReport {
        CapabilityReport {
            frame_grab: self.frame_grab,
            encoder: self.encoder,
            input_injection: self.input_injection,
            native_overlay: self.native_overlay,
            ready: self.software_ready(),
            install_hint: self.install_hint(),
        }
    }
}

/// Capability summary included in status reports, so a caller can explain
/// why only a degraded strategy was used
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityReport {
    pub frame_grab: bool,
    pub encoder: bool,
    pub input_injection: bool,
    pub native_overlay: bool,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_hint: Option<String>,
}

/// Ordered fallback policy over capture strategies
pub struct StrategySelector {
    caps: Capabilities,
}

impl StrategySelector {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }

    /// Candidate strategies in preference order.
    ///
    /// SoftwareCompose comes first: it yields a known, controller-owned
    /// artifact path and full start/stop control. NativeHotkey is degraded
    /// (optimistic reporting, unknown output path); ManualFallback only
    /// opens the recorder UI for the user.
    pub fn candidates(&self) -> Vec<CaptureStrategy> {
        let mut out = Vec::new();
        if self.caps.software_ready() {
            out.push(CaptureStrategy::SoftwareCompose);
        }
        if self.caps.input_injection && self.caps.native_overlay {
            out.push(CaptureStrategy::NativeHotkey);
        }
        if self.caps.native_overlay {
            out.push(CaptureStrategy::ManualFallback);
        }
        out
    }
}
