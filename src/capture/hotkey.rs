//! Native recorder control
//!
//! The OS recording overlay (Windows Game Bar) is toggled by Win+Alt+R; the
//! same combination starts and stops it. `EnigoCombo` injects that toggle,
//! `GameBarOverlay` opens the overlay UI for manual operation.

use crate::capture::traits::{CaptureError, CaptureResult, ComboInjector, OverlayLauncher};
use async_trait::async_trait;

/// Injects the recorder toggle combination using enigo
pub struct EnigoCombo;

impl EnigoCombo {
    pub fn new() -> Self {
        Self
    }

    /// Whether input injection works in this environment
    pub fn is_available() -> bool {
        use enigo::{Enigo, Settings};
        Enigo::new(&Settings::default()).is_ok()
    }
}

impl Default for EnigoCombo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComboInjector for EnigoCombo {
    async fn send_combo(&self) -> CaptureResult<()> {
        // enigo operations are blocking, so run in spawn_blocking
        tokio::task::spawn_blocking(|| {
            use enigo::{
                Direction::{Click, Press, Release},
                Enigo, Key, Keyboard, Settings,
            };

            let mut enigo = Enigo::new(&Settings::default())
                .map_err(|e| CaptureError::Injection(format!("failed to create enigo: {}", e)))?;

            enigo
                .key(Key::Meta, Press)
                .and_then(|_| enigo.key(Key::Alt, Press))
                .and_then(|_| enigo.key(Key::Unicode('r'), Click))
                .and_then(|_| enigo.key(Key::Alt, Release))
                .and_then(|_| enigo.key(Key::Meta, Release))
                .map_err(|e| CaptureError::Injection(format!("failed to send combo: {}", e)))
        })
        .await
        .map_err(|e| CaptureError::Injection(format!("task join error: {}", e)))?
    }
}

/// Opens the Windows Game Bar overlay UI
pub struct GameBarOverlay;

impl GameBarOverlay {
    /// Whether a native always-on recording overlay exists on this platform
    pub fn is_available() -> bool {
        cfg!(target_os = "windows")
    }
}

impl OverlayLauncher for GameBarOverlay {
    fn open_overlay(&self) -> CaptureResult<()> {
        #[cfg(target_os = "windows")]
        {
            std::process::Command::new("explorer")
                .arg("ms-gamingoverlay://")
                .spawn()
                .map(|_| ())
                .map_err(|e| CaptureError::Overlay(e.to_string()))
        }

        #[cfg(not(target_os = "windows"))]
        {
            Err(CaptureError::Overlay(
                "no native recording overlay on this platform".to_string(),
            ))
        }
    }
}
