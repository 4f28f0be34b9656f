//! Recording controller
//!
//! The public-facing state machine over the capture strategies: starts at
//! most one capture worker at a time, tracks session metadata, and answers
//! stop and status requests. The controller is the single source of truth
//! for "is a recording active".

use super::error::{RecordingError, RecordingResult};
use super::state::{
    format_elapsed, CaptureStrategy, RecorderConfig, StartOutcome, StatusReport, StopOutcome,
};
use super::strategy::{Capabilities, StrategySelector};
use super::worker::{CaptureLoop, LoopOutcome, SessionLive};
use crate::capture::encoder::FfmpegSink;
use crate::capture::hotkey::{EnigoCombo, GameBarOverlay};
use crate::capture::screen::ScrapFrameSource;
use crate::capture::traits::{CaptureError, CaptureSink, ComboInjector, FrameSource, OverlayLauncher};
use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// Constructs a frame source on the worker thread.
///
/// Frame sources may be thread-bound, so they are built inside the capture
/// worker rather than handed across.
pub type SourceFactory = Arc<dyn Fn() -> Result<Box<dyn FrameSource>, CaptureError> + Send + Sync>;

/// Constructs a capture sink per recording
pub type SinkFactory = Arc<dyn Fn() -> Box<dyn CaptureSink> + Send + Sync>;

/// The capture backends the controller drives
pub struct CaptureBackends {
    pub source: SourceFactory,
    pub sink: SinkFactory,
    pub combo: Arc<dyn ComboInjector>,
    pub overlay: Arc<dyn OverlayLauncher>,
}

impl CaptureBackends {
    /// Production wiring: scrap grabber, ffmpeg encoder, enigo hotkey
    /// injection, Game Bar overlay
    pub fn native() -> Self {
        Self {
            source: Arc::new(|| {
                ScrapFrameSource::new().map(|s| Box::new(s) as Box<dyn FrameSource>)
            }),
            sink: Arc::new(|| Box::new(FfmpegSink::new()) as Box<dyn CaptureSink>),
            combo: Arc::new(EnigoCombo::new()),
            overlay: Arc::new(GameBarOverlay),
        }
    }
}

/// One in-progress (or just-finished) recording attempt
struct ActiveSession {
    /// Session id for log correlation
    id: Uuid,

    strategy: CaptureStrategy,

    /// Destination file; never changes once set. Absent for strategies
    /// whose output location is unknown.
    artifact: Option<PathBuf>,

    started_at: DateTime<Utc>,

    /// Monotonic counterpart of `started_at`, used for elapsed time
    started: Instant,

    /// Shared flags with the capture loop; SoftwareCompose only
    live: Option<Arc<SessionLive>>,

    /// Handle to the running loop; SoftwareCompose only
    worker: Option<tokio::task::JoinHandle<LoopOutcome>>,
}

impl ActiveSession {
    /// Whether this session still counts as recording
    fn is_recording(&self) -> bool {
        match self.strategy {
            CaptureStrategy::SoftwareCompose => self
                .live
                .as_ref()
                .map(|live| !live.is_finished())
                .unwrap_or(false),
            // The toggle was sent; the true recorder state is not observable
            CaptureStrategy::NativeHotkey => true,
            CaptureStrategy::ManualFallback => false,
        }
    }
}

/// Manages the recording lifecycle across capture strategies
pub struct RecordingController {
    config: RecorderConfig,
    backends: CaptureBackends,
    capabilities: Capabilities,

    /// Serializes start/stop so only one transition is in flight
    ops: Mutex<()>,

    /// Published session state; the only thing status() reads
    session: RwLock<Option<ActiveSession>>,

    /// Failure reason of the most recently failed session
    last_failure: RwLock<Option<String>>,
}

impl RecordingController {
    pub fn new(config: RecorderConfig, backends: CaptureBackends, capabilities: Capabilities) -> Self {
        Self {
            config,
            backends,
            capabilities,
            ops: Mutex::new(()),
            session: RwLock::new(None),
            last_failure: RwLock::new(None),
        }
    }

    /// Controller wired to the native capture backends, probing the
    /// environment's capabilities once
    pub fn native(config: RecorderConfig) -> Self {
        Self::new(config, CaptureBackends::native(), Capabilities::probe())
    }

    /// Start a recording using the first strategy that works.
    ///
    /// Returns once the chosen mechanism is confirmed launched (for
    /// software capture: writer opened and first frame accepted), not when
    /// the recording finishes.
    pub async fn start(&self) -> RecordingResult<StartOutcome> {
        let _ops = self.ops.lock().await;

        // Reap a worker that already wound down on its own
        {
            let mut session = self.session.write();
            if let Some(current) = session.as_ref() {
                if current.is_recording() {
                    return Err(RecordingError::AlreadyActive);
                }
                if let Some(reason) = current.live.as_ref().and_then(|live| live.failure()) {
                    *self.last_failure.write() = Some(reason);
                }
                tracing::debug!(session = %current.id, "clearing finished session");
                *session = None;
            }
        }

        let candidates = StrategySelector::new(self.capabilities).candidates();
        if candidates.is_empty() {
            return Err(self.no_capture());
        }

        for strategy in candidates {
            let attempt = match strategy {
                CaptureStrategy::SoftwareCompose => self.start_software().await,
                CaptureStrategy::NativeHotkey => self.start_native_hotkey().await,
                CaptureStrategy::ManualFallback => self.start_manual(),
            };
            match attempt {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    tracing::warn!("{:?} strategy failed: {}, trying next", strategy, e);
                }
            }
        }

        Err(self.no_capture())
    }

    /// Stop the active recording and clear the session.
    ///
    /// For software capture this waits (bounded by the configured stop
    /// wait) for the worker to flush the artifact; on timeout the session
    /// is cleared anyway and the worker winds down detached.
    pub async fn stop(&self) -> RecordingResult<StopOutcome> {
        let _ops = self.ops.lock().await;

        let (id, strategy, artifact, live, worker) = {
            let mut session = self.session.write();
            let Some(current) = session.as_mut() else {
                return Err(RecordingError::NotActive);
            };
            (
                current.id,
                current.strategy,
                current.artifact.clone(),
                current.live.clone(),
                current.worker.take(),
            )
        };

        let outcome = match strategy {
            CaptureStrategy::SoftwareCompose => {
                self.stop_software(id, artifact, live, worker).await
            }
            CaptureStrategy::NativeHotkey => {
                // The identical combo that started the native recorder
                // toggles it off
                if let Err(e) = self.backends.combo.send_combo().await {
                    tracing::warn!("stop toggle failed: {}", e);
                }
                StopOutcome {
                    success: true,
                    recording: false,
                    message: "Recording stopped. Check the default capture folder (Videos > Captures)."
                        .to_string(),
                    file: None,
                }
            }
            CaptureStrategy::ManualFallback => StopOutcome {
                success: true,
                recording: false,
                message: "No controller-owned recording was running; nothing to stop.".to_string(),
                file: None,
            },
        };

        *self.session.write() = None;
        tracing::info!(session = %id, "session cleared");
        Ok(outcome)
    }

    /// Snapshot of the recorder state. Pure read: never blocks on the
    /// worker and touches only the published session fields.
    pub fn status(&self) -> StatusReport {
        let capabilities = self.capabilities.report();
        let session = self.session.read();

        match session.as_ref() {
            Some(current) => {
                let recording = current.is_recording();
                let last_error = current
                    .live
                    .as_ref()
                    .and_then(|live| live.failure())
                    .or_else(|| self.last_failure.read().clone());
                StatusReport {
                    success: true,
                    recording,
                    file: current
                        .artifact
                        .as_ref()
                        .map(|p| p.to_string_lossy().to_string()),
                    duration: recording.then(|| format_elapsed(current.started.elapsed())),
                    method: Some(current.strategy),
                    last_error,
                    capabilities,
                }
            }
            None => StatusReport {
                success: true,
                recording: false,
                file: None,
                duration: None,
                method: None,
                last_error: self.last_failure.read().clone(),
                capabilities,
            },
        }
    }

    async fn start_software(&self) -> Result<StartOutcome, CaptureError> {
        let sink = (self.backends.sink)();
        let artifact = self.artifact_path(sink.extension());

        let live = Arc::new(SessionLive::default());
        let (ready_tx, ready_rx) = oneshot::channel();

        let source_factory = self.backends.source.clone();
        let worker_live = live.clone();
        let worker_artifact = artifact.clone();
        let fps = self.config.fps;
        let max_failures = self.config.max_consecutive_grab_failures;

        let worker = tokio::task::spawn_blocking(move || {
            let source = match source_factory() {
                Ok(source) => source,
                Err(e) => {
                    let reason = e.to_string();
                    let _ = ready_tx.send(Err(e));
                    return LoopOutcome::Failed { reason };
                }
            };
            CaptureLoop::new(source, sink, worker_artifact, fps, max_failures, worker_live)
                .run(ready_tx)
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.await;
                return Err(e);
            }
            Err(_) => {
                let _ = worker.await;
                return Err(CaptureError::Grab(
                    "capture worker exited before reporting readiness".to_string(),
                ));
            }
        }

        let session = ActiveSession {
            id: Uuid::new_v4(),
            strategy: CaptureStrategy::SoftwareCompose,
            artifact: Some(artifact.clone()),
            started_at: Utc::now(),
            started: Instant::now(),
            live: Some(live),
            worker: Some(worker),
        };
        tracing::info!(
            session = %session.id,
            started_at = %session.started_at,
            "recording started: {:?}",
            artifact
        );

        // Publish the full session in one write so status() never sees a
        // half-initialized state
        *self.session.write() = Some(session);
        *self.last_failure.write() = None;

        let file_name = artifact
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(StartOutcome {
            success: true,
            recording: true,
            message: format!("Recording started, saving to {}", file_name),
            file: Some(artifact.to_string_lossy().to_string()),
            method: CaptureStrategy::SoftwareCompose,
        })
    }

    async fn start_native_hotkey(&self) -> Result<StartOutcome, CaptureError> {
        self.backends.combo.send_combo().await?;

        let session = ActiveSession {
            id: Uuid::new_v4(),
            strategy: CaptureStrategy::NativeHotkey,
            artifact: None,
            started_at: Utc::now(),
            started: Instant::now(),
            live: None,
            worker: None,
        };
        tracing::info!(session = %session.id, "native recorder toggled on (unverified)");

        *self.session.write() = Some(session);
        *self.last_failure.write() = None;

        Ok(StartOutcome {
            success: true,
            recording: true,
            message: "Recording started via the native recorder hotkey. Output goes to the default capture folder."
                .to_string(),
            file: None,
            method: CaptureStrategy::NativeHotkey,
        })
    }

    fn start_manual(&self) -> Result<StartOutcome, CaptureError> {
        self.backends.overlay.open_overlay()?;

        let session = ActiveSession {
            id: Uuid::new_v4(),
            strategy: CaptureStrategy::ManualFallback,
            artifact: None,
            started_at: Utc::now(),
            started: Instant::now(),
            live: None,
            worker: None,
        };
        tracing::info!(session = %session.id, "recorder overlay opened for manual capture");

        *self.session.write() = Some(session);
        *self.last_failure.write() = None;

        Ok(StartOutcome {
            success: true,
            recording: false,
            message: "Opened the native recorder. Press the recorder hotkey (Win+Alt+R) to start capturing."
                .to_string(),
            file: None,
            method: CaptureStrategy::ManualFallback,
        })
    }

    async fn stop_software(
        &self,
        id: Uuid,
        artifact: Option<PathBuf>,
        live: Option<Arc<SessionLive>>,
        worker: Option<tokio::task::JoinHandle<LoopOutcome>>,
    ) -> StopOutcome {
        if let Some(live) = live.as_ref() {
            live.cancel();
        }

        let mut timed_out = false;
        let mut failure = None;

        if let Some(mut worker) = worker {
            match tokio::time::timeout(self.config.stop_wait(), &mut worker).await {
                Ok(Ok(LoopOutcome::Stopped { frames })) => {
                    tracing::info!(session = %id, frames, "capture worker stopped cleanly");
                }
                Ok(Ok(LoopOutcome::Failed { reason })) => {
                    failure = Some(reason);
                }
                Ok(Err(e)) => {
                    failure = Some(format!("capture worker panicked: {}", e));
                }
                Err(_) => {
                    // Bounded wait expired; the worker keeps winding down
                    // detached while the controller stops reporting it
                    timed_out = true;
                    tracing::warn!(session = %id, "stop wait timed out, detaching worker");
                }
            }
        }

        if let Some(reason) = &failure {
            *self.last_failure.write() = Some(reason.clone());
        }

        let file = artifact.map(|p| p.to_string_lossy().to_string());
        let message = if timed_out {
            "Recording stopped, but the file may still be finalizing.".to_string()
        } else if let Some(reason) = &failure {
            format!("Recording ended with an error: {}", reason)
        } else {
            match &file {
                Some(path) => format!("Recording stopped, saved to {}", path),
                None => "Recording stopped.".to_string(),
            }
        };

        StopOutcome {
            success: true,
            recording: false,
            message,
            file,
        }
    }

    fn no_capture(&self) -> RecordingError {
        RecordingError::NoCaptureAvailable {
            hint: self
                .capabilities
                .install_hint()
                .unwrap_or_else(|| "no capture strategy could be started".to_string()),
        }
    }

    fn artifact_path(&self, extension: &str) -> PathBuf {
        let dir = self.config.resolve_output_dir();
        let ts = Local::now().format("%Y%m%d_%H%M%S");
        dir.join(format!("recording_{}.{}", ts, extension))
    }
}
