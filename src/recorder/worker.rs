//! Software capture loop
//!
//! Grabs frames at a fixed period and appends them to a capture sink until
//! cancelled or a fatal error ends the loop. The sink is opened once with
//! the first frame's dimensions and closed exactly once on every exit path.

use crate::capture::traits::{CaptureError, CaptureSink, FrameSource};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Fields shared between the controller and a running capture loop.
///
/// `finished` flips only after the sink has been closed, so an observer that
/// sees it set may assume the artifact is flushed.
#[derive(Default)]
pub struct SessionLive {
    cancelled: AtomicBool,
    finished: AtomicBool,
    frames: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl SessionLive {
    /// Signal the loop to stop; observed at the top of the next capture period
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Failure reason, set before `finished` when the loop aborted
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    fn finish(&self, failure: Option<String>) {
        *self.failure.lock() = failure;
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// Terminal state of one capture loop invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Cancellation observed; artifact flushed
    Stopped { frames: u64 },

    /// A fatal error aborted the loop; the artifact was still closed
    Failed { reason: String },
}

/// One software capture cycle runner.
///
/// Owns its frame source and sink for the lifetime of a single recording;
/// frames are grabbed, converted to the sink's channel order if needed, and
/// appended, all within one cycle. Nothing else reads or holds frames.
pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    sink: Box<dyn CaptureSink>,
    artifact: PathBuf,
    fps: u32,
    max_consecutive_grab_failures: u32,
    live: Arc<SessionLive>,
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        sink: Box<dyn CaptureSink>,
        artifact: PathBuf,
        fps: u32,
        max_consecutive_grab_failures: u32,
        live: Arc<SessionLive>,
    ) -> Self {
        Self {
            source,
            sink,
            artifact,
            fps,
            max_consecutive_grab_failures,
            live,
        }
    }

    /// Open the sink with the first frame's dimensions, report readiness,
    /// then run the periodic capture cycle to completion.
    ///
    /// `ready` resolves once the first frame has been accepted, or with the
    /// error that prevented the recording from starting. After a successful
    /// readiness report the sink is guaranteed to be closed exactly once,
    /// whichever way the loop exits.
    pub fn run(mut self, ready: oneshot::Sender<Result<(), CaptureError>>) -> LoopOutcome {
        // First grab determines the artifact dimensions
        let mut first = match self.source.grab() {
            Ok(frame) => frame,
            Err(e) => {
                let reason = format!("first frame grab failed: {}", e);
                let _ = ready.send(Err(e));
                self.live.finish(Some(reason.clone()));
                return LoopOutcome::Failed { reason };
            }
        };

        let (width, height) = (first.width, first.height);
        if let Err(e) = self.sink.open(&self.artifact, width, height, self.fps) {
            let reason = e.to_string();
            let _ = ready.send(Err(e));
            self.live.finish(Some(reason.clone()));
            return LoopOutcome::Failed { reason };
        }

        first.convert_to(self.sink.pixel_order());
        if let Err(e) = self.sink.append(&first) {
            let reason = e.to_string();
            if let Err(close_err) = self.sink.close() {
                tracing::warn!("capture sink close failed: {}", close_err);
            }
            let _ = ready.send(Err(e));
            self.live.finish(Some(reason.clone()));
            return LoopOutcome::Failed { reason };
        }
        self.live.frames.fetch_add(1, Ordering::SeqCst);
        drop(first);

        let _ = ready.send(Ok(()));
        tracing::info!(
            "Capture loop running: {}x{} @ {}fps -> {:?}",
            width,
            height,
            self.fps,
            self.artifact
        );

        let outcome = self.cycle(width, height);

        // Release the sink on every exit path, exactly once
        if let Err(e) = self.sink.close() {
            tracing::warn!("capture sink close failed: {}", e);
        }

        match &outcome {
            LoopOutcome::Stopped { frames } => {
                tracing::info!("Capture loop stopped: {} frames, saved {:?}", frames, self.artifact)
            }
            LoopOutcome::Failed { reason } => {
                tracing::error!("Capture loop failed: {}", reason)
            }
        }

        self.live.finish(match &outcome {
            LoopOutcome::Failed { reason } => Some(reason.clone()),
            LoopOutcome::Stopped { .. } => None,
        });

        outcome
    }

    fn cycle(&mut self, width: u32, height: u32) -> LoopOutcome {
        let period = Duration::from_millis(1_000 / u64::from(self.fps.max(1)));
        let expected_order = self.sink.pixel_order();
        let mut consecutive_failures = 0u32;

        loop {
            if self.live.is_cancelled() {
                return LoopOutcome::Stopped {
                    frames: self.live.frames_written(),
                };
            }

            let cycle_start = Instant::now();

            match self.source.grab() {
                Ok(mut frame) => {
                    consecutive_failures = 0;

                    if frame.width != width || frame.height != height {
                        // Display-mode change mid-recording: drop the frame
                        tracing::warn!(
                            "frame dimensions changed ({}x{} -> {}x{}), skipping",
                            width,
                            height,
                            frame.width,
                            frame.height
                        );
                    } else {
                        frame.convert_to(expected_order);
                        if let Err(e) = self.sink.append(&frame) {
                            return LoopOutcome::Failed {
                                reason: format!("frame write failed: {}", e),
                            };
                        }
                        self.live.frames.fetch_add(1, Ordering::SeqCst);
                    }
                }
                Err(e) => {
                    // Transient: skip the frame rather than abort the recording
                    consecutive_failures += 1;
                    tracing::warn!(
                        "frame grab failed ({} consecutive), skipping: {}",
                        consecutive_failures,
                        e
                    );
                    if consecutive_failures > self.max_consecutive_grab_failures {
                        return LoopOutcome::Failed {
                            reason: format!(
                                "frame grab failed {} times in a row: {}",
                                consecutive_failures, e
                            ),
                        };
                    }
                }
            }

            std::thread::sleep(period.saturating_sub(cycle_start.elapsed()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::{CaptureResult, Frame, PixelOrder};
    use std::sync::atomic::AtomicU32;

    /// Frame source driven by a closure receiving the 1-based grab index
    struct FnSource<F: FnMut(u64) -> CaptureResult<Frame>> {
        n: u64,
        grab_fn: F,
    }

    impl<F: FnMut(u64) -> CaptureResult<Frame>> FnSource<F> {
        fn new(grab_fn: F) -> Self {
            Self { n: 0, grab_fn }
        }
    }

    impl<F: FnMut(u64) -> CaptureResult<Frame>> FrameSource for FnSource<F> {
        fn grab(&mut self) -> CaptureResult<Frame> {
            self.n += 1;
            (self.grab_fn)(self.n)
        }
    }

    fn frame_2x2() -> Frame {
        Frame {
            pixels: vec![0; 16],
            width: 2,
            height: 2,
            order: PixelOrder::Bgra,
        }
    }

    #[derive(Default)]
    struct SinkCounters {
        opens: AtomicU32,
        closes: AtomicU32,
        appends: AtomicU32,
    }

    impl SinkCounters {
        fn opens(&self) -> u32 {
            self.opens.load(Ordering::SeqCst)
        }
        fn closes(&self) -> u32 {
            self.closes.load(Ordering::SeqCst)
        }
        fn appends(&self) -> u32 {
            self.appends.load(Ordering::SeqCst)
        }
    }

    struct CountingSink {
        counters: Arc<SinkCounters>,
        fail_open: bool,
        fail_append_after: Option<u32>,
    }

    impl CountingSink {
        fn new(counters: Arc<SinkCounters>) -> Self {
            Self {
                counters,
                fail_open: false,
                fail_append_after: None,
            }
        }
    }

    impl CaptureSink for CountingSink {
        fn open(&mut self, _: &std::path::Path, _: u32, _: u32, _: u32) -> CaptureResult<()> {
            if self.fail_open {
                return Err(CaptureError::SinkOpen("injected open failure".to_string()));
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn append(&mut self, _: &Frame) -> CaptureResult<()> {
            let n = self.counters.appends.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(limit) = self.fail_append_after {
                if n > limit {
                    return Err(CaptureError::SinkWrite("injected write failure".to_string()));
                }
            }
            Ok(())
        }

        fn close(&mut self) -> CaptureResult<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn spawn_loop<F>(
        grab_fn: F,
        sink: impl FnOnce() -> CountingSink + Send + 'static,
        live: Arc<SessionLive>,
        max_failures: u32,
    ) -> (
        tokio::task::JoinHandle<LoopOutcome>,
        oneshot::Receiver<Result<(), CaptureError>>,
    )
    where
        F: FnMut(u64) -> CaptureResult<Frame> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::task::spawn_blocking(move || {
            CaptureLoop::new(
                Box::new(FnSource::new(grab_fn)),
                Box::new(sink()),
                PathBuf::from("/tmp/deskrec-test.mp4"),
                100,
                max_failures,
                live,
            )
            .run(ready_tx)
        });
        (handle, ready_rx)
    }

    #[tokio::test]
    async fn cancel_stops_loop_and_closes_sink_once() {
        let counters = Arc::new(SinkCounters::default());
        let live = Arc::new(SessionLive::default());
        let sink_counters = counters.clone();
        let (handle, ready_rx) = spawn_loop(
            |_| Ok(frame_2x2()),
            move || CountingSink::new(sink_counters),
            live.clone(),
            30,
        );

        ready_rx.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        live.cancel();

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, LoopOutcome::Stopped { frames } if frames > 0));
        assert_eq!(counters.opens(), 1);
        assert_eq!(counters.closes(), 1);
        assert!(live.is_finished());
        assert!(live.failure().is_none());
    }

    #[tokio::test]
    async fn open_failure_reports_before_any_capture() {
        let counters = Arc::new(SinkCounters::default());
        let live = Arc::new(SessionLive::default());
        let sink_counters = counters.clone();
        let (handle, ready_rx) = spawn_loop(
            |_| Ok(frame_2x2()),
            move || {
                let mut sink = CountingSink::new(sink_counters);
                sink.fail_open = true;
                sink
            },
            live.clone(),
            30,
        );

        assert!(ready_rx.await.unwrap().is_err());
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, LoopOutcome::Failed { .. }));
        // The sink never opened, so it is not closed either
        assert_eq!(counters.opens(), 0);
        assert_eq!(counters.closes(), 0);
        assert!(live.is_finished());
    }

    #[tokio::test]
    async fn transient_grab_failures_skip_frames_without_aborting() {
        let counters = Arc::new(SinkCounters::default());
        let live = Arc::new(SessionLive::default());
        let sink_counters = counters.clone();
        // Grabs 2..=6 fail (five consecutive transient failures), the rest succeed
        let (handle, ready_rx) = spawn_loop(
            |n| {
                if (2..=6).contains(&n) {
                    Err(CaptureError::Grab("transient".to_string()))
                } else {
                    Ok(frame_2x2())
                }
            },
            move || CountingSink::new(sink_counters),
            live.clone(),
            30,
        );

        ready_rx.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!live.is_finished());
        live.cancel();

        let outcome = handle.await.unwrap();
        let LoopOutcome::Stopped { frames } = outcome else {
            panic!("expected clean stop, got {:?}", outcome);
        };
        // Five grabs were dropped, everything else landed in the sink
        assert_eq!(u64::from(counters.appends()), frames);
        assert!(frames >= 2);
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test]
    async fn repeated_grab_failures_abort_and_close() {
        let counters = Arc::new(SinkCounters::default());
        let live = Arc::new(SessionLive::default());
        let sink_counters = counters.clone();
        let (handle, ready_rx) = spawn_loop(
            |n| {
                if n == 1 {
                    Ok(frame_2x2())
                } else {
                    Err(CaptureError::Grab("display gone".to_string()))
                }
            },
            move || CountingSink::new(sink_counters),
            live.clone(),
            3,
        );

        ready_rx.await.unwrap().unwrap();
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, LoopOutcome::Failed { .. }));
        assert_eq!(counters.opens(), 1);
        assert_eq!(counters.closes(), 1);
        // The loop died without a stop request; the shared state says so
        assert!(live.is_finished());
        assert!(live.failure().is_some());
    }

    #[tokio::test]
    async fn write_failure_aborts_and_closes() {
        let counters = Arc::new(SinkCounters::default());
        let live = Arc::new(SessionLive::default());
        let sink_counters = counters.clone();
        let (handle, ready_rx) = spawn_loop(
            |_| Ok(frame_2x2()),
            move || {
                let mut sink = CountingSink::new(sink_counters);
                sink.fail_append_after = Some(2);
                sink
            },
            live.clone(),
            30,
        );

        ready_rx.await.unwrap().unwrap();
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, LoopOutcome::Failed { .. }));
        assert_eq!(counters.opens(), 1);
        assert_eq!(counters.closes(), 1);
        assert!(live.failure().unwrap().contains("write failed"));
    }

    #[tokio::test]
    async fn dimension_mismatch_skips_frame() {
        let counters = Arc::new(SinkCounters::default());
        let live = Arc::new(SessionLive::default());
        let sink_counters = counters.clone();
        // Grab 3 reports a resized display; it must be dropped, not appended
        let (handle, ready_rx) = spawn_loop(
            |n| {
                if n == 3 {
                    Ok(Frame {
                        pixels: vec![0; 64],
                        width: 4,
                        height: 4,
                        order: PixelOrder::Bgra,
                    })
                } else {
                    Ok(frame_2x2())
                }
            },
            move || CountingSink::new(sink_counters),
            live.clone(),
            30,
        );

        ready_rx.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        live.cancel();

        let outcome = handle.await.unwrap();
        let LoopOutcome::Stopped { frames } = outcome else {
            panic!("expected clean stop, got {:?}", outcome);
        };
        assert_eq!(u64::from(counters.appends()), frames);
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test]
    async fn first_grab_failure_never_opens_sink() {
        let counters = Arc::new(SinkCounters::default());
        let live = Arc::new(SessionLive::default());
        let sink_counters = counters.clone();
        let (handle, ready_rx) = spawn_loop(
            |_| Err(CaptureError::Grab("no display".to_string())),
            move || CountingSink::new(sink_counters),
            live.clone(),
            30,
        );

        assert!(ready_rx.await.unwrap().is_err());
        assert!(matches!(handle.await.unwrap(), LoopOutcome::Failed { .. }));
        assert_eq!(counters.opens(), 0);
        assert_eq!(counters.closes(), 0);
    }
}
